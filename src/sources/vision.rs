/// HTTP client for the vision model service.
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{TaxonCount, VisionScorer};
use crate::{Result, TaxavisionError};

pub struct VisionClient {
    client: Client,
    url: String,
}

impl VisionClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Taxavision/0.1.0")
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl VisionScorer for VisionClient {
    /// POST the image as multipart form data and decode the response as a
    /// flat `taxon_id -> score` map. A timeout or non-2xx status is an
    /// upstream failure; an unparseable body is a scoring error.
    async fn score_image(&self, image: Vec<u8>, filename: &str) -> Result<Vec<TaxonCount>> {
        let part = Part::bytes(image)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| TaxavisionError::Other(e.to_string()))?;
        let form = Form::new().part("image", part);

        let response = self.client.post(&self.url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(TaxavisionError::Upstream(format!(
                "vision model returned {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        let raw: HashMap<String, f64> = serde_json::from_str(&body)
            .map_err(|e| TaxavisionError::Scoring(format!("unparseable response: {}", e)))?;

        let mut counts = Vec::with_capacity(raw.len());
        for (id, score) in raw {
            let taxon_id = id
                .parse::<u32>()
                .map_err(|_| TaxavisionError::Scoring(format!("non-numeric taxon id {:?}", id)))?;
            counts.push(TaxonCount {
                taxon_id,
                count: score,
            });
        }
        debug!("vision model returned {} scored taxa", counts.len());
        Ok(counts)
    }
}
