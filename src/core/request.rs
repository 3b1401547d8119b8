/// Typed scoring request parameters.
///
/// Upstream request validation happens before this crate is involved; by the
/// time a request reaches the engine every flag is a real boolean and every
/// number is parsed.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: usize = 10;
pub const MAX_PER_PAGE: usize = 100;

/// Boolean request flags, validated once at the boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFlags {
    /// Skip frequency fetching and common-ancestor inference entirely.
    pub skip_frequencies: bool,
    /// Drop taxa absent from the frequency results.
    pub must_be_in_frequency: bool,
    /// Drop taxa with a zero vision score.
    pub must_be_in_vision: bool,
    /// Use frequency data only for exclusion; rank by pure vision score.
    pub frequency_only_remove: bool,
    /// Select the precomputed geographic-cell frequency backend.
    pub cell_frequencies: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Search radius in km for the observation frequency backend.
    pub radius: Option<f64>,
    pub observed_on: Option<NaiveDate>,
    /// Restrict candidates to this taxon's descendant subtree.
    pub taxon_id: Option<u32>,
    /// The observation being scored, excluded from its own frequency search.
    pub observation_id: Option<u64>,
    pub ancestor_window: Option<usize>,
    pub ancestor_threshold: Option<f64>,
    pub rank_level_cutoff: Option<f32>,
    /// Half-width in days of the observed-on date window.
    pub window_days: Option<i64>,
    pub per_page: Option<usize>,
    #[serde(default)]
    pub flags: ScoreFlags,
    #[serde(default)]
    pub locale: crate::sources::LocaleOptions,
}

impl ScoreRequest {
    pub fn per_page(&self) -> usize {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .min(MAX_PER_PAGE)
    }

    pub fn has_location(&self) -> bool {
        self.lat.is_some() && self.lng.is_some()
    }

    /// Content-addressed fingerprint for whole-response memoization: a digest
    /// of the image bytes combined with every parameter that can change the
    /// ranked output.
    pub fn fingerprint(&self, image: &[u8]) -> String {
        let image_digest = md5::compute(image);
        let params = format!(
            "{:x}|{:?}|{:?}|{:?}|{:?}|{:?}|{:?}|{:?}|{:?}|{:?}|{}|{:?}",
            image_digest,
            self.lat,
            self.lng,
            self.radius,
            self.observed_on,
            self.taxon_id,
            self.ancestor_window,
            self.ancestor_threshold,
            self.rank_level_cutoff,
            self.window_days,
            self.per_page(),
            self.flags,
        );
        format!("score_{:x}", md5::compute(params.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_page_clamped() {
        let mut req = ScoreRequest::default();
        assert_eq!(req.per_page(), DEFAULT_PER_PAGE);
        req.per_page = Some(500);
        assert_eq!(req.per_page(), MAX_PER_PAGE);
        req.per_page = Some(25);
        assert_eq!(req.per_page(), 25);
    }

    #[test]
    fn test_fingerprint_sensitive_to_params() {
        let image = b"jpegbytes".to_vec();
        let base = ScoreRequest::default();
        let mut with_loc = ScoreRequest::default();
        with_loc.lat = Some(38.5);
        with_loc.lng = Some(-122.1);

        assert_eq!(base.fingerprint(&image), base.fingerprint(&image));
        assert_ne!(base.fingerprint(&image), with_loc.fingerprint(&image));
        assert_ne!(base.fingerprint(&image), base.fingerprint(b"otherbytes"));
    }

    #[test]
    fn test_fingerprint_sensitive_to_flags() {
        let image = b"jpegbytes".to_vec();
        let base = ScoreRequest::default();
        let mut flagged = ScoreRequest::default();
        flagged.flags.must_be_in_vision = true;
        assert_ne!(base.fingerprint(&image), flagged.fingerprint(&image));
    }
}
