/// Content-addressed memoization for scoring results.
///
/// Two key families share one store: whole-response fingerprints
/// (`score_{digest}`) and per-taxon detail records (`taxon_{id}`). Entries
/// are immutable once written and never expire here; eviction belongs to an
/// external policy. The cache is never a source of truth: every failure is
/// logged and treated as a miss.
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct ResultCache {
    dir: PathBuf,
    memory: DashMap<String, Vec<u8>>,
}

impl ResultCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("could not create cache dir {}: {}", dir.display(), e);
        }
        Self {
            dir,
            memory: DashMap::new(),
        }
    }

    /// Look up a key, promoting disk hits into memory. A read failure is a
    /// miss.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(entry) = self.memory.get(key) {
            return Some(entry.clone());
        }
        match fs::read(self.entry_path(key)) {
            Ok(bytes) => {
                self.memory.insert(key.to_string(), bytes.clone());
                Some(bytes)
            }
            Err(_) => None,
        }
    }

    /// Fire-and-forget write. A failure must never fail the request.
    pub fn put(&self, key: &str, bytes: Vec<u8>) {
        let path = self.entry_path(key);
        if let Err(e) = fs::write(&path, &bytes) {
            warn!("cache write failed for {}: {}", key, e);
        } else {
            debug!("cached {} ({} bytes)", key, bytes.len());
        }
        self.memory.insert(key.to_string(), bytes);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.memory.contains_key(key) || self.entry_path(key).exists()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.cache", sanitize(key)))
    }
}

/// Keys are caller-supplied opaque strings; restrict them to a
/// filesystem-safe alphabet.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
