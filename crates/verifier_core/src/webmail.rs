//! Webmail domain classification
//!
//! A read-only `domain → bool` mapping backing the Webmail/Professional
//! distinction. The JSON artifact is loaded once on first lookup and cached
//! for the process lifetime; a missing or malformed file degrades to an
//! empty mapping rather than failing the pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Lazily-loaded webmail domain mapping
pub struct WebmailClassifier {
    path: PathBuf,
    map: OnceLock<HashMap<String, bool>>,
}

impl WebmailClassifier {
    /// Create a classifier backed by the artifact at `path`. Nothing is
    /// read until the first lookup.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map: OnceLock::new(),
        }
    }

    /// Check whether a domain belongs to a consumer webmail service.
    ///
    /// The input is trimmed and lowercased before lookup.
    pub fn is_webmail(&self, domain: &str) -> bool {
        let map = self.map.get_or_init(|| load_map(&self.path));
        let normalized = domain.trim().to_lowercase();
        map.get(&normalized).copied().unwrap_or(false)
    }

    /// Number of domains in the mapping (zero until first lookup or on
    /// load failure)
    pub fn domain_count(&self) -> usize {
        self.map.get().map(HashMap::len).unwrap_or(0)
    }
}

fn load_map(path: &Path) -> HashMap<String, bool> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read webmail domain list {}: {}", path.display(), e);
            return HashMap::new();
        }
    };

    match serde_json::from_str::<HashMap<String, bool>>(&content) {
        Ok(map) => {
            info!("Loaded {} webmail domains from {}", map.len(), path.display());
            map.into_iter()
                .map(|(domain, flag)| (domain.to_lowercase(), flag))
                .collect()
        }
        Err(e) => {
            warn!("Malformed webmail domain list {}: {}", path.display(), e);
            HashMap::new()
        }
    }
}
