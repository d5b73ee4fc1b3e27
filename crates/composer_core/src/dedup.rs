use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::job::{JobKind, ProviderKind};

/// Prompt bytes that take part in a request fingerprint.
const MAX_FINGERPRINT_INPUT: usize = 500;

/// Content fingerprint used to collapse duplicate requests and insertions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey(String);

impl DedupKey {
    /// Fingerprint of a generation request: `(provider, kind, style, truncated input)`.
    pub fn for_request(provider: ProviderKind, kind: JobKind, style: &str, input: &str) -> Self {
        let input = truncate_at_char_boundary(input.trim(), MAX_FINGERPRINT_INPUT);
        let material = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}",
            provider.as_str(),
            kind.as_str(),
            style.trim().to_lowercase(),
            input.to_lowercase()
        );
        Self(format!("req-{}", short_hash(&material)))
    }

    /// Fingerprint of a generated asset, keyed by its normalized URL.
    pub fn for_asset(url: &str) -> Self {
        Self(format!("asset-{}", short_hash(&normalize_url_for_dedupe(url))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercases scheme and host, drops the fragment and a trailing slash.
/// Falls back to trimmed input when the URL does not parse.
pub fn normalize_url_for_dedupe(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            let mut normalized = url.to_string();
            if normalized.ends_with('/') && url.query().is_none() {
                normalized.pop();
            }
            normalized
        }
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

fn truncate_at_char_boundary(input: &str, max: usize) -> &str {
    if input.len() <= max {
        return input;
    }
    let mut end = max;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Bounded set of fingerprints; the least recently remembered key is evicted first.
pub struct DedupStore {
    keys: LruCache<DedupKey, ()>,
}

impl DedupStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            keys: LruCache::new(capacity),
        }
    }

    pub fn has_key(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the key was already known.
    pub fn remember(&mut self, key: DedupKey) -> bool {
        self.keys.put(key, ()).is_none()
    }

    pub fn forget(&mut self, key: &DedupKey) {
        self.keys.pop(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for DedupStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupStore")
            .field("len", &self.keys.len())
            .field("capacity", &self.keys.cap())
            .finish()
    }
}
