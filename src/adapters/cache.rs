//! Bounded LRU cache of synthesized samples, keyed by normalized text.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

struct CachedSamples {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
}

/// Least-recently-used eviction over a fixed number of entries.
/// A capacity of zero disables caching.
pub struct SampleCache {
    // `None` when caching is disabled.
    entries: Option<LruCache<String, CachedSamples>>,
}

/// Collapse whitespace so trivially different spellings share an entry.
pub fn normalize_key(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl SampleCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Look up `text`, marking it most recently used.
    pub fn get(&mut self, text: &str) -> Option<(Arc<Vec<f32>>, u32)> {
        let entries = self.entries.as_mut()?;
        entries
            .get(&normalize_key(text))
            .map(|entry| (Arc::clone(&entry.samples), entry.sample_rate))
    }

    pub fn insert(&mut self, text: &str, samples: Arc<Vec<f32>>, sample_rate: u32) {
        if let Some(entries) = self.entries.as_mut() {
            entries.put(
                normalize_key(text),
                CachedSamples {
                    samples,
                    sample_rate,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
