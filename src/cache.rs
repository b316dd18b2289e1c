//! Bounded cache of synthesized speech
//!
//! Entries are evicted in insertion order: reads never refresh an entry,
//! and overwriting an existing key keeps its original position.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::language::LanguageCode;

/// Default number of cached clips
pub const DEFAULT_CAPACITY: usize = 100;

/// Default number of leading characters kept readable in a key
pub const DEFAULT_KEY_PREFIX_CHARS: usize = 100;

/// Identity of a cached clip
///
/// Holds a readable prefix of the text for logs plus a digest of the whole
/// normalized text, so two texts sharing a long prefix never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    prefix: String,
    digest: String,
    language: LanguageCode,
}

impl CacheKey {
    /// Build a key for `text` spoken in `language`
    #[must_use]
    pub fn new(text: &str, language: LanguageCode, prefix_chars: usize) -> Self {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let prefix = normalized.chars().take(prefix_chars).collect();
        let digest = hex::encode(Sha256::digest(normalized.as_bytes()));

        Self {
            prefix,
            digest,
            language,
        }
    }

    /// Readable text prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Language the clip is spoken in
    #[must_use]
    pub const fn language(&self) -> LanguageCode {
        self.language
    }
}

/// Thread-safe FIFO cache from [`CacheKey`] to MP3 bytes
pub struct SynthesisCache {
    entries: Mutex<LruCache<CacheKey, Arc<Vec<u8>>>>,
    prefix_chars: usize,
}

impl SynthesisCache {
    /// Create a cache holding at most `capacity` clips (minimum 1)
    #[must_use]
    pub fn new(capacity: usize, prefix_chars: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            prefix_chars,
        }
    }

    /// Key for `text` in `language` using this cache's prefix length
    #[must_use]
    pub fn key(&self, text: &str, language: LanguageCode) -> CacheKey {
        CacheKey::new(text, language, self.prefix_chars)
    }

    /// Lock the entries, recovering them if a holder panicked
    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, Arc<Vec<u8>>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("synthesis cache lock poisoned, recovering entries");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Look up a clip without changing eviction order
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<u8>>> {
        self.lock().peek(key).cloned()
    }

    /// Store a clip, evicting the oldest entry when full.
    ///
    /// Storing an existing key replaces its value in place.
    pub fn put(&self, key: CacheKey, audio: Arc<Vec<u8>>) {
        let mut entries = self.lock();

        if let Some(existing) = entries.peek_mut(&key) {
            *existing = audio;
            return;
        }

        if let Some((evicted, _)) = entries.push(key, audio) {
            tracing::debug!(prefix = %crate::preview(&evicted.prefix), language = %evicted.language, "evicted cached clip");
        }
    }

    /// Number of cached clips
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of clips
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }
}

impl Default for SynthesisCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_KEY_PREFIX_CHARS)
    }
}
