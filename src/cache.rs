//! # Record Cache Invalidation
//!
//! Hosts often cache legacy records by identity. Once an item leaves
//! PROCESSING its legacy data may be gone, so the engine evicts the entry
//! before the batch transaction commits.

use dashmap::DashMap;
use std::sync::Arc;

/// Cache keyed by legacy record identity
pub trait RecordCache: Send + Sync {
    fn invalidate(&self, identity: &str);
}

/// Cache for hosts that keep no record cache
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecordCache;

impl RecordCache for NoopRecordCache {
    fn invalidate(&self, _identity: &str) {}
}

/// Concurrent in-process cache; records every eviction for inspection
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordCache {
    entries: Arc<DashMap<String, String>>,
    evictions: Arc<DashMap<String, u64>>,
}

impl InMemoryRecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(identity.into(), value.into());
    }

    pub fn get(&self, identity: &str) -> Option<String> {
        self.entries.get(identity).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// How many times `identity` has been invalidated
    pub fn eviction_count(&self, identity: &str) -> u64 {
        self.evictions.get(identity).map_or(0, |count| *count)
    }
}

impl RecordCache for InMemoryRecordCache {
    fn invalidate(&self, identity: &str) {
        self.entries.remove(identity);
        *self.evictions.entry(identity.to_string()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_removes_entry_and_counts() {
        let cache = InMemoryRecordCache::new();
        cache.insert("a", "/images/logo.png");
        assert_eq!(cache.get("a").as_deref(), Some("/images/logo.png"));

        cache.invalidate("a");
        cache.invalidate("a");

        assert!(!cache.contains("a"));
        assert_eq!(cache.eviction_count("a"), 2);
        assert_eq!(cache.eviction_count("b"), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let cache = InMemoryRecordCache::new();
        let handle = cache.clone();
        handle.insert("x", "1");
        cache.invalidate("x");
        assert!(!handle.contains("x"));
    }
}
