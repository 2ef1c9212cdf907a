//! Cache of repaired items.
//!
//! Identical repairs reuse the previous fix instead of calling the model
//! again. Two repairs are identical when they send the same prompt: same
//! item, issue text, strategy and worksheet context.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use genguard_core::{GeneratedItem, IssueCode};

use crate::providers::ChatMessage;

/// Cache key for a repair: the issue code plus a hash of the full prompt.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepairKey {
    issue: IssueCode,
    prompt_hash: u64,
}

impl RepairKey {
    pub fn new(issue: IssueCode, messages: &[ChatMessage]) -> Self {
        let mut hasher = DefaultHasher::new();
        for message in messages {
            message.role.hash(&mut hasher);
            message.content.hash(&mut hasher);
        }
        Self {
            issue,
            prompt_hash: hasher.finish(),
        }
    }
}

/// A fix that can be replayed.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedFix {
    pub item: GeneratedItem,
    pub description: Option<String>,
}

/// Repair cache using moka.
pub struct RepairCache {
    cache: Cache<RepairKey, CachedFix>,
}

impl RepairCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &RepairKey) -> Option<CachedFix> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: RepairKey, fix: CachedFix) {
        self.cache.insert(key, fix).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for RepairCache {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(3600))
    }
}

impl std::fmt::Debug for RepairCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
