// Query Cache
//
// Best-effort accelerator for availability queries. Entries expire after a
// TTL and can be dropped wholesale by tag; a miss or a failed write never
// affects correctness.
//
// Every invalidation bumps the tag's generation. Writers take a `TagGuard`
// before reading the source of truth and the write is refused if the tag
// moved on in between, so a slow reader cannot put pre-commit data back.

pub mod redis_cache;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub use redis_cache::RedisCache;

/// Generation of a tag observed before computing a value
///
/// `generation` is `None` when it could not be read; such a guard never
/// admits a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagGuard {
    pub tag: String,
    pub generation: Option<u64>,
}

/// Cache of serialized query results, invalidated by tag
#[async_trait]
pub trait QueryCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    /// Snapshot the current generation of `tag`
    async fn guard(&self, tag: &str) -> TagGuard;

    /// Store `value` under every guarded tag unless one of them was
    /// invalidated since its guard was taken. Returns whether it was stored.
    async fn set(&self, key: &str, guards: &[TagGuard], value: String, ttl: Duration) -> bool;

    /// Drop every entry stored under `tag`
    async fn invalidate_by_tag(&self, tag: &str);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    stored_at: Instant,
    ttl: Duration,
    tags: Vec<String>,
}

impl CacheEntry {
    fn is_stale(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    tags: HashMap<String, HashSet<String>>,
    generations: HashMap<String, u64>,
}

impl CacheState {
    fn generation(&self, tag: &str) -> u64 {
        self.generations.get(tag).copied().unwrap_or(0)
    }

    fn is_current(&self, guard: &TagGuard) -> bool {
        guard.generation == Some(self.generation(&guard.tag))
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            for tag in entry.tags {
                if let Some(keys) = self.tags.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.tags.remove(&tag);
                    }
                }
            }
        }
    }

    fn evict_stale(&mut self) {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_stale())
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            self.remove(&key);
        }
    }
}

/// In-process cache used when no Redis URL is configured
#[derive(Debug, Default)]
pub struct MemoryCache {
    state: RwLock<CacheState>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let state = self.state.read().await;
        state.entries.values().filter(|entry| !entry.is_stale()).count()
    }
}

#[async_trait]
impl QueryCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let state = self.state.read().await;
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_stale())
            .map(|entry| entry.value.clone())
    }

    async fn guard(&self, tag: &str) -> TagGuard {
        let state = self.state.read().await;
        TagGuard {
            tag: tag.to_string(),
            generation: Some(state.generation(tag)),
        }
    }

    async fn set(&self, key: &str, guards: &[TagGuard], value: String, ttl: Duration) -> bool {
        let mut state = self.state.write().await;
        if let Some(moved) = guards.iter().find(|guard| !state.is_current(guard)) {
            tracing::debug!("Skipping cache write for {}: tag {} was invalidated", key, moved.tag);
            return false;
        }

        state.evict_stale();
        state.remove(key);

        let tags: Vec<String> = guards.iter().map(|guard| guard.tag.clone()).collect();
        for tag in &tags {
            state
                .tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                tags,
            },
        );
        true
    }

    async fn invalidate_by_tag(&self, tag: &str) {
        let mut state = self.state.write().await;
        *state.generations.entry(tag.to_string()).or_insert(0) += 1;
        if let Some(keys) = state.tags.remove(tag) {
            tracing::debug!("Invalidating {} cached entries for tag {}", keys.len(), tag);
            for key in keys {
                state.remove(&key);
            }
        }
    }
}
