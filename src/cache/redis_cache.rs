//! Redis-backed query cache.
//!
//! Values live under their key with `EX` set to the TTL. Each tag is a Redis
//! set listing the keys stored under it, plus a `<tag>:generation` counter.
//! Both the guarded write and the invalidation run as Lua scripts, so a
//! write racing an invalidation either lands before it (and is deleted) or
//! sees the bumped generation and is dropped. Redis errors are logged and
//! swallowed.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult, Script};
use tracing::{debug, info, warn};

use super::{QueryCache, TagGuard};

/// KEYS: value key, then (tag set, generation key) per tag.
/// ARGV: value, ttl seconds, then the expected generation per tag.
const GUARDED_SET: &str = r#"
local tags = (#KEYS - 1) / 2
for i = 1, tags do
    local current = tonumber(redis.call('GET', KEYS[2 * i + 1]) or '0')
    if current ~= tonumber(ARGV[2 + i]) then
        return 0
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
for i = 1, tags do
    redis.call('SADD', KEYS[2 * i], KEYS[1])
    redis.call('EXPIRE', KEYS[2 * i], ARGV[2])
end
return 1
"#;

/// KEYS: tag set, generation key
const INVALIDATE: &str = r#"
redis.call('INCR', KEYS[2])
local keys = redis.call('SMEMBERS', KEYS[1])
for _, key in ipairs(keys) do
    redis.call('DEL', key)
end
redis.call('DEL', KEYS[1])
return #keys
"#;

fn generation_key(tag: &str) -> String {
    format!("{}:generation", tag)
}

pub struct RedisCache {
    conn: ConnectionManager,
    guarded_set: Script,
    invalidate: Script,
}

impl RedisCache {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    pub async fn new(url: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("Connected to Redis query cache");
        Ok(Self {
            conn,
            guarded_set: Script::new(GUARDED_SET),
            invalidate: Script::new(INVALIDATE),
        })
    }

    async fn try_guard(&self, tag: &str) -> RedisResult<u64> {
        let mut conn = self.conn.clone();
        let generation: Option<u64> = conn.get(generation_key(tag)).await?;
        Ok(generation.unwrap_or(0))
    }

    async fn try_set(
        &self,
        key: &str,
        guards: &[TagGuard],
        value: &str,
        ttl: Duration,
    ) -> RedisResult<bool> {
        let Some(generations) = guards
            .iter()
            .map(|guard| guard.generation)
            .collect::<Option<Vec<u64>>>()
        else {
            return Ok(false);
        };

        let mut invocation = self.guarded_set.prepare_invoke();
        invocation.key(key);
        for guard in guards {
            invocation.key(&guard.tag).key(generation_key(&guard.tag));
        }
        invocation.arg(value).arg(ttl.as_secs().max(1));
        for generation in generations {
            invocation.arg(generation);
        }

        let mut conn = self.conn.clone();
        let stored: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(stored == 1)
    }

    async fn try_invalidate(&self, tag: &str) -> RedisResult<usize> {
        let mut invocation = self.invalidate.key(tag);
        invocation.key(generation_key(tag));

        let mut conn = self.conn.clone();
        invocation.invoke_async(&mut conn).await
    }
}

#[async_trait]
impl QueryCache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Redis cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn guard(&self, tag: &str) -> TagGuard {
        let generation = match self.try_guard(tag).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                warn!("Redis generation read failed for {}: {}", tag, e);
                None
            }
        };
        TagGuard {
            tag: tag.to_string(),
            generation,
        }
    }

    async fn set(&self, key: &str, guards: &[TagGuard], value: String, ttl: Duration) -> bool {
        match self.try_set(key, guards, &value, ttl).await {
            Ok(true) => true,
            Ok(false) => {
                debug!("Skipping cache write for {}: tag was invalidated", key);
                false
            }
            Err(e) => {
                warn!("Redis cache write failed for {}: {}", key, e);
                false
            }
        }
    }

    async fn invalidate_by_tag(&self, tag: &str) {
        match self.try_invalidate(tag).await {
            Ok(count) => debug!("Invalidated {} cached entries for tag {}", count, tag),
            Err(e) => warn!("Redis cache invalidation failed for {}: {}", tag, e),
        }
    }
}
