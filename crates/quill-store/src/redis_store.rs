//! Redis-backed store.

use crate::store::{KeyValueStore, WindowOutcome, WindowRequest, WindowSnapshot};
use crate::{with_timeout, StoreError, StoreResult};
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use quill_config::RedisConfig;
use quill_core::{duration_millis, QuillError, QuillResult};
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keys examined per SCAN round trip.
const SCAN_BATCH: usize = 100;

/// Prune, count and conditional record in one server-side step.
///
/// KEYS[1] window key; ARGV: now_ms, cutoff_ms, window_ms, max_events, member.
/// Replies `{admitted, count_before, oldest_score_or_empty}`.
const WINDOW_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local cutoff = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local limit = tonumber(ARGV[4])

redis.call('ZREMRANGEBYSCORE', key, '-inf', cutoff)
local count = redis.call('ZCARD', key)
local admitted = 0
if count < limit then
    redis.call('ZADD', key, now, ARGV[5])
    redis.call('PEXPIRE', key, window)
    admitted = 1
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
    return {admitted, count, oldest[2]}
end
return {admitted, count, ''}
";

/// Create a Redis connection pool.
///
/// Connections are opened on first use, so this succeeds while Redis is
/// down; only a malformed URL or pool setting fails here.
pub fn create_pool(config: &RedisConfig) -> StoreResult<Pool> {
    let pool = Config::from_url(&config.url)
        .builder()
        .map_err(|e| StoreError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size as usize)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| StoreError::Configuration(format!("Failed to create pool: {}", e)))?;

    info!(pool_size = config.pool_size, "Redis connection pool created");
    Ok(pool)
}

/// Store backed by a Redis connection pool.
pub struct RedisStore {
    pool: Pool,
    operation_timeout: Duration,
    window_script: Script,
}

impl RedisStore {
    /// Wraps an existing pool. Each round trip is bounded by `operation_timeout`.
    #[must_use]
    pub fn new(pool: Pool, operation_timeout: Duration) -> Self {
        Self {
            pool,
            operation_timeout,
            window_script: Script::new(WINDOW_SCRIPT),
        }
    }

    /// Builds the pool from configuration and checks that Redis answers.
    ///
    /// An unreachable server is logged, not returned: callers degrade per
    /// operation until it comes back.
    pub async fn connect(config: &RedisConfig) -> StoreResult<Self> {
        let store = Self::new(create_pool(config)?, config.operation_timeout());
        match store.ping().await {
            Ok(()) => info!("Redis answered startup ping"),
            Err(e) => warn!(error = %e, "Redis unreachable at startup; continuing degraded"),
        }
        Ok(store)
    }

    async fn conn(&self) -> StoreResult<Connection> {
        with_timeout(self.operation_timeout, || async {
            Ok::<_, StoreError>(self.pool.get().await?)
        })
        .await
    }
}

fn parse_score(raw: &str) -> StoreResult<Option<i64>> {
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(score) = raw.parse::<i64>() {
        return Ok(Some(score));
    }
    raw.parse::<f64>()
        .map(|score| Some(score as i64))
        .map_err(|_| StoreError::Protocol(format!("non-numeric window score '{}'", raw)))
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> QuillResult<()> {
        let mut conn = self.conn().await?;
        with_timeout(self.operation_timeout, || async {
            let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
            Ok::<_, StoreError>(())
        })
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> QuillResult<Option<String>> {
        let mut conn = self.conn().await?;
        let value = with_timeout(self.operation_timeout, || async {
            let value: Option<String> = conn.get(key).await?;
            Ok::<_, StoreError>(value)
        })
        .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> QuillResult<()> {
        let ttl_ms = duration_millis(ttl);
        if ttl_ms <= 0 {
            return Err(QuillError::invalid_configuration(format!(
                "TTL for '{}' must be at least one millisecond",
                key
            )));
        }

        let mut conn = self.conn().await?;
        with_timeout(self.operation_timeout, || async {
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut *conn)
                .await?;
            Ok::<_, StoreError>(())
        })
        .await?;

        debug!(key = %key, ttl_ms, "Stored key");
        Ok(())
    }

    async fn delete(&self, key: &str) -> QuillResult<bool> {
        let mut conn = self.conn().await?;
        let deleted = with_timeout(self.operation_timeout, || async {
            let deleted: u64 = conn.del(key).await?;
            Ok::<_, StoreError>(deleted)
        })
        .await?;
        Ok(deleted > 0)
    }

    async fn delete_pattern(&self, pattern: &str) -> QuillResult<u64> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys) = with_timeout(self.operation_timeout, || async {
                let page: (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut *conn)
                    .await?;
                Ok::<_, StoreError>(page)
            })
            .await?;

            if !keys.is_empty() {
                deleted += with_timeout(self.operation_timeout, || async {
                    let removed: u64 = conn.del(&keys).await?;
                    Ok::<_, StoreError>(removed)
                })
                .await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = %pattern, deleted, "Deleted keys by pattern");
        Ok(deleted)
    }

    async fn record_event(&self, request: &WindowRequest) -> QuillResult<WindowOutcome> {
        let mut conn = self.conn().await?;
        let (admitted, count, oldest) = with_timeout(self.operation_timeout, || async {
            let reply: (i64, i64, String) = self
                .window_script
                .key(&request.key)
                .arg(request.now_ms)
                .arg(request.cutoff_ms())
                .arg(request.window_ms)
                .arg(request.max_events)
                .arg(&request.member)
                .invoke_async(&mut *conn)
                .await?;
            Ok::<_, StoreError>(reply)
        })
        .await?;

        Ok(WindowOutcome {
            admitted: admitted == 1,
            count: u64::try_from(count).unwrap_or_default(),
            oldest_ms: parse_score(&oldest)?,
        })
    }

    async fn window_snapshot(&self, key: &str, cutoff_ms: i64) -> QuillResult<WindowSnapshot> {
        let mut conn = self.conn().await?;
        let lower = format!("({}", cutoff_ms);

        let (count, oldest) = with_timeout(self.operation_timeout, || async {
            let reply: (u64, Vec<(String, f64)>) = redis::pipe()
                .cmd("ZCOUNT")
                .arg(key)
                .arg(&lower)
                .arg("+inf")
                .cmd("ZRANGEBYSCORE")
                .arg(key)
                .arg(&lower)
                .arg("+inf")
                .arg("WITHSCORES")
                .arg("LIMIT")
                .arg(0)
                .arg(1)
                .query_async(&mut *conn)
                .await?;
            Ok::<_, StoreError>(reply)
        })
        .await?;

        Ok(WindowSnapshot {
            count,
            oldest_ms: oldest.first().map(|(_, score)| *score as i64),
        })
    }
}
