use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::error::Result;

/// A fixed-window hit counter.
#[async_trait]
pub trait HitCounter: Send + Sync {
    /// Counts one hit for `key` and returns the number of hits in the current
    /// window, this one included. A new window starts `window_secs` after the
    /// first hit of the previous one.
    async fn hit(&self, key: &str, window_secs: u64) -> Result<i64>;
}

/// Redis-backed counter. The window key is created with its expiry and
/// bumped in one `MULTI`/`EXEC`, so a key never outlives its window.
#[derive(Clone)]
pub struct RedisHitCounter {
    redis: ConnectionManager,
}

impl RedisHitCounter {
    /// Creates a new `RedisHitCounter`.
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

fn window_pipeline(key: &str, window_secs: u64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("NX")
        .arg("EX")
        .arg(window_secs.max(1))
        .ignore()
        .cmd("INCR")
        .arg(key);
    pipe
}

#[async_trait]
impl HitCounter for RedisHitCounter {
    async fn hit(&self, key: &str, window_secs: u64) -> Result<i64> {
        let mut redis = self.redis.clone();
        let (count,): (i64,) = window_pipeline(key, window_secs)
            .query_async(&mut redis)
            .await?;
        Ok(count)
    }
}

/// Process-local counter. The server always counts in Redis; tests drive
/// the router with this one.
#[derive(Default)]
pub struct MemoryHitCounter {
    windows: Mutex<HashMap<String, (Instant, i64)>>,
}

impl MemoryHitCounter {
    /// Creates an empty counter.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HitCounter for MemoryHitCounter {
    async fn hit(&self, key: &str, window_secs: u64) -> Result<i64> {
        let now = Instant::now();
        let window = Duration::from_secs(window_secs);
        let mut windows = self.windows.lock().await;

        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= window {
            *entry = (now, 0);
        }
        entry.1 += 1;

        Ok(entry.1)
    }
}
