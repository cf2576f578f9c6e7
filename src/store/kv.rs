//! Key-value snapshot cache.
//!
//! Snapshots are stored as JSON under `video-job:{id}` with a TTL so status
//! queries survive across process instances until the key expires.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::{Error, Result};

/// Key prefix for persisted job snapshots.
const KEY_PREFIX: &str = "video-job";

fn cache_key(job_id: &str) -> String {
    format!("{}:{}", KEY_PREFIX, job_id)
}

/// A TTL-expiring cache for public job snapshots.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Store a snapshot JSON document with the given TTL.
    async fn put(&self, job_id: &str, snapshot_json: &str, ttl_seconds: u64) -> Result<()>;

    /// Fetch a snapshot JSON document, if present and unexpired.
    async fn get(&self, job_id: &str) -> Result<Option<String>>;
}

/// Redis-backed snapshot cache.
pub struct RedisSnapshotCache {
    connection: redis::aio::ConnectionManager,
}

impl RedisSnapshotCache {
    /// Connect to Redis at the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Configuration(format!("invalid REDIS_URL: {}", e)))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::Other(format!("Redis connection failed: {}", e)))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn put(&self, job_id: &str, snapshot_json: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(cache_key(job_id), snapshot_json, ttl_seconds)
            .await
            .map_err(|e| Error::Other(format!("Redis write failed: {}", e)))
    }

    async fn get(&self, job_id: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get(cache_key(job_id))
            .await
            .map_err(|e| Error::Other(format!("Redis read failed: {}", e)))
    }
}
