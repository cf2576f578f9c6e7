//! Job snapshot store.
//!
//! The in-memory table is the single source of truth; every mutation is
//! written through to the KV cache and the blob store as fire-and-forget
//! tasks whose failures are logged and swallowed. Snapshot reads fall back
//! tier by tier: memory, then KV, then blob.

pub mod blob;
pub mod kv;
pub mod record;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

use crate::{Error, Result};
pub use blob::SnapshotBlobStore;
pub use kv::SnapshotCache;
pub use record::{
    JobMetrics, JobPayload, JobRecord, JobSnapshot, JobStatus, OutputArtifact, SourceVideoRef,
    TemplateMetadata, TemplateRef, Variant,
};

/// Cap on in-flight secondary-store writes across all jobs.
const MAX_CONCURRENT_PUBLISHES: usize = 64;

/// The authoritative job table with write-through snapshot persistence.
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
    cache: Option<Arc<dyn SnapshotCache>>,
    blob: Option<Arc<dyn SnapshotBlobStore>>,
    snapshot_ttl_seconds: u64,
    publish_permits: Arc<Semaphore>,
}

impl JobStore {
    /// Create a store with no secondary tiers (memory only).
    pub fn new(snapshot_ttl_seconds: u64) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            cache: None,
            blob: None,
            snapshot_ttl_seconds,
            publish_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_PUBLISHES)),
        }
    }

    /// Attach a KV snapshot cache.
    pub fn with_cache(mut self, cache: Arc<dyn SnapshotCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a blob snapshot store.
    pub fn with_blob(mut self, blob: Arc<dyn SnapshotBlobStore>) -> Self {
        self.blob = Some(blob);
        self
    }

    /// Insert a new record and publish its initial snapshot.
    pub async fn create(&self, record: JobRecord) -> JobSnapshot {
        let snapshot = record.snapshot();
        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(record.id.clone(), record);
        }
        self.publish(&snapshot);
        snapshot
    }

    /// Get a full record by ID (memory tier only).
    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        let jobs = self.jobs.read().await;
        jobs.get(id).cloned()
    }

    /// Mutate a record under the write lock and publish the new snapshot.
    ///
    /// The mutation and the `updated_at` bump become visible to readers as
    /// one consistent state; readers never observe a torn record.
    pub async fn update<F>(&self, id: &str, mutator: F) -> Result<JobSnapshot>
    where
        F: FnOnce(&mut JobRecord),
    {
        let snapshot = {
            let mut jobs = self.jobs.write().await;
            let record = jobs
                .get_mut(id)
                .ok_or_else(|| Error::not_found("Job", id))?;
            mutator(record);
            record.updated_at = Utc::now();
            record.snapshot()
        };
        self.publish(&snapshot);
        Ok(snapshot)
    }

    /// Remove a record from memory. Secondary tiers expire on their own.
    pub async fn delete(&self, id: &str) {
        let mut jobs = self.jobs.write().await;
        jobs.remove(id);
    }

    /// Count jobs in {pending, processing} for an owner fingerprint.
    pub async fn count_active_for_owner(&self, owner_id: &str) -> u32 {
        let jobs = self.jobs.read().await;
        jobs.values()
            .filter(|j| j.owner_id == owner_id && j.is_active())
            .count() as u32
    }

    /// Load a snapshot, trying memory, then KV, then blob.
    pub async fn load_snapshot(&self, id: &str) -> Option<JobSnapshot> {
        {
            let jobs = self.jobs.read().await;
            if let Some(record) = jobs.get(id) {
                return Some(record.snapshot());
            }
        }

        if let Some(cache) = &self.cache {
            match cache.get(id).await {
                Ok(Some(json)) => match serde_json::from_str(&json) {
                    Ok(snapshot) => return Some(snapshot),
                    Err(e) => warn!(job_id = %id, error = %e, "Corrupt snapshot in KV cache"),
                },
                Ok(None) => {}
                Err(e) => warn!(job_id = %id, error = %e, "KV snapshot read failed"),
            }
        }

        if let Some(blob) = &self.blob {
            match blob.get(id).await {
                Ok(Some(json)) => match serde_json::from_str(&json) {
                    Ok(snapshot) => return Some(snapshot),
                    Err(e) => warn!(job_id = %id, error = %e, "Corrupt snapshot in blob store"),
                },
                Ok(None) => {}
                Err(e) => warn!(job_id = %id, error = %e, "Blob snapshot read failed"),
            }
        }

        None
    }

    /// Evict terminal records whose `finished_at` is older than the snapshot
    /// TTL. Called opportunistically on enqueue so long-lived processes do
    /// not grow without bound.
    pub async fn evict_expired(&self) {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.snapshot_ttl_seconds as i64);
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, j| match (j.status.is_terminal(), j.finished_at) {
            (true, Some(finished)) => finished > cutoff,
            _ => true,
        });
        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired terminal job records");
        }
    }

    /// Serialize and fan a snapshot out to the secondary tiers.
    ///
    /// Writes are fire-and-forget: failures are logged, never surfaced.
    fn publish(&self, snapshot: &JobSnapshot) {
        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!(job_id = %snapshot.job_id, error = %e, "Failed to serialize snapshot");
                return;
            }
        };

        if let Some(cache) = &self.cache {
            let cache = cache.clone();
            let job_id = snapshot.job_id.clone();
            let json = json.clone();
            let ttl = self.snapshot_ttl_seconds;
            let permits = self.publish_permits.clone();
            tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                if let Err(e) = cache.put(&job_id, &json, ttl).await {
                    warn!(job_id = %job_id, error = %e, "KV snapshot write failed");
                }
            });
        }

        if let Some(blob) = &self.blob {
            let blob = blob.clone();
            let job_id = snapshot.job_id.clone();
            let permits = self.publish_permits.clone();
            tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                if let Err(e) = blob.put(&job_id, &json).await {
                    warn!(job_id = %job_id, error = %e, "Blob snapshot write failed");
                }
            });
        }
    }
}
