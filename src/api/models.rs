//! API request and response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::RemoteAssetRef;
use crate::queue::RenderQueue;
use crate::store::{JobMetrics, JobRecord, JobSnapshot, JobStatus, OutputArtifact, Variant};

/// Request body for `POST /process`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    /// Source videos to composite, in upload order.
    #[serde(default)]
    pub videos: Vec<RemoteAssetRef>,
    /// Per-variant template references; at least one must be present.
    #[serde(default)]
    pub templates: TemplateSet,
}

/// Per-variant template references.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateSet {
    pub vertical: Option<RemoteAssetRef>,
    pub square: Option<RemoteAssetRef>,
    pub landscape: Option<RemoteAssetRef>,
}

impl TemplateSet {
    pub fn is_empty(&self) -> bool {
        self.vertical.is_none() && self.square.is_none() && self.landscape.is_none()
    }

    /// Present templates in the fixed variant execution order.
    pub fn entries(&self) -> Vec<(Variant, &RemoteAssetRef)> {
        let mut entries = Vec::new();
        for variant in Variant::ORDER {
            let slot = match variant {
                Variant::Vertical => &self.vertical,
                Variant::Square => &self.square,
                Variant::Landscape => &self.landscape,
            };
            if let Some(remote) = slot {
                entries.push((variant, remote));
            }
        }
        entries
    }
}

/// Response body for enqueue and status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub queue_position: u32,
    pub estimated_wait_ms: u64,
    pub estimated_wait_seconds: u64,
    pub average_job_duration_ms: u64,
    pub average_job_duration_seconds: u64,
    pub owner_active_jobs: u32,
    pub owner_job_limit: u32,
    pub metrics: JobMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Result payload wrapper so clients address outputs as `result.videos`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub videos: Vec<OutputArtifact>,
}

impl JobStatusResponse {
    /// Initial snapshot returned by the enqueue endpoint.
    pub fn enqueued(
        record: &JobRecord,
        queue: &RenderQueue,
        owner_active_jobs: u32,
        owner_job_limit: u32,
    ) -> Self {
        Self::assemble(record, queue, owner_active_jobs, owner_job_limit, false)
    }

    /// Full snapshot returned by the status endpoint.
    pub fn detailed(
        record: &JobRecord,
        queue: &RenderQueue,
        owner_active_jobs: u32,
        owner_job_limit: u32,
    ) -> Self {
        Self::assemble(record, queue, owner_active_jobs, owner_job_limit, true)
    }

    fn assemble(
        record: &JobRecord,
        queue: &RenderQueue,
        owner_active_jobs: u32,
        owner_job_limit: u32,
        detailed: bool,
    ) -> Self {
        let estimated_wait_ms = queue.estimated_wait_ms(record);
        let average_ms = queue.average_duration_ms();
        Self {
            job_id: record.id.clone(),
            status: record.status,
            progress: record.progress,
            queue_position: queue.queue_position(&record.id),
            estimated_wait_ms,
            estimated_wait_seconds: round_to_seconds(estimated_wait_ms),
            average_job_duration_ms: average_ms,
            average_job_duration_seconds: round_to_seconds(average_ms),
            owner_active_jobs,
            owner_job_limit,
            metrics: record.metrics,
            result: if detailed {
                record.result.clone().map(|videos| ResultEnvelope { videos })
            } else {
                None
            },
            error: if detailed { record.error.clone() } else { None },
            message: if detailed {
                Some(status_message(record.status))
            } else {
                None
            },
            created_at: detailed.then_some(record.created_at),
            updated_at: detailed.then_some(record.updated_at),
        }
    }

    /// Status response built from a snapshot served out of the KV or blob
    /// tier, where this instance holds no queue context for the job.
    pub fn from_snapshot(
        snapshot: &JobSnapshot,
        queue: &RenderQueue,
        owner_job_limit: u32,
    ) -> Self {
        let estimated_wait_ms = queue.estimated_wait_ms_for_snapshot(snapshot);
        let average_ms = queue.average_duration_ms();
        Self {
            job_id: snapshot.job_id.clone(),
            status: snapshot.status,
            progress: snapshot.progress,
            queue_position: 0,
            estimated_wait_ms,
            estimated_wait_seconds: round_to_seconds(estimated_wait_ms),
            average_job_duration_ms: average_ms,
            average_job_duration_seconds: round_to_seconds(average_ms),
            owner_active_jobs: 0,
            owner_job_limit,
            metrics: snapshot.metrics,
            result: snapshot
                .result
                .clone()
                .map(|videos| ResultEnvelope { videos }),
            error: snapshot.error.clone(),
            message: Some(status_message(snapshot.status)),
            created_at: Some(snapshot.created_at),
            updated_at: Some(snapshot.updated_at),
        }
    }
}

fn status_message(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => "Waiting in queue".to_string(),
        JobStatus::Processing => "Rendering variants".to_string(),
        JobStatus::Completed => "All variants rendered".to_string(),
        JobStatus::Failed => "Job failed".to_string(),
    }
}

fn round_to_seconds(ms: u64) -> u64 {
    (ms + 500) / 1000
}
