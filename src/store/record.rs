//! Job records and their externally visible snapshot projection.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Target canvas of a single render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// 1080x1920 portrait canvas.
    Vertical,
    /// 1080x1080 square canvas.
    Square,
    /// 1920x1080 landscape canvas.
    Landscape,
}

impl Variant {
    /// Fixed execution order of variants within a job.
    pub const ORDER: [Variant; 3] = [Variant::Vertical, Variant::Square, Variant::Landscape];

    /// Get string representation of the variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Vertical => "vertical",
            Variant::Square => "square",
            Variant::Landscape => "landscape",
        }
    }

    /// Canvas dimensions (width, height) for this variant.
    pub fn canvas(&self) -> (u32, u32) {
        match self {
            Variant::Vertical => (1080, 1920),
            Variant::Square => (1080, 1080),
            Variant::Landscape => (1920, 1080),
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is waiting in the queue.
    Pending,
    /// Job is currently being rendered.
    Processing,
    /// Job completed successfully.
    Completed,
    /// Job failed.
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata probed from a template asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    /// Whether the template carries transparency.
    pub has_alpha_channel: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pixel_format: Option<String>,
}

impl Default for TemplateMetadata {
    // Fallback when probing fails: alpha assumed present.
    fn default() -> Self {
        Self {
            has_alpha_channel: true,
            width: None,
            height: None,
            pixel_format: None,
        }
    }
}

/// A source video that has been downloaded into scratch storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceVideoRef {
    pub scratch_path: PathBuf,
    pub original_name: String,
}

/// A template asset that has been downloaded into scratch storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    pub scratch_path: PathBuf,
    pub original_name: String,
    pub variant: Variant,
    pub metadata: TemplateMetadata,
}

/// Everything a job needs to render: sources plus per-variant templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub sources: Vec<SourceVideoRef>,
    pub templates: Vec<TemplateRef>,
}

impl JobPayload {
    /// Number of (source x template) render pairs.
    pub fn total_variants(&self) -> u32 {
        (self.sources.len() * self.templates.len()) as u32
    }

    /// Templates sorted into the fixed variant execution order.
    pub fn templates_in_order(&self) -> Vec<&TemplateRef> {
        let mut ordered = Vec::with_capacity(self.templates.len());
        for variant in Variant::ORDER {
            if let Some(t) = self.templates.iter().find(|t| t.variant == variant) {
                ordered.push(t);
            }
        }
        ordered
    }

    /// All scratch files referenced by this payload.
    pub fn scratch_paths(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .map(|s| s.scratch_path.as_path())
            .chain(self.templates.iter().map(|t| t.scratch_path.as_path()))
            .collect()
    }
}

/// One rendered output file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputArtifact {
    pub variant: Variant,
    /// Basename of the file under the output directory.
    pub filename: String,
    /// Download path derived from the filename.
    pub url: String,
}

impl OutputArtifact {
    pub fn new(variant: Variant, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let url = format!("/output/{}", filename);
        Self {
            variant,
            filename,
            url,
        }
    }
}

/// Per-job render counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetrics {
    pub completed_variants: u32,
    pub total_variants: u32,
}

/// A render job owned by the in-memory job table.
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Unique job ID.
    pub id: String,
    /// Submitter fingerprint used for the active-jobs cap.
    pub owner_id: String,
    /// Current status.
    pub status: JobStatus,
    /// Progress percentage (0-100).
    pub progress: u8,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,
    /// When the worker picked the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Output artifacts in render order, set on completion.
    pub result: Option<Vec<OutputArtifact>>,
    /// Render counters.
    pub metrics: JobMetrics,
    /// Sources and templates to render.
    pub payload: JobPayload,
}

impl JobRecord {
    /// Create a new pending job.
    pub fn new(owner_id: impl Into<String>, payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            status: JobStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            error: None,
            result: None,
            metrics: JobMetrics::default(),
            payload,
        }
    }

    /// Check if the job is in {pending, processing} for admission counting.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Build the externally visible projection of this record.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            error: self.error.clone(),
            result: self.result.clone(),
            metrics: self.metrics,
        }
    }
}

/// The externally visible projection of a job record.
///
/// This is the shape persisted to the KV cache and the blob store, and the
/// shape the status endpoint is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<OutputArtifact>>,
    pub metrics: JobMetrics,
}
