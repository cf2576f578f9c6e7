//! Render job endpoints.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/process` | Ingest assets and enqueue a render job |
//! | GET | `/process/{jobId}` | Query a job snapshot |

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::fingerprint::owner_fingerprint;
use crate::api::models::{JobStatusResponse, ProcessRequest};
use crate::api::server::AppState;
use crate::store::{JobPayload, JobRecord, SourceVideoRef, TemplateRef};
use crate::utils::fs;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process", post(enqueue_job))
        .route("/process/{job_id}", get(job_status))
}

/// Validate the payload, ingest all remote assets, create the job record,
/// and hand it to the queue.
async fn enqueue_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<JobStatusResponse>> {
    if request.videos.is_empty() {
        return Err(ApiError::bad_request("at least one source video is required"));
    }
    if request.templates.is_empty() {
        return Err(ApiError::bad_request("at least one template is required"));
    }

    let owner_id = owner_fingerprint(&headers);
    let limit = state.config.max_active_jobs_per_owner;

    // Admission happens before any download starts.
    let active = state.store.count_active_for_owner(&owner_id).await;
    if active >= limit {
        return Err(crate::Error::TooManyActiveJobs { active, limit }.into());
    }

    let payload = match ingest_payload(&state, &request).await {
        Ok(payload) => payload,
        Err(e) => return Err(e.into()),
    };

    let record = JobRecord::new(owner_id.clone(), payload);
    let job_id = record.id.clone();
    state.queue.enqueue(record).await.map_err(ApiError::from)?;
    info!(job_id = %job_id, owner = %owner_id, "Job enqueued");

    let record = state
        .store
        .get(&job_id)
        .await
        .ok_or_else(|| ApiError::internal("job vanished after enqueue"))?;
    let owner_active = state.store.count_active_for_owner(&owner_id).await;
    Ok(Json(JobStatusResponse::enqueued(
        &record,
        &state.queue,
        owner_active,
        limit,
    )))
}

/// Download every referenced asset into scratch storage and probe template
/// metadata. On any failure the already downloaded files are removed.
async fn ingest_payload(
    state: &AppState,
    request: &ProcessRequest,
) -> crate::Result<JobPayload> {
    let mut downloaded: Vec<std::path::PathBuf> = Vec::new();

    let result: crate::Result<JobPayload> = async {
        let mut sources = Vec::with_capacity(request.videos.len());
        for (index, video) in request.videos.iter().enumerate() {
            let asset = state
                .ingestor
                .ingest(video, &format!("source_{}", index + 1))
                .await?;
            downloaded.push(asset.scratch_path.clone());
            sources.push(SourceVideoRef {
                scratch_path: asset.scratch_path,
                original_name: asset.original_name,
            });
        }

        let mut templates = Vec::new();
        for (variant, remote) in request.templates.entries() {
            let label = format!("template_{}", variant);
            let asset = state.ingestor.ingest(remote, &label).await?;
            downloaded.push(asset.scratch_path.clone());
            let metadata = state
                .ingestor
                .probe_template(&asset.scratch_path, &label)
                .await;
            templates.push(TemplateRef {
                scratch_path: asset.scratch_path,
                original_name: asset.original_name,
                variant,
                metadata,
            });
        }

        Ok(JobPayload { sources, templates })
    }
    .await;

    if result.is_err() {
        for path in &downloaded {
            fs::remove_file_best_effort(path).await;
        }
    }
    result
}

/// Serve a job snapshot: memory first, then the KV and blob tiers so a
/// request routed to a different instance still resolves.
async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let limit = state.config.max_active_jobs_per_owner;

    if let Some(record) = state.store.get(&job_id).await {
        let owner_active = state.store.count_active_for_owner(&record.owner_id).await;
        return Ok(Json(JobStatusResponse::detailed(
            &record,
            &state.queue,
            owner_active,
            limit,
        )));
    }

    let snapshot = state
        .store
        .load_snapshot(&job_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", job_id)))?;
    Ok(Json(JobStatusResponse::from_snapshot(
        &snapshot,
        &state.queue,
        limit,
    )))
}
