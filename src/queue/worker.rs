//! Single-consumer worker loop.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{RenderQueue, DURATION_SAMPLE_WINDOW, PROGRESS_SEED};
use crate::store::{JobRecord, JobStatus, OutputArtifact, SourceVideoRef, TemplateRef};
use crate::utils::fs;
use crate::{Error, Result};

impl RenderQueue {
    /// Start the consumer if it is not already running.
    ///
    /// Starting is idempotent: while a worker owns the consumer role this
    /// is a no-op, so at most one worker executes at any time. While the
    /// circuit breaker is open no worker is spawned; once the cooldown has
    /// elapsed the breaker closes and the next call starts one.
    pub fn ensure_worker(&self) {
        let generation = {
            let mut state = self.state.lock();
            if state.worker_running {
                return;
            }
            if let Some(opened_at) = state.breaker_opened_at {
                if opened_at.elapsed() < self.config.breaker_cooldown {
                    debug!("Circuit breaker open; worker start suppressed");
                    return;
                }
                info!("Circuit breaker cooldown elapsed; closing");
                state.breaker_opened_at = None;
            }
            state.worker_running = true;
            state.worker_generation
        };

        let Some(queue) = self.self_ref.upgrade() else {
            return;
        };
        tokio::spawn(async move { queue.run_worker(generation).await });
    }

    async fn run_worker(self: Arc<Self>, generation: u64) {
        debug!(generation, "Worker started");
        loop {
            let next = {
                let mut state = self.state.lock();
                if state.worker_generation != generation {
                    // Fenced by the supervisor; a successor owns the state.
                    debug!(generation, "Worker fenced; exiting");
                    return;
                }
                match state.pending.pop_front() {
                    Some(id) => {
                        state.currently_processing = Some(id.clone());
                        Some(id)
                    }
                    None => {
                        state.worker_running = false;
                        None
                    }
                }
            };
            let Some(job_id) = next else {
                debug!(generation, "Queue drained; worker parked");
                return;
            };

            let Some(record) = self.store.get(&job_id).await else {
                warn!(job_id = %job_id, "Dequeued job no longer resolves; skipping");
                let mut state = self.state.lock();
                if state.worker_generation == generation {
                    state.currently_processing = None;
                }
                continue;
            };

            self.process_job(generation, record).await;
        }
    }

    /// Drive one job through processing to a terminal state.
    async fn process_job(&self, generation: u64, record: JobRecord) {
        let job_id = record.id.clone();
        let started_at = Utc::now();
        let total_variants = record.payload.total_variants();

        if let Err(e) = self
            .store
            .update(&job_id, |r| {
                r.status = JobStatus::Processing;
                r.started_at = Some(started_at);
                r.progress = PROGRESS_SEED;
                r.metrics.total_variants = total_variants;
            })
            .await
        {
            warn!(job_id = %job_id, error = %e, "Failed to mark job processing");
        }
        info!(job_id = %job_id, total_variants, "Processing job");

        let templates: Vec<TemplateRef> = record
            .payload
            .templates_in_order()
            .into_iter()
            .cloned()
            .collect();

        let mut artifacts: Vec<OutputArtifact> = Vec::with_capacity(total_variants as usize);
        let mut completed: u32 = 0;
        let mut failure: Option<String> = None;

        'render: for source in &record.payload.sources {
            for template in &templates {
                if !self.generation_current(generation) {
                    debug!(job_id = %job_id, "Worker fenced mid-job; abandoning");
                    return;
                }
                let rendered = self.render_one(source, template).await;
                if !self.generation_current(generation) {
                    // The supervisor declared this worker dead while the
                    // render ran; its terminal state must stand.
                    debug!(job_id = %job_id, "Worker fenced after render; abandoning");
                    return;
                }
                match rendered {
                    Ok(artifact) => {
                        completed += 1;
                        artifacts.push(artifact);
                        let progress = variant_progress(completed, total_variants);
                        if let Err(e) = self
                            .store
                            .update(&job_id, |r| {
                                r.metrics.completed_variants = completed;
                                r.progress = progress;
                            })
                            .await
                        {
                            warn!(job_id = %job_id, error = %e, "Failed to record progress");
                        }
                    }
                    Err(e) => {
                        failure = Some(e.to_string());
                        break 'render;
                    }
                }
            }
        }

        if !self.generation_current(generation) {
            // The supervisor already failed this job and cleaned up.
            return;
        }

        let finished_at = Utc::now();
        let update = match &failure {
            None => {
                self.store
                    .update(&job_id, |r| {
                        r.status = JobStatus::Completed;
                        r.progress = 100;
                        r.result = Some(artifacts);
                        r.finished_at = Some(finished_at);
                    })
                    .await
            }
            Some(error) => {
                let error = error.clone();
                self.store
                    .update(&job_id, |r| {
                        r.status = JobStatus::Failed;
                        r.error = Some(error);
                        r.finished_at = Some(finished_at);
                    })
                    .await
            }
        };
        if let Err(e) = update {
            warn!(job_id = %job_id, error = %e, "Failed to record terminal state");
        }

        // Scratch inputs are deleted exactly once, on the terminal transition.
        for path in record.payload.scratch_paths() {
            fs::remove_file_best_effort(path).await;
        }

        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        {
            let mut state = self.state.lock();
            if state.worker_generation == generation {
                state.currently_processing = None;
            }
            if failure.is_none() {
                state.recent_durations_ms.push_back(duration_ms);
                while state.recent_durations_ms.len() > DURATION_SAMPLE_WINDOW {
                    state.recent_durations_ms.pop_front();
                }
                // A success closes the breaker and clears the stall streak.
                state.consecutive_stalls = 0;
                state.breaker_opened_at = None;
            }
        }

        match failure {
            None => info!(job_id = %job_id, duration_ms, "Job completed"),
            Some(error) => warn!(job_id = %job_id, error = %error, "Job failed"),
        }
    }

    /// Render one pair and publish the output into the download directory.
    async fn render_one(
        &self,
        source: &SourceVideoRef,
        template: &TemplateRef,
    ) -> Result<OutputArtifact> {
        let scratch_output = self.renderer.render(source, template).await?;
        let filename = scratch_output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::Other(format!(
                    "render output has no file name: {}",
                    scratch_output.display()
                ))
            })?;

        fs::ensure_dir_all(&self.output_dir).await?;
        let published = self.output_dir.join(&filename);
        if tokio::fs::rename(&scratch_output, &published).await.is_err() {
            // Scratch and output may live on different filesystems.
            tokio::fs::copy(&scratch_output, &published)
                .await
                .map_err(|e| fs::io_error("publishing output", &published, e))?;
            fs::remove_file_best_effort(&scratch_output).await;
        }

        Ok(OutputArtifact::new(template.variant, filename))
    }
}

/// Progress for a partially rendered job, capped below 100 until the
/// terminal transition sets it.
fn variant_progress(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return PROGRESS_SEED;
    }
    let pct = ((f64::from(completed) / f64::from(total)) * 100.0).round() as u8;
    pct.min(99)
}
