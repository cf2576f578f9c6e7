//! Stuck-job supervision and circuit breaking.
//!
//! The supervisor runs opportunistically on each enqueue, before the worker
//! is (re)started. There is no independent timer: a stalled job is only
//! reaped when new work arrives.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::warn;

use super::RenderQueue;
use crate::store::JobStatus;
use crate::utils::fs;

impl RenderQueue {
    /// Detect and reap a stalled processing job.
    ///
    /// A job is stalled when its elapsed processing time exceeds
    /// `max(average x 4, floor)`. Reaping fails the job, cleans up its
    /// scratch files, bumps the worker generation (fencing the worker that
    /// owned it), and counts toward the circuit breaker.
    pub(crate) async fn supervise(&self) {
        let candidate = { self.state.lock().currently_processing.clone() };
        let Some(job_id) = candidate else { return };
        let Some(record) = self.store.get(&job_id).await else {
            return;
        };
        if record.status != JobStatus::Processing {
            return;
        }
        let Some(started_at) = record.started_at else {
            return;
        };

        let timeout = self.stall_timeout();
        let elapsed = (Utc::now() - started_at).to_std().unwrap_or_default();
        if elapsed <= timeout {
            return;
        }

        let timeout_secs = timeout.as_secs();
        warn!(
            job_id = %job_id,
            elapsed_secs = elapsed.as_secs(),
            timeout_secs,
            "Stalled job detected; aborting"
        );

        if let Err(e) = self
            .store
            .update(&job_id, |r| {
                r.status = JobStatus::Failed;
                r.error = Some(format!(
                    "job exceeded {} seconds, aborted by supervisor",
                    timeout_secs
                ));
                r.finished_at = Some(Utc::now());
            })
            .await
        {
            warn!(job_id = %job_id, error = %e, "Failed to record supervisor abort");
        }

        for path in record.payload.scratch_paths() {
            fs::remove_file_best_effort(path).await;
        }

        let mut state = self.state.lock();
        state.consecutive_stalls += 1;
        state.worker_generation += 1;
        state.worker_running = false;
        state.currently_processing = None;
        if state.consecutive_stalls >= self.config.stall_threshold {
            warn!(
                stalls = state.consecutive_stalls,
                cooldown_secs = self.config.breaker_cooldown.as_secs(),
                "Circuit breaker opened"
            );
            state.breaker_opened_at = Some(Instant::now());
        }
    }

    /// Timeout after which a processing job is declared stuck.
    pub fn stall_timeout(&self) -> Duration {
        let avg = Duration::from_millis(self.average_duration_ms());
        std::cmp::max(avg * 4, self.config.stall_timeout_floor)
    }
}
