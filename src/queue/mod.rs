//! Render job queue: FIFO state, single-consumer worker, supervisor.

pub mod supervisor;
pub mod worker;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;

use crate::config::AppConfig;
use crate::render::VariantRenderer;
use crate::store::{JobRecord, JobSnapshot, JobStatus, JobStore};
use crate::{Error, Result};

/// Progress reported as soon as a job enters `processing`, before the first
/// variant completes, so clients observe motion immediately.
pub const PROGRESS_SEED: u8 = 5;

/// Size of the rolling ring of successful job durations.
pub const DURATION_SAMPLE_WINDOW: usize = 20;

/// Queue behavior knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum jobs in {pending, processing} per owner fingerprint.
    pub owner_job_limit: u32,
    /// Assumed job duration before any samples exist; also sets the 25%
    /// floor of the rolling average.
    pub default_job_duration_ms: u64,
    /// Minimum elapsed time before a processing job can be declared stuck.
    pub stall_timeout_floor: Duration,
    /// Consecutive stalls that open the circuit breaker.
    pub stall_threshold: u32,
    /// How long the breaker stays open once tripped.
    pub breaker_cooldown: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            owner_job_limit: crate::config::DEFAULT_OWNER_JOB_LIMIT,
            default_job_duration_ms: 120_000,
            stall_timeout_floor: Duration::from_secs(180),
            stall_threshold: 2,
            breaker_cooldown: Duration::from_secs(60),
        }
    }
}

impl QueueConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            owner_job_limit: config.max_active_jobs_per_owner,
            ..Self::default()
        }
    }
}

/// Mutable queue state. One value owned by the queue; every field mutation
/// happens under the queue's mutex, never across an await point.
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    /// Pending job IDs in strict FIFO order.
    pub(crate) pending: VecDeque<String>,
    /// ID of the job currently being rendered, if any.
    pub(crate) currently_processing: Option<String>,
    /// Durations of recent successful jobs, in milliseconds.
    pub(crate) recent_durations_ms: VecDeque<u64>,
    /// Monotonic counter that fences workers the supervisor gave up on.
    pub(crate) worker_generation: u64,
    /// Whether a worker task currently owns the consumer role.
    pub(crate) worker_running: bool,
    /// Consecutive supervisor-detected stalls.
    pub(crate) consecutive_stalls: u32,
    /// When the circuit breaker opened, if it is open.
    pub(crate) breaker_opened_at: Option<Instant>,
}

/// The render job queue and its single-consumer worker.
pub struct RenderQueue {
    pub(crate) store: Arc<JobStore>,
    pub(crate) renderer: Arc<dyn VariantRenderer>,
    pub(crate) output_dir: PathBuf,
    pub(crate) config: QueueConfig,
    pub(crate) state: Mutex<QueueState>,
    /// Handle to self for spawning worker tasks.
    pub(crate) self_ref: Weak<RenderQueue>,
}

impl RenderQueue {
    pub fn new(
        store: Arc<JobStore>,
        renderer: Arc<dyn VariantRenderer>,
        output_dir: impl Into<PathBuf>,
        config: QueueConfig,
    ) -> Arc<Self> {
        let output_dir = output_dir.into();
        Arc::new_cyclic(|self_ref| Self {
            store,
            renderer,
            output_dir,
            config,
            state: Mutex::new(QueueState::default()),
            self_ref: self_ref.clone(),
        })
    }

    /// Admit a job: enforce the per-owner cap, store the record, append to
    /// the pending queue, run the supervisor, and start the worker unless
    /// the circuit breaker holds it back.
    pub async fn enqueue(&self, record: JobRecord) -> Result<JobSnapshot> {
        let active = self.store.count_active_for_owner(&record.owner_id).await;
        if active >= self.config.owner_job_limit {
            return Err(Error::TooManyActiveJobs {
                active,
                limit: self.config.owner_job_limit,
            });
        }

        self.store.evict_expired().await;

        let job_id = record.id.clone();
        let snapshot = self.store.create(record).await;
        {
            let mut state = self.state.lock();
            state.pending.push_back(job_id);
        }

        self.supervise().await;
        self.ensure_worker();
        Ok(snapshot)
    }

    /// Jobs ahead of the given job: its index in the pending sequence, plus
    /// one when another job is currently processing.
    pub fn queue_position(&self, job_id: &str) -> u32 {
        let state = self.state.lock();
        match state.pending.iter().position(|id| id == job_id) {
            Some(index) => index as u32 + state.currently_processing.is_some() as u32,
            None => 0,
        }
    }

    /// Rolling average duration of recent successful jobs.
    pub fn average_duration_ms(&self) -> u64 {
        let state = self.state.lock();
        average_duration_ms(&state.recent_durations_ms, &self.config)
    }

    /// Estimated wait until the job finishes (terminal: zero).
    pub fn estimated_wait_ms(&self, record: &JobRecord) -> u64 {
        let avg = self.average_duration_ms();
        match record.status {
            JobStatus::Completed | JobStatus::Failed => 0,
            JobStatus::Processing => {
                let elapsed = record
                    .started_at
                    .map(|s| (Utc::now() - s).num_milliseconds().max(0) as u64)
                    .unwrap_or(0);
                avg.saturating_sub(elapsed).max(avg / 10)
            }
            JobStatus::Pending => u64::from(self.queue_position(&record.id)) * avg,
        }
    }

    /// Estimated wait for a snapshot loaded from a secondary tier, where
    /// queue position is unknowable on this instance.
    pub fn estimated_wait_ms_for_snapshot(&self, snapshot: &JobSnapshot) -> u64 {
        let avg = self.average_duration_ms();
        match snapshot.status {
            JobStatus::Completed | JobStatus::Failed => 0,
            JobStatus::Processing => {
                let elapsed = snapshot
                    .started_at
                    .map(|s| (Utc::now() - s).num_milliseconds().max(0) as u64)
                    .unwrap_or(0);
                avg.saturating_sub(elapsed).max(avg / 10)
            }
            JobStatus::Pending => avg,
        }
    }

    pub(crate) fn generation_current(&self, generation: u64) -> bool {
        self.state.lock().worker_generation == generation
    }

    /// ID of the job currently being rendered, if any.
    pub fn currently_processing(&self) -> Option<String> {
        self.state.lock().currently_processing.clone()
    }

    /// Number of jobs waiting in the pending sequence.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether the circuit breaker currently suppresses worker starts.
    pub fn is_breaker_open(&self) -> bool {
        let state = self.state.lock();
        match state.breaker_opened_at {
            Some(opened_at) => opened_at.elapsed() < self.config.breaker_cooldown,
            None => false,
        }
    }

    /// Consecutive stalls observed by the supervisor.
    pub fn consecutive_stalls(&self) -> u32 {
        self.state.lock().consecutive_stalls
    }

    /// Current worker generation.
    pub fn worker_generation(&self) -> u64 {
        self.state.lock().worker_generation
    }
}

fn average_duration_ms(samples: &VecDeque<u64>, config: &QueueConfig) -> u64 {
    if samples.is_empty() {
        return config.default_job_duration_ms;
    }
    let mean = samples.iter().sum::<u64>() / samples.len() as u64;
    mean.max(config.default_job_duration_ms / 4)
}
