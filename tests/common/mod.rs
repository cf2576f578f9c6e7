//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use overstamp::queue::{QueueConfig, RenderQueue};
use overstamp::render::VariantRenderer;
use overstamp::store::{
    JobPayload, JobRecord, JobStatus, JobStore, SourceVideoRef, TemplateMetadata, TemplateRef,
    Variant,
};

/// Renderer stub that writes a tiny output file after an optional delay,
/// failing from the nth call onward when configured.
pub struct StubRenderer {
    scratch_dir: PathBuf,
    delay: Duration,
    fail_from_call: Option<usize>,
    fail_only_call: Option<usize>,
    calls: AtomicUsize,
}

impl StubRenderer {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            delay: Duration::ZERO,
            fail_from_call: None,
            fail_only_call: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the nth call and every call after it (0-indexed).
    pub fn failing_from_call(mut self, call: usize) -> Self {
        self.fail_from_call = Some(call);
        self
    }

    /// Fail exactly the nth call (0-indexed); all others succeed.
    pub fn failing_only_call(mut self, call: usize) -> Self {
        self.fail_only_call = Some(call);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn should_fail(&self, call: usize) -> bool {
        self.fail_from_call.is_some_and(|from| call >= from)
            || self.fail_only_call == Some(call)
    }
}

#[async_trait]
impl VariantRenderer for StubRenderer {
    async fn render(
        &self,
        source: &SourceVideoRef,
        template: &TemplateRef,
    ) -> overstamp::Result<PathBuf> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail(call) {
            return Err(overstamp::Error::PipelineFailed(
                "stub renderer failure".to_string(),
            ));
        }

        let stem = source
            .scratch_path
            .file_stem()
            .unwrap()
            .to_string_lossy()
            .to_string();
        let path = self
            .scratch_dir
            .join(format!("{}_{}_{}.mp4", template.variant, stem, call));
        tokio::fs::write(&path, b"stub-mp4").await?;
        Ok(path)
    }
}

/// Renderer stub that never finishes within a test's lifetime.
pub struct HangRenderer;

#[async_trait]
impl VariantRenderer for HangRenderer {
    async fn render(
        &self,
        _source: &SourceVideoRef,
        _template: &TemplateRef,
    ) -> overstamp::Result<PathBuf> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(overstamp::Error::PipelineFailed("unreachable".to_string()))
    }
}

/// A store + queue pair backed by temp scratch and output directories.
pub struct TestHarness {
    pub tmp: TempDir,
    pub scratch_dir: PathBuf,
    pub output_dir: PathBuf,
    pub store: Arc<JobStore>,
    pub queue: Arc<RenderQueue>,
}

impl TestHarness {
    /// Build a harness whose renderer is produced from the scratch dir.
    pub fn build(
        config: QueueConfig,
        make_renderer: impl FnOnce(&Path) -> Arc<dyn VariantRenderer>,
    ) -> Self {
        let tmp = TempDir::new().unwrap();
        let scratch_dir = tmp.path().join("scratch");
        let output_dir = tmp.path().join("output");
        std::fs::create_dir_all(&scratch_dir).unwrap();
        std::fs::create_dir_all(&output_dir).unwrap();

        let renderer = make_renderer(&scratch_dir);
        let store = Arc::new(JobStore::new(86_400));
        let queue = RenderQueue::new(store.clone(), renderer, output_dir.clone(), config);
        Self {
            tmp,
            scratch_dir,
            output_dir,
            store,
            queue,
        }
    }

    /// Harness with a plain instant-success stub renderer.
    pub fn with_stub(config: QueueConfig) -> (Self, Arc<StubRenderer>) {
        Self::with_configured_stub(config, |stub| stub)
    }

    /// Harness with a stub renderer customized by the caller.
    pub fn with_configured_stub(
        config: QueueConfig,
        configure: impl FnOnce(StubRenderer) -> StubRenderer,
    ) -> (Self, Arc<StubRenderer>) {
        let mut slot: Option<Arc<StubRenderer>> = None;
        let harness = Self::build(config, |scratch_dir| {
            let stub = Arc::new(configure(StubRenderer::new(scratch_dir)));
            slot = Some(stub.clone());
            let renderer: Arc<dyn VariantRenderer> = stub;
            renderer
        });
        (harness, slot.unwrap())
    }

    /// Harness whose renderer never finishes.
    pub fn with_hang(config: QueueConfig) -> Self {
        Self::build(config, |_| Arc::new(HangRenderer) as Arc<dyn VariantRenderer>)
    }

    /// Build a payload with real scratch files so cleanup can be observed.
    pub fn payload(&self, sources: usize, variants: &[Variant]) -> JobPayload {
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let sources = (0..sources)
            .map(|i| {
                let path = self.scratch_dir.join(format!("source_{}_{}_{}.mp4", tag, i, "in"));
                std::fs::write(&path, b"source").unwrap();
                SourceVideoRef {
                    scratch_path: path,
                    original_name: format!("clip_{}.mp4", i),
                }
            })
            .collect();
        let templates = variants
            .iter()
            .map(|&variant| {
                let path = self.scratch_dir.join(format!("template_{}_{}.png", tag, variant));
                std::fs::write(&path, b"template").unwrap();
                TemplateRef {
                    scratch_path: path,
                    original_name: format!("{}.png", variant),
                    variant,
                    metadata: TemplateMetadata::default(),
                }
            })
            .collect();
        JobPayload { sources, templates }
    }

    pub fn record(&self, owner: &str, sources: usize, variants: &[Variant]) -> JobRecord {
        JobRecord::new(owner, self.payload(sources, variants))
    }
}

/// Poll until the job reaches a terminal state.
pub async fn wait_for_terminal(store: &JobStore, job_id: &str, timeout: Duration) -> JobRecord {
    wait_until(store, job_id, timeout, |r| r.status.is_terminal()).await
}

/// Poll until the job reaches the given status.
pub async fn wait_for_status(
    store: &JobStore,
    job_id: &str,
    status: JobStatus,
    timeout: Duration,
) -> JobRecord {
    wait_until(store, job_id, timeout, |r| r.status == status).await
}

async fn wait_until(
    store: &JobStore,
    job_id: &str,
    timeout: Duration,
    predicate: impl Fn(&JobRecord) -> bool,
) -> JobRecord {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(record) = store.get(job_id).await {
            if predicate(&record) {
                return record;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} did not reach the expected state within {:?}",
            job_id,
            timeout
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
