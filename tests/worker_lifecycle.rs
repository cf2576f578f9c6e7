//! Worker lifecycle: state transitions, progress, ordering, cleanup, caps.

mod common;

use std::time::Duration;

use common::{wait_for_terminal, TestHarness};
use overstamp::queue::QueueConfig;
use overstamp::store::{JobStatus, Variant};
use overstamp::Error;

#[tokio::test]
async fn single_pair_job_completes_with_one_artifact() {
    let (harness, _renderer) = TestHarness::with_stub(QueueConfig::default());
    let record = harness.record("anon_one", 1, &[Variant::Vertical]);
    let job_id = record.id.clone();
    let payload_paths: Vec<_> = record
        .payload
        .scratch_paths()
        .into_iter()
        .map(|p| p.to_path_buf())
        .collect();

    let snapshot = harness.queue.enqueue(record).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Pending);

    let record = wait_for_terminal(&harness.store, &job_id, Duration::from_secs(5)).await;
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(record.metrics.total_variants, 1);
    assert_eq!(record.metrics.completed_variants, 1);

    let result = record.result.expect("completed job must carry a result");
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].variant, Variant::Vertical);
    assert_eq!(result[0].url, format!("/output/{}", result[0].filename));
    assert!(harness.output_dir.join(&result[0].filename).exists());

    // Scratch inputs are gone after the terminal transition.
    for path in payload_paths {
        assert!(
            !path.exists(),
            "scratch file {} should be deleted",
            path.display()
        );
    }
}

#[tokio::test]
async fn artifacts_follow_variant_order_across_sources() {
    let (harness, _renderer) = TestHarness::with_stub(QueueConfig::default());
    // Insertion order deliberately scrambled; execution order must not be.
    let record = harness.record(
        "anon_order",
        2,
        &[Variant::Landscape, Variant::Vertical, Variant::Square],
    );
    let job_id = record.id.clone();

    harness.queue.enqueue(record).await.unwrap();
    let record = wait_for_terminal(&harness.store, &job_id, Duration::from_secs(5)).await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.metrics.total_variants, 6);
    let variants: Vec<Variant> = record.result.unwrap().iter().map(|a| a.variant).collect();
    assert_eq!(
        variants,
        vec![
            Variant::Vertical,
            Variant::Square,
            Variant::Landscape,
            Variant::Vertical,
            Variant::Square,
            Variant::Landscape,
        ]
    );
}

#[tokio::test]
async fn render_failure_fails_the_job_and_cleans_scratch() {
    // Second render call fails; the first variant lands.
    let (harness, _renderer) =
        TestHarness::with_configured_stub(QueueConfig::default(), |stub| stub.failing_from_call(1));

    let record = harness.record("anon_fail", 1, &[Variant::Vertical, Variant::Square]);
    let job_id = record.id.clone();
    let payload_paths: Vec<_> = record
        .payload
        .scratch_paths()
        .into_iter()
        .map(|p| p.to_path_buf())
        .collect();

    harness.queue.enqueue(record).await.unwrap();
    let record = wait_for_terminal(&harness.store, &job_id, Duration::from_secs(5)).await;

    assert_eq!(record.status, JobStatus::Failed);
    let error = record.error.expect("failed job must carry an error");
    assert!(error.contains("stub renderer failure"));
    assert!(record.finished_at.unwrap() >= record.started_at.unwrap());
    assert!(record.started_at.unwrap() >= record.created_at);
    assert_eq!(record.metrics.completed_variants, 1);
    assert!(record.progress < 100);

    for path in payload_paths {
        assert!(!path.exists());
    }
}

#[tokio::test]
async fn failed_job_does_not_halt_the_next_one() {
    // Only the very first render call fails.
    let (harness, _renderer) =
        TestHarness::with_configured_stub(QueueConfig::default(), |stub| stub.failing_only_call(0));

    let bad = harness.record("anon_a", 1, &[Variant::Vertical]);
    let bad_id = bad.id.clone();
    harness.queue.enqueue(bad).await.unwrap();

    let good = harness.record("anon_b", 1, &[Variant::Vertical]);
    let good_id = good.id.clone();
    harness.queue.enqueue(good).await.unwrap();

    let bad = wait_for_terminal(&harness.store, &bad_id, Duration::from_secs(5)).await;
    assert_eq!(bad.status, JobStatus::Failed);

    // The worker moves on to the next pending job.
    let good = wait_for_terminal(&harness.store, &good_id, Duration::from_secs(5)).await;
    assert_eq!(good.status, JobStatus::Completed);
}

#[tokio::test]
async fn owner_cap_rejects_at_limit_and_frees_on_completion() {
    let (harness, _renderer) = TestHarness::with_configured_stub(QueueConfig::default(), |stub| {
        stub.with_delay(Duration::from_millis(150))
    });

    let first = harness.record("anon_capped", 1, &[Variant::Square]);
    let first_id = first.id.clone();
    harness.queue.enqueue(first).await.unwrap();
    let second = harness.record("anon_capped", 1, &[Variant::Square]);
    harness.queue.enqueue(second).await.unwrap();

    // Third submission from the same owner hits the cap.
    let third = harness.record("anon_capped", 1, &[Variant::Square]);
    let err = harness.queue.enqueue(third).await.unwrap_err();
    match err {
        Error::TooManyActiveJobs { active, limit } => {
            assert_eq!(active, 2);
            assert_eq!(limit, 2);
        }
        other => panic!("expected TooManyActiveJobs, got {:?}", other),
    }

    // A different owner is unaffected.
    let other_owner = harness.record("anon_other", 1, &[Variant::Square]);
    harness.queue.enqueue(other_owner).await.unwrap();

    // Once one job completes, the owner may submit again.
    wait_for_terminal(&harness.store, &first_id, Duration::from_secs(5)).await;
    let fourth = harness.record("anon_capped", 1, &[Variant::Square]);
    harness.queue.enqueue(fourth).await.unwrap();
}

#[tokio::test]
async fn at_most_one_job_processes_at_any_time() {
    let (harness, _renderer) = TestHarness::with_configured_stub(QueueConfig::default(), |stub| {
        stub.with_delay(Duration::from_millis(40))
    });

    let mut ids = Vec::new();
    for owner in ["anon_w", "anon_x", "anon_y"] {
        let record = harness.record(owner, 1, &[Variant::Vertical]);
        ids.push(record.id.clone());
        harness.queue.enqueue(record).await.unwrap();
    }

    // While draining, never more than one processing job.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let mut processing_ids = Vec::new();
        let mut terminal = 0;
        for id in &ids {
            if let Some(record) = harness.store.get(id).await {
                match record.status {
                    JobStatus::Processing => processing_ids.push(id.clone()),
                    s if s.is_terminal() => terminal += 1,
                    _ => {}
                }
            }
        }
        assert!(
            processing_ids.len() <= 1,
            "observed {} processing jobs",
            processing_ids.len()
        );
        if terminal == ids.len() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "queue did not drain"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn re_enqueue_same_shape_gets_independent_lifecycle() {
    let (harness, _renderer) = TestHarness::with_stub(QueueConfig::default());

    let a = harness.record("anon_re", 1, &[Variant::Square]);
    let b = harness.record("anon_re2", 1, &[Variant::Square]);
    assert_ne!(a.id, b.id);

    let a_id = a.id.clone();
    let b_id = b.id.clone();
    harness.queue.enqueue(a).await.unwrap();
    harness.queue.enqueue(b).await.unwrap();

    let a = wait_for_terminal(&harness.store, &a_id, Duration::from_secs(5)).await;
    let b = wait_for_terminal(&harness.store, &b_id, Duration::from_secs(5)).await;
    assert_eq!(a.status, JobStatus::Completed);
    assert_eq!(b.status, JobStatus::Completed);
    assert_eq!(a.result.unwrap().len(), 1);
    assert_eq!(b.result.unwrap().len(), 1);
}

#[tokio::test]
async fn completed_variants_grow_monotonically_up_to_total() {
    let (harness, _renderer) = TestHarness::with_configured_stub(QueueConfig::default(), |stub| {
        stub.with_delay(Duration::from_millis(20))
    });

    let record = harness.record("anon_metrics", 1, &[Variant::Vertical, Variant::Square]);
    let job_id = record.id.clone();
    harness.queue.enqueue(record).await.unwrap();

    let mut last_completed = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = harness.store.get(&job_id).await.unwrap();
        if record.metrics.total_variants > 0 {
            assert!(record.metrics.completed_variants <= record.metrics.total_variants);
        }
        assert!(record.metrics.completed_variants >= last_completed);
        last_completed = record.metrics.completed_variants;
        if record.status.is_terminal() {
            assert_eq!(record.metrics.completed_variants, 2);
            assert_eq!(record.metrics.total_variants, 2);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job did not finish");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn progress_seeds_at_five_then_caps_below_hundred_until_done() {
    let (harness, _renderer) = TestHarness::with_configured_stub(QueueConfig::default(), |stub| {
        stub.with_delay(Duration::from_millis(60))
    });

    let record = harness.record("anon_progress", 1, &[Variant::Vertical]);
    let job_id = record.id.clone();
    harness.queue.enqueue(record).await.unwrap();

    let mut saw_seed = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = harness.store.get(&job_id).await.unwrap();
        match record.status {
            JobStatus::Processing => {
                assert!(record.progress >= 5 && record.progress <= 99);
                if record.progress == 5 {
                    saw_seed = true;
                }
            }
            JobStatus::Completed => {
                assert_eq!(record.progress, 100);
                break;
            }
            JobStatus::Failed => panic!("job unexpectedly failed"),
            JobStatus::Pending => assert_eq!(record.progress, 0),
        }
        assert!(tokio::time::Instant::now() < deadline, "job did not finish");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(saw_seed, "progress seed of 5 was never observed");
}
