//! Guarantees the job client keeps under failures, cancellation and
//! arbitrary interleavings of user actions with polling

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use cloudscan_client::infra::testing::{FlakyHandleSlot, StubTransport};
use cloudscan_client::{
    ErrorKind, JobClientError, MemoryHandleSlot, SuspendReason, TrackingPhase,
    TrackingState,
};
use cloudscan_model::JobId;
use common::{Harness, INTERVAL, key_file, settle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

fn job_id(raw: &str) -> JobId {
    JobId::new(raw).expect("valid job id")
}

async fn submit_selected(h: &Harness, project: &str) -> JobId {
    let mut context = h.client.resolve(key_file()).await.expect("discovery");
    context.select(project).expect("known project");
    match h.client.submit_job(&context).await.expect("submit") {
        cloudscan_client::Submission::Tracking(id) => id,
        other => panic!("expected tracking submission, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_discovery_leaves_nothing_behind() {
    let stub = StubTransport::new();
    stub.fail_discovery("key rejected");
    let slot = Arc::new(MemoryHandleSlot::new());
    let h = Harness::new(stub.clone(), slot.clone());

    let err = h.client.resolve(key_file()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DiscoveryFailure);

    h.settle().await;
    assert_eq!(h.client.state(), TrackingState::Idle);
    assert_eq!(slot.write_count(), 0);
    assert_eq!(h.clock.pending_timers(), 0);
}

#[tokio::test]
async fn unselected_context_is_not_submitted() {
    let stub = StubTransport::new().with_projects("key-1", &["proj-a"]);
    let h = Harness::new(stub.clone(), Arc::new(MemoryHandleSlot::new()));

    let context = h.client.resolve(key_file()).await.expect("discovery");
    let err = h.client.submit_job(&context).await.unwrap_err();

    assert!(matches!(err, JobClientError::TargetNotSelected));
    assert!(stub.async_submissions().is_empty());
    assert_eq!(h.client.state(), TrackingState::Idle);
}

#[tokio::test]
async fn failed_submission_changes_nothing() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a"])
        .with_job_ids(&["j-1"]);
    let slot = Arc::new(MemoryHandleSlot::new());
    let h = Harness::new(stub.clone(), slot.clone());

    let first = submit_selected(&h, "proj-a").await;
    h.settle().await;

    stub.fail_submissions(Some("worker overloaded"));
    let mut context = h.client.resolve(key_file()).await.expect("discovery");
    context.select("proj-a").expect("known project");
    let err = h.client.submit_job(&context).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SubmissionFailure);
    assert!(err.to_string().contains("worker overloaded"));

    // The earlier job is still tracked and polled.
    assert_eq!(slot.peek().as_deref(), Some(first.as_str()));
    assert_eq!(h.client.current_progress().job_id, Some(first.clone()));
    h.tick().await;
    assert_eq!(stub.status_calls(), vec![first]);
}

#[tokio::test]
async fn handle_write_failure_blocks_polling() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a"])
        .with_job_ids(&["j-1"]);
    let slot = Arc::new(FlakyHandleSlot::new());
    slot.fail_writes(true);
    let h = Harness::new(stub.clone(), slot.clone());

    let mut context = h.client.resolve(key_file()).await.expect("discovery");
    context.select("proj-a").expect("known project");
    let err = h.client.submit_job(&context).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    h.settle().await;
    assert!(!h.client.is_polling().await);
    assert_eq!(h.clock.pending_timers(), 0);
    assert_eq!(h.client.state(), TrackingState::Idle);

    h.clock.advance(INTERVAL * 3);
    settle().await;
    assert!(stub.status_calls().is_empty());
}

#[tokio::test]
async fn handle_write_failure_keeps_previous_job_tracked() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a", "proj-b"])
        .with_job_ids(&["j-1", "j-2"]);
    let slot = Arc::new(FlakyHandleSlot::new());
    let h = Harness::new(stub.clone(), slot.clone());
    submit_selected(&h, "proj-a").await;
    stub.push_status("running", 30, None);
    h.settle().await;
    h.tick().await;

    slot.fail_writes(true);
    let mut context = h.client.resolve(key_file()).await.expect("discovery");
    context.select("proj-b").expect("known project");
    let err = h.client.submit_job(&context).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    match h.client.state() {
        TrackingState::Active { job, .. } => {
            assert_eq!(job.id, job_id("j-1"));
            assert_eq!(job.progress, 30);
        }
        other => panic!("expected j-1 still active, got {other:?}"),
    }
    assert!(h.client.is_polling().await);
    assert_eq!(slot.peek().as_deref(), Some("j-1"));

    h.tick().await;
    assert_eq!(stub.status_calls(), vec![job_id("j-1"), job_id("j-1")]);
}

#[tokio::test]
async fn handle_clear_failure_still_reports_terminal() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a"])
        .with_job_ids(&["j-1"]);
    let slot = Arc::new(FlakyHandleSlot::new());
    let h = Harness::new(stub.clone(), slot.clone());
    submit_selected(&h, "proj-a").await;
    slot.fail_removes(true);

    stub.push_status("completed", 100, Some(json!({"ok": true})));
    h.settle().await;
    h.tick().await;

    assert_eq!(h.terminal_count(), 1);
    // Left behind; the next resume will find the job already finished.
    assert_eq!(slot.peek().as_deref(), Some("j-1"));
}

#[tokio::test]
async fn cancel_keeps_handle_for_resume() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a"])
        .with_job_ids(&["j-1"]);
    let slot = Arc::new(MemoryHandleSlot::new());
    let h = Harness::new(stub.clone(), slot.clone());
    submit_selected(&h, "proj-a").await;

    stub.push_status("running", 25, None);
    h.settle().await;
    h.tick().await;

    assert!(h.client.cancel_tracking().await);
    assert!(!h.client.cancel_tracking().await);
    match h.client.state() {
        TrackingState::Suspended {
            job,
            reason: SuspendReason::Cancelled,
        } => {
            assert_eq!(job.id, job_id("j-1"));
            assert_eq!(job.progress, 25);
        }
        other => panic!("expected cancelled state, got {other:?}"),
    }
    assert_eq!(slot.peek().as_deref(), Some("j-1"));
    assert_eq!(h.clock.pending_timers(), 0);

    h.tick().await;
    assert_eq!(stub.status_calls().len(), 1);

    assert!(h.client.resume_if_pending().await.expect("resume"));
    h.settle().await;
    stub.push_status("completed", 100, None);
    h.tick().await;
    assert_eq!(h.terminal_count(), 1);
    assert_eq!(slot.peek(), None);
}

#[tokio::test]
async fn reset_forgets_everything() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a"])
        .with_job_ids(&["j-1"]);
    let slot = Arc::new(MemoryHandleSlot::new());
    let h = Harness::new(stub.clone(), slot.clone());
    submit_selected(&h, "proj-a").await;
    h.settle().await;

    h.client.reset().await.expect("reset");

    assert_eq!(h.client.state(), TrackingState::Idle);
    assert_eq!(slot.peek(), None);
    assert_eq!(h.clock.pending_timers(), 0);
    assert!(!h.client.resume_if_pending().await.expect("resume"));
}

#[tokio::test]
async fn failed_reset_leaves_tracking_untouched() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a"])
        .with_job_ids(&["j-1"]);
    let slot = Arc::new(FlakyHandleSlot::new());
    let h = Harness::new(stub.clone(), slot.clone());
    submit_selected(&h, "proj-a").await;
    h.settle().await;

    slot.fail_removes(true);
    let err = h.client.reset().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    assert_eq!(h.client.current_progress().phase, TrackingPhase::Active);
    assert!(h.client.is_polling().await);
    assert_eq!(slot.peek().as_deref(), Some("j-1"));
    assert_eq!(h.clock.pending_timers(), 1);
}

#[tokio::test]
async fn resuming_the_polled_job_keeps_its_session() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a"])
        .with_job_ids(&["j-1"]);
    let h = Harness::new(stub.clone(), Arc::new(MemoryHandleSlot::new()));
    submit_selected(&h, "proj-a").await;
    stub.push_status("running", 40, None);
    h.settle().await;
    h.tick().await;

    assert!(h.client.resume_if_pending().await.expect("resume"));
    h.settle().await;

    let snapshot = h.client.current_progress();
    assert_eq!(snapshot.job_id, Some(job_id("j-1")));
    assert_eq!(snapshot.progress, 40);
    assert_eq!(h.clock.pending_timers(), 1);
    assert_eq!(stub.status_calls().len(), 1);
}

#[tokio::test]
async fn repeated_transport_failures_suspend_tracking() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a"])
        .with_job_ids(&["j-1"]);
    let slot = Arc::new(MemoryHandleSlot::new());
    let h = Harness::with_failure_limit(stub.clone(), slot.clone(), Some(3));
    submit_selected(&h, "proj-a").await;
    h.settle().await;

    for _ in 0..3 {
        stub.push_status_failure("connection reset");
    }
    for _ in 0..2 {
        h.tick().await;
        assert_eq!(h.client.current_progress().phase, TrackingPhase::Active);
    }
    h.tick().await;

    let state = h.client.state();
    assert_eq!(state.phase(), TrackingPhase::Suspended);
    let err = state.error().expect("suspension carries an error");
    assert_eq!(err.kind(), ErrorKind::PollTransportFailure);
    assert_eq!(slot.peek().as_deref(), Some("j-1"));
    assert_eq!(h.terminal_count(), 0);
}

#[tokio::test]
async fn transport_failures_are_retried_without_limit() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a"])
        .with_job_ids(&["j-1"]);
    let h = Harness::new(stub.clone(), Arc::new(MemoryHandleSlot::new()));
    submit_selected(&h, "proj-a").await;
    h.settle().await;

    for _ in 0..10 {
        stub.push_status_failure("timeout");
    }
    stub.push_status("completed", 100, None);
    for _ in 0..11 {
        h.tick().await;
    }
    assert_eq!(h.terminal_count(), 1);
}

#[tokio::test]
async fn resubmitting_replaces_the_tracked_job() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a", "proj-b"])
        .with_job_ids(&["j-1", "j-2"]);
    let slot = Arc::new(MemoryHandleSlot::new());
    let h = Harness::new(stub.clone(), slot.clone());

    submit_selected(&h, "proj-a").await;
    h.settle().await;
    submit_selected(&h, "proj-b").await;
    h.settle().await;

    assert_eq!(h.clock.pending_timers(), 1);
    assert_eq!(slot.peek().as_deref(), Some("j-2"));
    h.tick().await;
    h.tick().await;
    assert_eq!(stub.status_calls(), vec![job_id("j-2"), job_id("j-2")]);
}

#[tokio::test]
async fn repeated_full_progress_ticks_emit_one_terminal() {
    let stub = StubTransport::new()
        .with_projects("key-1", &["proj-a"])
        .with_job_ids(&["j-1"]);
    let h = Harness::new(stub.clone(), Arc::new(MemoryHandleSlot::new()));
    submit_selected(&h, "proj-a").await;
    h.settle().await;

    stub.set_fallback_status("running", 100, Some(json!({"findings": 1})));
    for _ in 0..4 {
        h.tick().await;
    }
    assert_eq!(h.terminal_count(), 1);
    assert_eq!(stub.status_calls().len(), 1);
}

/// Random user actions interleaved with polling never produce a second
/// concurrent request, a second armed timer or a duplicate terminal event.
#[tokio::test]
async fn random_interleavings_keep_a_single_session() {
    for seed in 0..24u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let stub = StubTransport::new().with_projects("key-1", &["proj-a"]);
        stub.set_response_yields(3);
        let slot = Arc::new(MemoryHandleSlot::new());
        let h = Harness::new(stub.clone(), slot.clone());

        for _ in 0..60 {
            match rng.random_range(0..10) {
                0 | 1 => {
                    submit_selected(&h, "proj-a").await;
                }
                2 => {
                    h.client.cancel_tracking().await;
                }
                3 => {
                    h.client.resume_if_pending().await.expect("resume");
                }
                4 => {
                    h.client.reset().await.expect("reset");
                }
                5 => {
                    let progress = rng.random_range(0..=100);
                    if rng.random_bool(0.2) {
                        stub.push_status(
                            "running",
                            progress,
                            Some(json!({"done": true})),
                        );
                    } else {
                        stub.push_status("running", progress, None);
                    }
                }
                _ => h.clock.advance(INTERVAL),
            }

            for _ in 0..rng.random_range(0..6) {
                tokio::task::yield_now().await;
            }

            assert!(
                stub.max_in_flight() <= 1,
                "seed {seed}: concurrent status requests"
            );
            assert!(
                h.clock.pending_timers() <= 1,
                "seed {seed}: more than one armed timer"
            );
        }

        settle().await;
        let mut per_job: HashMap<JobId, usize> = HashMap::new();
        for event in h.terminals.lock().iter() {
            *per_job.entry(event.job.id.clone()).or_default() += 1;
        }
        assert!(
            per_job.values().all(|count| *count == 1),
            "seed {seed}: duplicate terminal events {per_job:?}"
        );
    }
}
