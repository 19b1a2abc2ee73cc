//! Orchestration sequences against scriptable collaborators

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use underlamp_api::{Actor, LifecycleState, OutcomeKind};
use underlamp_config::Timings;
use underlamp_core::{AutoShutdown, ExpiryFired, Lifecycle, MonotonicClock, Orchestrator};
use underlamp_host_api::{
    DaemonCall, MockDaemon, MockResource, RecordingNotifier, ResourceCall, ResourceStatus,
    ResourceStopMode,
};

struct Harness {
    orchestrator: Orchestrator,
    resource: Arc<MockResource>,
    daemon: Arc<MockDaemon>,
    notifier: Arc<RecordingNotifier>,
    expiries: mpsc::UnboundedReceiver<ExpiryFired>,
}

fn harness() -> Harness {
    let clock = Arc::new(MonotonicClock::new());
    let (lifecycle, expiries) = Lifecycle::new(clock.clone());
    let resource = Arc::new(MockResource::stopped());
    let daemon = Arc::new(MockDaemon::stopped());
    let notifier = Arc::new(RecordingNotifier::new());

    let orchestrator = Orchestrator::new(
        Arc::new(lifecycle),
        resource.clone(),
        daemon.clone(),
        notifier.clone(),
        clock,
        Timings::default(),
    )
    .with_instance_name("Pixelmon");

    Harness {
        orchestrator,
        resource,
        daemon,
        notifier,
        expiries,
    }
}

fn steve() -> Actor {
    Actor::operator("Steve")
}

const HOUR: Duration = Duration::from_secs(3600);
const HALF_HOUR: Duration = Duration::from_secs(1800);

#[tokio::test(start_paused = true)]
async fn start_brings_everything_up() {
    let h = harness();

    let outcome = h.orchestrator.start(&steve(), HOUR).await;
    assert_eq!(outcome.kind, OutcomeKind::Completed, "{}", outcome.message);

    let status = h.orchestrator.status();
    assert_eq!(status.state, LifecycleState::Running);
    assert_eq!(
        status.expire_time.unwrap() - status.start_time.unwrap(),
        chrono::Duration::minutes(60)
    );
    assert!(h.orchestrator.lifecycle().timer_armed());

    assert_eq!(h.resource.status(), ResourceStatus::Running);
    assert_eq!(h.resource.commands(), vec![ResourceCall::Start]);
    assert_eq!(h.daemon.calls()[0], DaemonCall::Start);
    assert!(h.notifier.contains("Steve"));
    assert!(h.notifier.contains("203.0.113.10"));
}

#[tokio::test(start_paused = true)]
async fn start_skips_boot_when_resource_already_running() {
    let h = harness();
    h.resource.set_status(ResourceStatus::Running);

    let outcome = h.orchestrator.start(&steve(), HALF_HOUR).await;
    assert!(outcome.is_completed());
    assert!(h.resource.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_admit_exactly_one() {
    let h = harness();

    let steve_actor = steve();
    let alex_actor = Actor::operator("Alex");
    let (first, second) = tokio::join!(
        h.orchestrator.start(&steve_actor, HOUR),
        h.orchestrator.start(&alex_actor, HOUR),
    );

    assert_eq!(first.kind, OutcomeKind::Completed);
    assert_eq!(second.kind, OutcomeKind::Rejected);
    assert!(second.message.contains("starting"));
    assert_eq!(h.resource.commands(), vec![ResourceCall::Start]);
    assert_eq!(h.orchestrator.status().state, LifecycleState::Running);
}

#[tokio::test(start_paused = true)]
async fn resource_that_never_boots_times_out_without_daemon_calls() {
    let h = harness();
    *h.resource.stuck.lock().unwrap() = true;
    let started = tokio::time::Instant::now();

    let outcome = h.orchestrator.start(&steve(), HOUR).await;

    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert!(outcome.message.contains("timed out"), "{}", outcome.message);
    assert!(started.elapsed() >= Duration::from_secs(120));
    assert_eq!(h.orchestrator.status().state, LifecycleState::Stopped);
    assert!(h.daemon.calls().is_empty());
    assert!(!h.orchestrator.lifecycle().timer_armed());
}

#[tokio::test(start_paused = true)]
async fn daemon_start_failure_returns_to_stopped() {
    let h = harness();
    *h.daemon.fail_start.lock().unwrap() = true;

    let outcome = h.orchestrator.start(&steve(), HOUR).await;

    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert_eq!(h.orchestrator.status().state, LifecycleState::Stopped);
    assert!(h.notifier.contains("Start failed"));
}

#[tokio::test(start_paused = true)]
async fn stop_while_stopped_touches_nothing() {
    let h = harness();

    let outcome = h.orchestrator.stop(&steve()).await;

    assert_eq!(outcome.kind, OutcomeKind::Rejected);
    assert!(h.resource.calls().is_empty());
    assert!(h.daemon.calls().is_empty());
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_takes_daemon_then_resource_down() {
    let h = harness();
    h.orchestrator.start(&steve(), HOUR).await;

    let outcome = h.orchestrator.stop(&steve()).await;

    assert_eq!(outcome.kind, OutcomeKind::Completed, "{}", outcome.message);
    assert_eq!(h.orchestrator.status().state, LifecycleState::Stopped);
    assert!(!h.orchestrator.lifecycle().timer_armed());
    assert_eq!(
        h.resource.commands(),
        vec![
            ResourceCall::Start,
            ResourceCall::Stop {
                force: false,
                mode: ResourceStopMode::CostSaving
            }
        ]
    );
    let daemon_calls = h.daemon.calls();
    let stop_at = daemon_calls.iter().position(|c| *c == DaemonCall::Stop).unwrap();
    assert_eq!(daemon_calls[stop_at + 1], DaemonCall::Kill);
    assert!(h.notifier.contains("Stop succeeded"));
}

#[tokio::test(start_paused = true)]
async fn daemon_stop_failure_rolls_back_to_running() {
    let h = harness();
    h.orchestrator.start(&steve(), HOUR).await;
    let expire = h.orchestrator.status().expire_time;
    *h.daemon.fail_stop.lock().unwrap() = true;

    let outcome = h.orchestrator.stop(&steve()).await;

    assert_eq!(outcome.kind, OutcomeKind::Failed);
    let status = h.orchestrator.status();
    assert_eq!(status.state, LifecycleState::Running);
    assert_eq!(status.expire_time, expire);
    assert!(h.orchestrator.lifecycle().timer_armed());
    assert_eq!(h.resource.commands(), vec![ResourceCall::Start]);
    assert!(h.notifier.contains("Resource status"));
}

#[tokio::test(start_paused = true)]
async fn resource_stop_failure_is_partial_and_commits_to_stopped() {
    let h = harness();
    h.orchestrator.start(&steve(), HOUR).await;
    *h.resource.fail_stop.lock().unwrap() = true;

    let outcome = h.orchestrator.stop(&steve()).await;

    assert_eq!(outcome.kind, OutcomeKind::PartialFailure);
    assert!(outcome.message.contains("Daemon stopped"));
    assert_eq!(h.orchestrator.status().state, LifecycleState::Stopped);

    let calls = h.resource.calls();
    let stop_at = calls
        .iter()
        .position(|c| matches!(c, ResourceCall::Stop { .. }))
        .unwrap();
    assert!(calls[stop_at + 1..].contains(&ResourceCall::DescribeStatus));
    assert!(h.notifier.contains("Resource stop failed"));
    assert!(h.notifier.contains("Resource status"));
}

#[tokio::test(start_paused = true)]
async fn extend_moves_expiry_forward() {
    let h = harness();
    h.orchestrator.start(&steve(), HALF_HOUR).await;
    let before = h.orchestrator.status().expire_time.unwrap();
    h.daemon.set_status(underlamp_host_api::DaemonStatus::Running);

    let outcome = h.orchestrator.extend(&steve(), HALF_HOUR).await;

    assert!(outcome.is_completed(), "{}", outcome.message);
    let after = h.orchestrator.status().expire_time.unwrap();
    assert_eq!(after - before, chrono::Duration::minutes(30));
    assert_eq!(h.orchestrator.status().state, LifecycleState::Running);
}

#[tokio::test(start_paused = true)]
async fn extend_refused_when_resource_is_not_running() {
    let h = harness();
    h.orchestrator.start(&steve(), HALF_HOUR).await;
    let before = h.orchestrator.status().expire_time;
    h.resource.set_status(ResourceStatus::Stopped);

    let outcome = h.orchestrator.extend(&steve(), HALF_HOUR).await;

    assert_eq!(outcome.kind, OutcomeKind::Rejected);
    assert_eq!(h.orchestrator.status().expire_time, before);
    assert_eq!(h.orchestrator.status().state, LifecycleState::Running);
}

#[tokio::test(start_paused = true)]
async fn extend_while_stopped_is_rejected() {
    let h = harness();
    h.resource.set_status(ResourceStatus::Running);
    h.daemon.set_status(underlamp_host_api::DaemonStatus::Running);

    let outcome = h.orchestrator.extend(&steve(), HALF_HOUR).await;

    assert_eq!(outcome.kind, OutcomeKind::Rejected);
    assert_eq!(h.orchestrator.status().state, LifecycleState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn expiry_runs_the_stop_sequence() {
    let mut h = harness();
    h.orchestrator.start(&steve(), HALF_HOUR).await;

    h.expiries.recv().await.unwrap();
    let result = h.orchestrator.auto_shutdown().await;

    match result {
        AutoShutdown::Stopped(outcome) => assert!(outcome.is_completed(), "{}", outcome.message),
        other => panic!("expected stop, got {:?}", other),
    }
    assert_eq!(h.orchestrator.status().state, LifecycleState::Stopped);
    assert!(h.notifier.contains("auto-shutdown"));
}

#[tokio::test(start_paused = true)]
async fn stale_firing_after_extension_aborts() {
    let h = harness();
    h.orchestrator.start(&steve(), HALF_HOUR).await;
    h.daemon.set_status(underlamp_host_api::DaemonStatus::Running);
    h.orchestrator.extend(&steve(), HOUR).await;

    tokio::time::advance(Duration::from_secs(31 * 60)).await;
    let result = h.orchestrator.auto_shutdown().await;

    assert!(matches!(result, AutoShutdown::Aborted { .. }));
    assert_eq!(h.orchestrator.status().state, LifecycleState::Running);
    assert!(
        !h.daemon.calls().contains(&DaemonCall::Stop),
        "daemon must not be stopped"
    );
}

#[tokio::test(start_paused = true)]
async fn firing_while_stopped_is_ignored() {
    let h = harness();
    let result = h.orchestrator.auto_shutdown().await;
    assert!(matches!(result, AutoShutdown::Aborted { .. }));
    assert!(h.resource.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn start_refuses_stopping_or_unknown_resource() {
    for status in [ResourceStatus::Stopping, ResourceStatus::Unknown] {
        let h = harness();
        h.resource.set_status(status);

        let outcome = h.orchestrator.start(&steve(), HOUR).await;

        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert!(outcome.message.contains(status.as_str()), "{}", outcome.message);
        assert_eq!(h.orchestrator.status().state, LifecycleState::Stopped);
        assert!(h.resource.commands().is_empty());
        assert!(h.daemon.calls().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn daemon_that_never_boots_times_out() {
    let h = harness();
    *h.daemon.stuck.lock().unwrap() = true;

    let outcome = h.orchestrator.start(&steve(), HOUR).await;

    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert!(outcome.message.contains("daemon boot timed out"), "{}", outcome.message);
    assert_eq!(h.orchestrator.status().state, LifecycleState::Stopped);
    assert!(!h.orchestrator.lifecycle().timer_armed());
    assert!(h.notifier.contains("Start failed"));
}

#[tokio::test(start_paused = true)]
async fn missing_address_does_not_block_start() {
    let h = harness();
    *h.resource.fail_address.lock().unwrap() = true;

    let outcome = h.orchestrator.start(&steve(), HOUR).await;

    assert_eq!(outcome.kind, OutcomeKind::Completed, "{}", outcome.message);
    assert_eq!(h.orchestrator.status().state, LifecycleState::Running);
    assert!(!h.notifier.contains("203.0.113.10"));
}

#[tokio::test(start_paused = true)]
async fn daemon_kill_failure_rolls_back_to_running() {
    let h = harness();
    h.orchestrator.start(&steve(), HOUR).await;
    let expire = h.orchestrator.status().expire_time;
    *h.daemon.fail_kill.lock().unwrap() = true;

    let outcome = h.orchestrator.stop(&steve()).await;

    assert_eq!(outcome.kind, OutcomeKind::Failed, "{}", outcome.message);
    let status = h.orchestrator.status();
    assert_eq!(status.state, LifecycleState::Running);
    assert_eq!(status.expire_time, expire);
    assert!(h.orchestrator.lifecycle().timer_armed());
    assert!(h.daemon.calls().contains(&DaemonCall::Kill));
    assert_eq!(h.resource.commands(), vec![ResourceCall::Start]);
    assert!(h.notifier.contains("Daemon stop failed"));
    assert!(h.notifier.contains("Resource status"));
}

#[tokio::test(start_paused = true)]
async fn resource_stop_timeout_is_partial_and_commits_to_stopped() {
    let h = harness();
    h.orchestrator.start(&steve(), HOUR).await;
    *h.resource.stuck.lock().unwrap() = true;

    let outcome = h.orchestrator.stop(&steve()).await;

    assert_eq!(outcome.kind, OutcomeKind::PartialFailure);
    assert!(outcome.message.contains("timed out"), "{}", outcome.message);
    assert_eq!(h.orchestrator.status().state, LifecycleState::Stopped);
    assert!(!h.orchestrator.lifecycle().timer_armed());
    assert!(h.notifier.contains("Resource stop failed"));
}

#[tokio::test(start_paused = true)]
async fn extend_fails_cleanly_when_status_query_fails() {
    let h = harness();
    h.orchestrator.start(&steve(), HALF_HOUR).await;
    let before = h.orchestrator.status().expire_time;
    *h.resource.fail_describe.lock().unwrap() = true;

    let outcome = h.orchestrator.extend(&steve(), HALF_HOUR).await;

    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert!(outcome.message.contains("resource status"), "{}", outcome.message);
    assert_eq!(h.orchestrator.status().expire_time, before);
    assert_eq!(h.orchestrator.status().state, LifecycleState::Running);
    assert!(h.orchestrator.lifecycle().timer_armed());
}
