//! Integration tests for underlampd
//!
//! These drive the service through its request handler with scriptable
//! collaborators, and once over a real socket.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use underlamp_api::{
    Actor, ClientInfo, ClientRole, Command, ErrorCode, Event, EventPayload, LifecycleState,
    OperationKind, OutcomeKind, Response, ResponsePayload, ResponseResult,
};
use underlamp_config::{ServiceConfig, Timings, parse_config};
use underlamp_core::{ExpiryFired, MonotonicClock};
use underlamp_host_api::{MockDaemon, MockResource, RecordingNotifier, ResourceStatus};
use underlamp_ipc::{IpcClient, IpcServer};
use underlamp_store::{AuditEventType, SqliteStore, Store};
use underlampd::{Collaborators, Service};

const CONFIG: &str = r#"
    config_version = 1

    [service]
    instance_name = "Pixelmon"

    [access]
    admins = ["steve@example.com"]

    [[access.operators]]
    id = "steve@example.com"
    name = "Steve"

    [[access.operators]]
    id = "alex@example.com"
    name = "Alex"

    [resource]
    region_id = "cn-shanghai"
    instance_id = "i-uf6abc"

    [daemon]
    base_url = "http://panel.example.com:23333"
    api_key = "key"
    daemon_id = "daemon"
    instance_uuid = "uuid"
"#;

struct Fixture {
    service: Arc<Service>,
    resource: Arc<MockResource>,
    notifier: Arc<RecordingNotifier>,
    store: Arc<SqliteStore>,
    events: broadcast::Receiver<Event>,
    expiries: mpsc::UnboundedReceiver<ExpiryFired>,
    _dir: tempfile::TempDir,
}

fn fixture_with(config: ServiceConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let ipc = Arc::new(IpcServer::new(dir.path().join("underlampd.sock")));
    let events = ipc.subscribe_events();

    let resource = Arc::new(MockResource::stopped());
    let notifier = Arc::new(RecordingNotifier::new());
    let store = Arc::new(SqliteStore::in_memory().unwrap());

    let (service, expiries) = Service::new(
        &config,
        Collaborators {
            resource: resource.clone(),
            daemon: Arc::new(MockDaemon::stopped()),
            notifier: notifier.clone(),
        },
        Arc::new(MonotonicClock::new()),
        store.clone(),
        ipc,
    );

    Fixture {
        service,
        resource,
        notifier,
        store,
        events,
        expiries,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(parse_config(CONFIG).unwrap())
}

fn admin() -> ClientInfo {
    ClientInfo::new(ClientRole::Admin)
}

fn operator() -> ClientInfo {
    ClientInfo::new(ClientRole::Operator)
}

fn payload(response: Response) -> ResponsePayload {
    match response.result {
        ResponseResult::Ok(payload) => payload,
        ResponseResult::Err(e) => panic!("unexpected error: {:?} {}", e.code, e.message),
    }
}

fn error_code(response: Response) -> ErrorCode {
    match response.result {
        ResponseResult::Err(e) => e.code,
        ResponseResult::Ok(p) => panic!("expected an error, got {:?}", p),
    }
}

async fn issue(f: &Fixture, who: &str) -> String {
    let response = f
        .service
        .handle_request(&admin(), 1, Command::IssueCode { operator: who.into() })
        .await;
    match payload(response) {
        ResponsePayload::CodeIssued { code, .. } => code,
        other => panic!("expected a code, got {:?}", other),
    }
}

/// Wait for the next operation to finish, returning (kind, actor, outcome)
async fn next_finished(
    events: &mut broadcast::Receiver<Event>,
) -> (OperationKind, Actor, OutcomeKind, String) {
    loop {
        let event = events.recv().await.unwrap();
        if let EventPayload::OperationFinished {
            kind,
            actor,
            outcome,
            message,
            ..
        } = event.payload
        {
            return (kind, actor, outcome, message);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn only_admin_clients_issue_codes() {
    let f = fixture();

    let response = f
        .service
        .handle_request(
            &operator(),
            1,
            Command::IssueCode {
                operator: "steve@example.com".into(),
            },
        )
        .await;
    assert_eq!(error_code(response), ErrorCode::PermissionDenied);

    let response = f
        .service
        .handle_request(
            &admin(),
            2,
            Command::IssueCode {
                operator: "mallory@example.com".into(),
            },
        )
        .await;
    assert_eq!(error_code(response), ErrorCode::NotAuthorized);

    let code = issue(&f, "steve@example.com").await;
    assert_eq!(code.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn start_runs_in_background_and_reports() {
    let mut f = fixture();
    let code = issue(&f, "steve@example.com").await;

    let response = f
        .service
        .handle_request(
            &operator(),
            2,
            Command::Start {
                operator: "steve@example.com".into(),
                code,
                minutes: 60,
            },
        )
        .await;
    assert!(matches!(payload(response), ResponsePayload::Accepted { .. }));

    let (kind, actor, outcome, message) = next_finished(&mut f.events).await;
    assert_eq!(kind, OperationKind::Start);
    assert_eq!(actor, Actor::operator("Steve"));
    assert_eq!(outcome, OutcomeKind::Completed, "{}", message);
    assert_eq!(f.resource.status(), ResourceStatus::Running);

    let status = f.service.orchestrator().status();
    assert_eq!(status.state, LifecycleState::Running);
    assert_eq!(status.remaining_minutes, Some(60));
    assert!(f.notifier.contains("Pixelmon"));

    let audits = f.store.get_recent_audits(10).unwrap();
    assert!(audits.iter().any(|a| matches!(
        a.event,
        AuditEventType::OperationRequested {
            kind: OperationKind::Start,
            minutes: Some(60),
            ..
        }
    )));
    assert!(audits.iter().any(|a| matches!(
        a.event,
        AuditEventType::OperationFinished {
            outcome: OutcomeKind::Completed,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn bad_codes_and_strangers_get_the_same_refusal() {
    let f = fixture();
    issue(&f, "steve@example.com").await;

    let wrong = f
        .service
        .handle_request(
            &operator(),
            2,
            Command::Stop {
                operator: "steve@example.com".into(),
                code: "000000".into(),
            },
        )
        .await;
    let stranger = f
        .service
        .handle_request(
            &operator(),
            3,
            Command::Stop {
                operator: "mallory@example.com".into(),
                code: "000000".into(),
            },
        )
        .await;

    assert_eq!(error_code(wrong), ErrorCode::VerificationFailed);
    assert_eq!(error_code(stranger), ErrorCode::VerificationFailed);
    assert!(f.resource.calls().is_empty());

    let denials = f
        .store
        .get_recent_audits(10)
        .unwrap()
        .into_iter()
        .filter(|a| matches!(a.event, AuditEventType::RequestDenied { .. }))
        .count();
    assert_eq!(denials, 2);
}

#[tokio::test(start_paused = true)]
async fn expired_code_is_refused() {
    let f = fixture();
    let code = issue(&f, "steve@example.com").await;

    tokio::time::advance(Duration::from_secs(301)).await;

    let response = f
        .service
        .handle_request(
            &operator(),
            2,
            Command::GetStatus {
                operator: "steve@example.com".into(),
                code,
            },
        )
        .await;
    assert_eq!(error_code(response), ErrorCode::VerificationFailed);
}

#[tokio::test(start_paused = true)]
async fn run_lengths_are_checked() {
    let f = fixture();
    let code = issue(&f, "steve@example.com").await;

    let response = f
        .service
        .handle_request(
            &operator(),
            2,
            Command::Start {
                operator: "steve@example.com".into(),
                code: code.clone(),
                minutes: 45,
            },
        )
        .await;
    assert_eq!(error_code(response), ErrorCode::InvalidDuration);

    let response = f
        .service
        .handle_request(
            &operator(),
            3,
            Command::Extend {
                operator: "steve@example.com".into(),
                code,
                minutes: 120,
            },
        )
        .await;
    assert_eq!(error_code(response), ErrorCode::InvalidDuration);
    assert!(f.resource.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn status_needs_a_code_and_reports_stopped() {
    let f = fixture();
    let code = issue(&f, "alex@example.com").await;

    let response = f
        .service
        .handle_request(
            &operator(),
            2,
            Command::GetStatus {
                operator: "alex@example.com".into(),
                code,
            },
        )
        .await;
    match payload(response) {
        ResponsePayload::Status(status) => {
            assert_eq!(status.state, LifecycleState::Stopped);
            assert_eq!(status.expire_time, None);
        }
        other => panic!("expected status, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn admins_can_add_operators() {
    let f = fixture();

    let alex_code = issue(&f, "alex@example.com").await;
    let response = f
        .service
        .handle_request(
            &operator(),
            2,
            Command::AddOperator {
                operator: "alex@example.com".into(),
                code: alex_code,
                target: "creeper@example.com".into(),
                display_name: "Creeper".into(),
            },
        )
        .await;
    assert_eq!(error_code(response), ErrorCode::NotAuthorized);

    let steve_code = issue(&f, "steve@example.com").await;
    let response = f
        .service
        .handle_request(
            &operator(),
            3,
            Command::AddOperator {
                operator: "steve@example.com".into(),
                code: steve_code.clone(),
                target: "creeper@example.com".into(),
                display_name: "Creeper".into(),
            },
        )
        .await;
    assert!(matches!(
        payload(response),
        ResponsePayload::OperatorAdded { added: true, .. }
    ));

    let response = f
        .service
        .handle_request(
            &operator(),
            4,
            Command::AddOperator {
                operator: "steve@example.com".into(),
                code: steve_code,
                target: "creeper@example.com".into(),
                display_name: "Creeper".into(),
            },
        )
        .await;
    assert!(matches!(
        payload(response),
        ResponsePayload::OperatorAdded { added: false, .. }
    ));

    assert_eq!(issue(&f, "creeper@example.com").await.len(), 6);
    assert_eq!(f.service.codes().display_name("creeper@example.com"), "Creeper");
}

#[tokio::test(start_paused = true)]
async fn expiry_stops_the_server() {
    let mut f = fixture();
    let code = issue(&f, "steve@example.com").await;

    f.service
        .handle_request(
            &operator(),
            2,
            Command::Start {
                operator: "steve@example.com".into(),
                code,
                minutes: 30,
            },
        )
        .await;
    let (_, _, outcome, _) = next_finished(&mut f.events).await;
    assert_eq!(outcome, OutcomeKind::Completed);

    let fired = f.expiries.recv().await.unwrap();
    f.service.handle_expiry(fired).await;

    let (kind, actor, outcome, message) = next_finished(&mut f.events).await;
    assert_eq!(kind, OperationKind::Stop);
    assert_eq!(actor, Actor::AutoShutdown);
    assert_eq!(outcome, OutcomeKind::Completed, "{}", message);
    assert_eq!(
        f.service.orchestrator().lifecycle().state(),
        LifecycleState::Stopped
    );
    assert_eq!(f.resource.status(), ResourceStatus::Stopped);

    let audits = f.store.get_recent_audits(20).unwrap();
    assert!(
        audits
            .iter()
            .any(|a| matches!(a.event, AuditEventType::AutoShutdownTriggered))
    );
}

#[tokio::test(start_paused = true)]
async fn health_reports_store_and_state() {
    let f = fixture();
    let response = f
        .service
        .handle_request(&operator(), 1, Command::GetHealth)
        .await;
    match payload(response) {
        ResponsePayload::Health(health) => {
            assert!(health.live);
            assert!(health.store_ok);
            assert_eq!(health.state, LifecycleState::Stopped);
        }
        other => panic!("expected health, got {:?}", other),
    }
}

#[tokio::test]
async fn requests_over_the_socket() {
    let mut config = parse_config(CONFIG).unwrap();
    config.timings = Timings {
        poll_interval: Duration::from_millis(10),
        resource_boot_timeout: Duration::from_secs(2),
        resource_stop_timeout: Duration::from_secs(2),
        daemon_boot_timeout: Duration::from_secs(2),
        settle_delay: Duration::ZERO,
        daemon_stop_grace: Duration::ZERO,
        pre_resource_stop_delay: Duration::ZERO,
    };

    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("underlampd.sock");
    let mut ipc = IpcServer::new(&socket_path);
    ipc.start().await.unwrap();
    let ipc = Arc::new(ipc);

    let (service, _expiries) = Service::new(
        &config,
        Collaborators {
            resource: Arc::new(MockResource::stopped()),
            daemon: Arc::new(MockDaemon::stopped()),
            notifier: Arc::new(RecordingNotifier::new()),
        },
        Arc::new(MonotonicClock::new()),
        Arc::new(SqliteStore::in_memory().unwrap()),
        ipc.clone(),
    );

    let mut messages = ipc.take_message_receiver().await.unwrap();
    let accept = ipc.clone();
    tokio::spawn(async move { accept.run().await });
    let dispatcher = service.clone();
    tokio::spawn(async move {
        while let Some(msg) = messages.recv().await {
            dispatcher.handle_message(msg).await;
        }
    });

    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    assert!(matches!(
        client.request(Command::Ping).await.unwrap(),
        ResponsePayload::Pong
    ));

    // The test process shares the service's UID, so it is an admin
    let code = match client
        .request(Command::IssueCode {
            operator: "steve@example.com".into(),
        })
        .await
        .unwrap()
    {
        ResponsePayload::CodeIssued { code, .. } => code,
        other => panic!("expected a code, got {:?}", other),
    };

    let mut events = IpcClient::connect(&socket_path)
        .await
        .unwrap()
        .subscribe()
        .await
        .unwrap();

    let accepted = client
        .request(Command::Start {
            operator: "steve@example.com".into(),
            code: code.clone(),
            minutes: 30,
        })
        .await
        .unwrap();
    assert!(matches!(accepted, ResponsePayload::Accepted { .. }));

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.next().await.unwrap();
            if let EventPayload::OperationFinished { outcome, .. } = event.payload {
                return outcome;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(finished, OutcomeKind::Completed);

    let rejected = client
        .request(Command::Stop {
            operator: "steve@example.com".into(),
            code: "999999x".into(),
        })
        .await;
    assert!(matches!(
        rejected,
        Err(underlamp_ipc::IpcError::Rejected(ref info)) if info.code == ErrorCode::VerificationFailed
    ));

    match client
        .request(Command::GetStatus {
            operator: "steve@example.com".into(),
            code,
        })
        .await
        .unwrap()
    {
        ResponsePayload::Status(status) => assert_eq!(status.state, LifecycleState::Running),
        other => panic!("expected status, got {:?}", other),
    }
}
