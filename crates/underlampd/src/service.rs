//! Request admission and operation dispatch

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use underlamp_api::{
    Actor, ClientInfo, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus,
    OperationKind, Response, ResponsePayload,
};
use underlamp_config::{Schedule, ServiceConfig};
use underlamp_core::{
    AutoShutdown, Clock, CodeBook, ExpiryFired, Lifecycle, Orchestrator, VerificationError,
    Verifier,
};
use underlamp_host_api::{DaemonController, Notifier, ResourceController};
use underlamp_ipc::{IpcServer, ServerMessage};
use underlamp_store::{AuditEvent, AuditEventType, Store};
use underlamp_util::{ClientId, OperationId, RateLimiter};

/// Requests per second allowed per connected client
const CLIENT_REQUESTS_PER_SECOND: u32 = 30;

/// The external systems the service drives
pub struct Collaborators {
    pub resource: Arc<dyn ResourceController>,
    pub daemon: Arc<dyn DaemonController>,
    pub notifier: Arc<dyn Notifier>,
}

/// Everything behind the socket: admission, dispatch, audit
pub struct Service {
    orchestrator: Arc<Orchestrator>,
    codes: CodeBook,
    schedule: Schedule,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    rate_limiter: Mutex<RateLimiter<ClientId>>,
}

fn denied(request_id: u64, code: ErrorCode, message: impl Into<String>) -> Response {
    Response::error(request_id, ErrorInfo::new(code, message))
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Start { .. } => "start",
        Command::Extend { .. } => "extend",
        Command::Stop { .. } => "stop",
        Command::GetStatus { .. } => "get_status",
        Command::IssueCode { .. } => "issue_code",
        Command::AddOperator { .. } => "add_operator",
        Command::SubscribeEvents => "subscribe_events",
        Command::UnsubscribeEvents => "unsubscribe_events",
        Command::GetHealth => "get_health",
        Command::Ping => "ping",
    }
}

impl Service {
    /// Build the service; the receiver yields expiry firings for [`Service::handle_expiry`]
    pub fn new(
        config: &ServiceConfig,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        store: Arc<dyn Store>,
        ipc: Arc<IpcServer>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ExpiryFired>) {
        let (lifecycle, expiries) = Lifecycle::new(clock.clone());
        let orchestrator = Orchestrator::new(
            Arc::new(lifecycle),
            collaborators.resource,
            collaborators.daemon,
            collaborators.notifier,
            clock.clone(),
            config.timings,
        )
        .with_instance_name(config.service.instance_name.clone());

        let service = Self {
            orchestrator: Arc::new(orchestrator),
            codes: CodeBook::new(&config.access, clock),
            schedule: config.schedule.clone(),
            ipc,
            store,
            rate_limiter: Mutex::new(RateLimiter::new(
                CLIENT_REQUESTS_PER_SECOND,
                Duration::from_secs(1),
            )),
        };
        (Arc::new(service), expiries)
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn codes(&self) -> &CodeBook {
        &self.codes
    }

    /// Append to the audit log; failures never block the caller
    pub fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to write audit event");
        }
    }

    fn broadcast(&self, payload: EventPayload) {
        self.ipc.broadcast_event(Event::new(payload));
    }

    /// Route one message from the IPC layer
    pub async fn handle_message(self: &Arc<Self>, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let Some(client) = self.ipc.get_client_info(&client_id).await else {
                    debug!(client_id = %client_id, "Request from a client that already left");
                    return;
                };
                let response = self
                    .handle_request(&client, request.request_id, request.command)
                    .await;
                if let Err(e) = self.ipc.send_response(&client_id, response).await {
                    debug!(client_id = %client_id, error = %e, "Could not deliver response");
                }
            }
            ServerMessage::ClientConnected { client_id, info } => {
                info!(client_id = %client_id, role = ?info.role, uid = ?info.uid, "Client connected");
            }
            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
                self.rate_limiter.lock().await.remove(&client_id);
            }
        }
    }

    /// Admit or refuse one request
    pub async fn handle_request(
        self: &Arc<Self>,
        client: &ClientInfo,
        request_id: u64,
        command: Command,
    ) -> Response {
        if !self.rate_limiter.lock().await.check(&client.client_id) {
            return denied(request_id, ErrorCode::RateLimited, "Too many requests");
        }

        let name = command_name(&command);
        match command {
            Command::Start {
                operator,
                code,
                minutes,
            } => {
                if let Err(response) = self.verify(request_id, name, &operator, &code) {
                    return response;
                }
                if !self.schedule.allows_start(minutes) {
                    return self.refuse_duration(request_id, name, &operator, minutes, &self.schedule.start_minutes);
                }
                let actor = Actor::operator(self.codes.display_name(&operator));
                self.dispatch(request_id, OperationKind::Start, actor, Some(minutes))
            }

            Command::Extend {
                operator,
                code,
                minutes,
            } => {
                if let Err(response) = self.verify(request_id, name, &operator, &code) {
                    return response;
                }
                if !self.schedule.allows_extend(minutes) {
                    return self.refuse_duration(request_id, name, &operator, minutes, &self.schedule.extend_minutes);
                }
                let actor = Actor::operator(self.codes.display_name(&operator));
                self.dispatch(request_id, OperationKind::Extend, actor, Some(minutes))
            }

            Command::Stop { operator, code } => {
                if let Err(response) = self.verify(request_id, name, &operator, &code) {
                    return response;
                }
                let actor = Actor::operator(self.codes.display_name(&operator));
                self.dispatch(request_id, OperationKind::Stop, actor, None)
            }

            Command::GetStatus { operator, code } => {
                if let Err(response) = self.verify(request_id, name, &operator, &code) {
                    return response;
                }
                Response::success(
                    request_id,
                    ResponsePayload::Status(self.orchestrator.status()),
                )
            }

            Command::IssueCode { operator } => self.issue_code(client, request_id, operator),

            Command::AddOperator {
                operator,
                code,
                target,
                display_name,
            } => {
                if let Err(response) = self.verify(request_id, name, &operator, &code) {
                    return response;
                }
                if !self.codes.is_admin(&operator) {
                    self.audit(AuditEventType::RequestDenied {
                        operator: Some(operator),
                        command: name.into(),
                        reason: "not an admin".into(),
                    });
                    return denied(
                        request_id,
                        ErrorCode::NotAuthorized,
                        "Only admins can add operators",
                    );
                }
                let target = target.trim().to_string();
                if target.is_empty() {
                    return denied(request_id, ErrorCode::InvalidRequest, "Target operator is empty");
                }
                let display_name = match display_name.trim() {
                    "" => target.clone(),
                    name => name.to_string(),
                };

                let added = self.codes.add_operator(&target, &display_name);
                if added {
                    self.audit(AuditEventType::OperatorAdded {
                        by: operator,
                        target: target.clone(),
                    });
                }
                Response::success(request_id, ResponsePayload::OperatorAdded { target, added })
            }

            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client.client_id.clone(),
                },
            ),

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::GetHealth => {
                let store_ok = self.store.is_healthy();
                Response::success(
                    request_id,
                    ResponsePayload::Health(HealthStatus {
                        live: true,
                        ready: store_ok,
                        store_ok,
                        state: self.orchestrator.lifecycle().state(),
                    }),
                )
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }

    fn verify(
        &self,
        request_id: u64,
        command: &str,
        operator: &str,
        code: &str,
    ) -> Result<(), Response> {
        let reason = if !self.codes.is_operator(operator) {
            "not on the access list"
        } else if !self.codes.check_code(operator, code.trim()) {
            "wrong or expired verification code"
        } else {
            return Ok(());
        };

        info!(operator, command, reason, "Request denied");
        self.audit(AuditEventType::RequestDenied {
            operator: Some(operator.to_string()),
            command: command.to_string(),
            reason: reason.to_string(),
        });
        // One message for both cases so the access list cannot be probed
        Err(denied(
            request_id,
            ErrorCode::VerificationFailed,
            "Verification failed",
        ))
    }

    fn refuse_duration(
        &self,
        request_id: u64,
        command: &str,
        operator: &str,
        minutes: u32,
        allowed: &[u32],
    ) -> Response {
        self.audit(AuditEventType::RequestDenied {
            operator: Some(operator.to_string()),
            command: command.to_string(),
            reason: format!("{} minutes not allowed", minutes),
        });
        let allowed = allowed
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        denied(
            request_id,
            ErrorCode::InvalidDuration,
            format!("{} minutes is not allowed (choose from {})", minutes, allowed),
        )
    }

    fn issue_code(&self, client: &ClientInfo, request_id: u64, operator: String) -> Response {
        if !client.role.can_issue_codes() {
            self.audit(AuditEventType::RequestDenied {
                operator: Some(operator),
                command: "issue_code".into(),
                reason: "client is not an admin".into(),
            });
            return denied(
                request_id,
                ErrorCode::PermissionDenied,
                "Issuing codes requires the service user",
            );
        }

        match self.codes.issue(&operator) {
            Ok(issued) => {
                self.audit(AuditEventType::CodeIssued {
                    operator: operator.clone(),
                });
                Response::success(
                    request_id,
                    ResponsePayload::CodeIssued {
                        operator,
                        code: issued.code,
                        expires_at: issued.expires_at,
                    },
                )
            }
            Err(e @ VerificationError::NotAnOperator(_)) => {
                denied(request_id, ErrorCode::NotAuthorized, e.to_string())
            }
            Err(e @ VerificationError::RateLimited(_)) => {
                denied(request_id, ErrorCode::RateLimited, e.to_string())
            }
        }
    }

    /// Answer `accepted` now and run the sequence in the background
    fn dispatch(
        self: &Arc<Self>,
        request_id: u64,
        kind: OperationKind,
        actor: Actor,
        minutes: Option<u32>,
    ) -> Response {
        let operation_id = OperationId::new();
        info!(operation_id = %operation_id, kind = ?kind, actor = %actor, minutes = ?minutes, "Operation accepted");

        self.audit(AuditEventType::OperationRequested {
            operation_id: operation_id.clone(),
            kind,
            actor: actor.clone(),
            minutes,
        });
        self.broadcast(EventPayload::OperationStarted {
            operation_id: operation_id.clone(),
            kind,
            actor: actor.clone(),
        });

        let service = self.clone();
        let id = operation_id.clone();
        tokio::spawn(async move {
            let outcome = service
                .orchestrator
                .run(kind, &actor, minutes.unwrap_or(0))
                .await;
            service.finish(id, kind, actor, outcome);
        });

        let message = match kind {
            OperationKind::Start => "Start accepted, the server is booting",
            OperationKind::Extend => "Extension accepted",
            OperationKind::Stop => "Stop accepted, the server is shutting down",
        };
        Response::success(
            request_id,
            ResponsePayload::Accepted {
                operation_id,
                message: message.into(),
            },
        )
    }

    fn finish(
        &self,
        operation_id: OperationId,
        kind: OperationKind,
        actor: Actor,
        outcome: underlamp_core::Outcome,
    ) {
        info!(
            operation_id = %operation_id,
            kind = ?kind,
            outcome = ?outcome.kind,
            message = %outcome.message,
            "Operation finished"
        );

        self.audit(AuditEventType::OperationFinished {
            operation_id: operation_id.clone(),
            kind,
            actor: actor.clone(),
            outcome: outcome.kind,
            message: outcome.message.clone(),
        });
        self.broadcast(EventPayload::OperationFinished {
            operation_id,
            kind,
            actor,
            outcome: outcome.kind,
            message: outcome.message,
        });
        self.broadcast(EventPayload::StateChanged(self.orchestrator.status()));
    }

    /// Re-validate an expiry firing and stop if it still stands
    pub async fn handle_expiry(self: &Arc<Self>, fired: ExpiryFired) {
        debug!(generation = fired.generation, "Expiry timer fired");

        match self.orchestrator.auto_shutdown().await {
            AutoShutdown::Aborted { reason } => {
                self.audit(AuditEventType::AutoShutdownAborted {
                    reason: reason.clone(),
                });
                self.broadcast(EventPayload::AutoShutdownAborted { reason });
            }
            AutoShutdown::Stopped(outcome) => {
                self.audit(AuditEventType::AutoShutdownTriggered);
                self.finish(
                    OperationId::new(),
                    OperationKind::Stop,
                    Actor::AutoShutdown,
                    outcome,
                );
            }
        }
    }

    /// Periodic housekeeping
    pub fn tick(&self) {
        self.codes.purge_expired();
    }

    /// Tell subscribers the service is going away
    pub fn announce_shutdown(&self) {
        self.broadcast(EventPayload::Shutdown);
    }
}
