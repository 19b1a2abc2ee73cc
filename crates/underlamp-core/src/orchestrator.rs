//! Orchestration sequences
//!
//! Each user-facing intent brackets its collaborator calls between a
//! lifecycle pre-check and a success/failure report, and always ends in an
//! [`Outcome`]. Nothing here holds the lifecycle lock across an `.await`.

use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use underlamp_api::{Actor, OperationKind, OutcomeKind, StatusSnapshot};
use underlamp_config::Timings;
use underlamp_host_api::{
    DaemonController, DaemonStatus, Notifier, ResourceController, ResourceStatus,
    ResourceStopMode,
};
use underlamp_util::format_clock_time;

use crate::{
    AutoShutdownDecision, Clock, Lifecycle, OrchestrationError, OrchestrationResult, notice,
    poll_until,
};

/// Final result of an orchestration sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub message: String,
}

impl Outcome {
    pub fn completed(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Completed, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Rejected, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Failed, message)
    }

    pub fn partial_failure(message: impl Into<String>) -> Self {
        Self::new(OutcomeKind::PartialFailure, message)
    }

    fn new(kind: OutcomeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.kind == OutcomeKind::Completed
    }
}

/// What an expiry firing led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoShutdown {
    /// Re-validation failed; nothing was done
    Aborted { reason: String },
    /// The stop sequence ran
    Stopped(Outcome),
}

/// New expiry after extending by `extra`: never earlier than `now + extra`
pub fn extended_expiry(
    current: Option<DateTime<Local>>,
    now: DateTime<Local>,
    extra: chrono::Duration,
) -> DateTime<Local> {
    let from_now = now + extra;
    match current {
        Some(current) => (current + extra).max(from_now),
        None => from_now,
    }
}

fn to_chrono(d: Duration) -> OrchestrationResult<chrono::Duration> {
    chrono::Duration::from_std(d).map_err(|e| OrchestrationError::InvalidDuration(e.to_string()))
}

/// Drives the resource and daemon through start, extend and stop
pub struct Orchestrator {
    lifecycle: Arc<Lifecycle>,
    resource: Arc<dyn ResourceController>,
    daemon: Arc<dyn DaemonController>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    timings: Timings,
    instance_name: String,
}

impl Orchestrator {
    pub fn new(
        lifecycle: Arc<Lifecycle>,
        resource: Arc<dyn ResourceController>,
        daemon: Arc<dyn DaemonController>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        timings: Timings,
    ) -> Self {
        Self {
            lifecycle,
            resource,
            daemon,
            notifier,
            clock,
            timings,
            instance_name: "game server".into(),
        }
    }

    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn status(&self) -> StatusSnapshot {
        self.lifecycle.status()
    }

    /// Run the sequence for `kind`. `minutes` is ignored for stop.
    pub async fn run(&self, kind: OperationKind, actor: &Actor, minutes: u32) -> Outcome {
        let duration = Duration::from_secs(u64::from(minutes) * 60);
        match kind {
            OperationKind::Start => self.start(actor, duration).await,
            OperationKind::Extend => self.extend(actor, duration).await,
            OperationKind::Stop => self.stop(actor).await,
        }
    }

    async fn notify(&self, message: String) {
        if !self.notifier.publish(&message).await {
            warn!("Notification was not delivered");
        }
    }

    // --- start ---

    /// Boot the resource (if needed) and the daemon, then run for `duration`
    pub async fn start(&self, actor: &Actor, duration: Duration) -> Outcome {
        if let Err(rejection) = self.lifecycle.try_start() {
            info!(actor = %actor, state = %rejection.state, "Start rejected");
            return Outcome::rejected(rejection.to_string());
        }

        info!(actor = %actor, minutes = duration.as_secs() / 60, "Start sequence begins");

        match self.run_start(actor, duration).await {
            Ok((start, expire)) => {
                self.lifecycle.on_start_success(start, expire);
                self.notify(notice::start_confirmed(actor, &start, &expire))
                    .await;
                info!(actor = %actor, expire = %format_clock_time(&expire), "Start sequence completed");
                Outcome::completed(format!(
                    "Server started, running until {}",
                    format_clock_time(&expire)
                ))
            }
            Err(e) => {
                error!(actor = %actor, error = %e, "Start sequence failed");
                self.notify(notice::failure("Start failed", actor, &e)).await;
                self.lifecycle.on_start_failed();
                Outcome::failed(format!("Start failed: {}", e))
            }
        }
    }

    async fn run_start(
        &self,
        actor: &Actor,
        duration: Duration,
    ) -> OrchestrationResult<(DateTime<Local>, DateTime<Local>)> {
        let run = to_chrono(duration)?;
        let resource = &self.resource;
        let daemon = &self.daemon;

        let status = resource.describe_status().await?;
        match status {
            ResourceStatus::Running => {
                info!("Resource already running");
            }
            ResourceStatus::Stopped => {
                resource.start().await?;
                info!("Resource start submitted");
                self.wait_for_resource(ResourceStatus::Running, "resource boot", self.timings.resource_boot_timeout)
                    .await?;
            }
            ResourceStatus::Starting | ResourceStatus::Pending => {
                info!(status = %status, "Resource already booting");
                self.wait_for_resource(ResourceStatus::Running, "resource boot", self.timings.resource_boot_timeout)
                    .await?;
            }
            ResourceStatus::Stopping | ResourceStatus::Unknown => {
                return Err(OrchestrationError::UnexpectedStatus {
                    what: "resource",
                    status: status.to_string(),
                });
            }
        }

        let address = match resource.public_address().await {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "Could not resolve public address");
                None
            }
        };

        let requested = self.clock.now();
        self.notify(notice::start_requested(
            &self.instance_name,
            actor,
            &requested,
            &(requested + run),
        ))
        .await;

        tokio::time::sleep(self.timings.settle_delay).await;

        daemon.start().await?;
        info!("Daemon start submitted");
        poll_until(
            "daemon boot",
            self.timings.poll_interval,
            self.timings.daemon_boot_timeout,
            move || daemon.describe_status(),
            |s| *s == DaemonStatus::Running,
        )
        .await?;

        let start = self.clock.now();
        let expire = start + run;
        self.notify(notice::server_ready(
            &self.instance_name,
            &start,
            &expire,
            address.as_deref(),
        ))
        .await;

        Ok((start, expire))
    }

    async fn wait_for_resource(
        &self,
        target: ResourceStatus,
        what: &'static str,
        timeout: Duration,
    ) -> OrchestrationResult<ResourceStatus> {
        let resource = &self.resource;
        poll_until(
            what,
            self.timings.poll_interval,
            timeout,
            move || resource.describe_status(),
            |s| *s == target,
        )
        .await
    }

    // --- extend ---

    /// Push the expiry back by `extra`
    pub async fn extend(&self, actor: &Actor, extra: Duration) -> Outcome {
        let resource_status = match self.resource.describe_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Extend: resource status query failed");
                return Outcome::failed(format!("Could not query resource status: {}", e));
            }
        };
        if resource_status != ResourceStatus::Running {
            return Outcome::rejected(format!(
                "Resource is {}, cannot extend the run",
                resource_status
            ));
        }

        let daemon_status = match self.daemon.describe_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Extend: daemon status query failed");
                return Outcome::failed(format!("Could not query daemon status: {}", e));
            }
        };
        if daemon_status != DaemonStatus::Running {
            return Outcome::rejected(format!(
                "Daemon is {}, cannot extend the run",
                daemon_status
            ));
        }

        if let Err(rejection) = self.lifecycle.try_extend() {
            info!(actor = %actor, state = %rejection.state, "Extend rejected");
            return Outcome::rejected(rejection.to_string());
        }

        let now = self.clock.now();
        let new_expire = to_chrono(extra)
            .map(|extra| extended_expiry(self.lifecycle.expire_time(), now, extra));

        match new_expire {
            Ok(new_expire) => {
                self.lifecycle.on_extend_success(new_expire);
                let extra_minutes = (extra.as_secs() / 60) as i64;
                info!(actor = %actor, extra_minutes, expire = %format_clock_time(&new_expire), "Run extended");
                self.notify(notice::extended(actor, extra_minutes, &now, &new_expire))
                    .await;
                Outcome::completed(format!(
                    "Extended by {} minutes, new expiry {}",
                    extra_minutes,
                    format_clock_time(&new_expire)
                ))
            }
            Err(e) => {
                self.lifecycle.on_extend_failed();
                error!(actor = %actor, error = %e, "Extend failed");
                self.notify(notice::failure("Extend failed", actor, &e)).await;
                Outcome::failed(format!("Extend failed: {}", e))
            }
        }
    }

    // --- stop ---

    /// Stop the daemon, then the resource
    ///
    /// A daemon failure (stop or kill) rolls back to running with the resource
    /// untouched. A resource failure after the daemon is down still commits to
    /// stopped and is reported as a partial failure.
    pub async fn stop(&self, actor: &Actor) -> Outcome {
        if let Err(rejection) = self.lifecycle.try_stop() {
            info!(actor = %actor, state = %rejection.state, "Stop rejected");
            return Outcome::rejected(rejection.to_string());
        }

        info!(actor = %actor, "Stop sequence begins");

        if let Err(e) = self.stop_daemon().await {
            error!(actor = %actor, error = %e, "Daemon stop failed, rolling back");
            self.notify(notice::failure("Daemon stop failed", actor, &e))
                .await;
            self.lifecycle.on_stop_failed();
            self.report_resource_status(actor).await;
            return Outcome::failed(format!(
                "Daemon stop failed, server is still running: {}",
                e
            ));
        }

        tokio::time::sleep(self.timings.pre_resource_stop_delay).await;

        match self.stop_resource().await {
            Err(e) => {
                error!(actor = %actor, error = %e, "Resource stop failed after daemon stop");
                self.notify(notice::failure("Resource stop failed", actor, &e))
                    .await;
                self.lifecycle.on_stop_success();
                self.report_resource_status(actor).await;
                Outcome::partial_failure(format!(
                    "Daemon stopped but the resource did not stop: {}",
                    e
                ))
            }
            Ok(()) => {
                let now = self.clock.now();
                self.notify(notice::stopped(&self.instance_name, actor, &now))
                    .await;
                self.lifecycle.on_stop_success();
                self.report_resource_status(actor).await;
                info!(actor = %actor, "Stop sequence completed");
                Outcome::completed("Server stopped")
            }
        }
    }

    /// Graceful stop, grace period, then kill
    async fn stop_daemon(&self) -> OrchestrationResult<()> {
        self.daemon.stop().await?;
        info!("Daemon stop submitted");
        tokio::time::sleep(self.timings.daemon_stop_grace).await;
        self.daemon.kill().await?;
        Ok(())
    }

    async fn stop_resource(&self) -> OrchestrationResult<()> {
        self.resource
            .stop(false, ResourceStopMode::CostSaving)
            .await?;
        info!("Resource stop submitted");
        self.wait_for_resource(ResourceStatus::Stopped, "resource stop", self.timings.resource_stop_timeout)
            .await?;
        Ok(())
    }

    async fn report_resource_status(&self, actor: &Actor) {
        let message = match self.resource.describe_status().await {
            Ok(status) => notice::resource_status(actor, status),
            Err(e) => notice::failure("Resource status unavailable", actor, &e),
        };
        self.notify(message).await;
    }

    // --- auto-shutdown ---

    /// Handle an expiry firing
    pub async fn auto_shutdown(&self) -> AutoShutdown {
        match self.lifecycle.begin_auto_shutdown() {
            AutoShutdownDecision::Proceed => {
                info!("Expiry reached, stopping");
                AutoShutdown::Stopped(self.stop(&Actor::AutoShutdown).await)
            }
            AutoShutdownDecision::Extended { expire_time } => {
                info!(expire = %format_clock_time(&expire_time), "Expiry was extended, auto-shutdown cancelled");
                AutoShutdown::Aborted {
                    reason: format!("Run was extended until {}", format_clock_time(&expire_time)),
                }
            }
            AutoShutdownDecision::NotRunning { state } => {
                info!(state = %state, "Auto-shutdown skipped");
                AutoShutdown::Aborted {
                    reason: format!("Lifecycle is {}", state),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn extension_adds_to_current_expiry() {
        let now = Local.with_ymd_and_hms(2025, 6, 1, 20, 0, 0).unwrap();
        let current = now + chrono::Duration::minutes(20);

        let new = extended_expiry(Some(current), now, chrono::Duration::minutes(30));
        assert_eq!(new, now + chrono::Duration::minutes(50));
    }

    #[test]
    fn extension_never_ends_before_now_plus_extra() {
        let now = Local.with_ymd_and_hms(2025, 6, 1, 20, 0, 0).unwrap();
        let lapsed = now - chrono::Duration::minutes(10);

        let new = extended_expiry(Some(lapsed), now, chrono::Duration::minutes(30));
        assert_eq!(new, now + chrono::Duration::minutes(30));

        let new = extended_expiry(None, now, chrono::Duration::minutes(60));
        assert_eq!(new, now + chrono::Duration::minutes(60));
    }

    #[test]
    fn outcome_constructors() {
        assert!(Outcome::completed("ok").is_completed());
        assert_eq!(
            Outcome::partial_failure("half").kind,
            OutcomeKind::PartialFailure
        );
        assert!(!Outcome::rejected("busy").is_completed());
    }
}
