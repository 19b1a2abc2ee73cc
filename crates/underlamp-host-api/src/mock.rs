//! Scriptable collaborators for testing
//!
//! Each mock keeps a current status and a pending transition. Issuing
//! `start`/`stop` puts the mock into the in-between status; the transition
//! completes after `settle_polls` further status queries, unless `stuck` is
//! set, in which case it never completes.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::{
    DaemonController, DaemonStatus, HostError, HostResult, Notifier, ResourceController,
    ResourceStatus, ResourceStopMode,
};

/// A call observed by [`MockResource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCall {
    Start,
    Stop { force: bool, mode: ResourceStopMode },
    DescribeStatus,
    PublicAddress,
}

/// A call observed by [`MockDaemon`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonCall {
    Start,
    Stop,
    Kill,
    DescribeStatus,
}

struct Transition<S> {
    target: S,
    polls_left: u32,
}

struct Machine<S> {
    status: S,
    pending: Option<Transition<S>>,
}

impl<S: Copy> Machine<S> {
    fn new(status: S) -> Self {
        Self {
            status,
            pending: None,
        }
    }

    fn begin(&mut self, in_between: S, target: S, polls: u32) {
        self.status = in_between;
        self.pending = Some(Transition {
            target,
            polls_left: polls,
        });
    }

    fn observe(&mut self, stuck: bool) -> S {
        if stuck {
            return self.status;
        }
        if let Some(mut pending) = self.pending.take() {
            if pending.polls_left <= 1 {
                self.status = pending.target;
            } else {
                pending.polls_left -= 1;
                self.pending = Some(pending);
            }
        }
        self.status
    }
}

/// Mock cloud resource
pub struct MockResource {
    machine: Mutex<Machine<ResourceStatus>>,
    calls: Arc<Mutex<Vec<ResourceCall>>>,

    /// Status queries needed after start/stop before the target is reported
    pub settle_polls: Arc<Mutex<u32>>,

    /// Transitions never complete
    pub stuck: Arc<Mutex<bool>>,

    pub fail_start: Arc<Mutex<bool>>,
    pub fail_stop: Arc<Mutex<bool>>,
    pub fail_describe: Arc<Mutex<bool>>,
    pub fail_address: Arc<Mutex<bool>>,

    pub address: Arc<Mutex<Option<String>>>,
}

impl MockResource {
    pub fn new(status: ResourceStatus) -> Self {
        Self {
            machine: Mutex::new(Machine::new(status)),
            calls: Arc::new(Mutex::new(Vec::new())),
            settle_polls: Arc::new(Mutex::new(1)),
            stuck: Arc::new(Mutex::new(false)),
            fail_start: Arc::new(Mutex::new(false)),
            fail_stop: Arc::new(Mutex::new(false)),
            fail_describe: Arc::new(Mutex::new(false)),
            fail_address: Arc::new(Mutex::new(false)),
            address: Arc::new(Mutex::new(Some("203.0.113.10".into()))),
        }
    }

    pub fn stopped() -> Self {
        Self::new(ResourceStatus::Stopped)
    }

    pub fn running() -> Self {
        Self::new(ResourceStatus::Running)
    }

    /// Current status without recording a call or advancing a transition
    pub fn status(&self) -> ResourceStatus {
        self.machine.lock().unwrap().status
    }

    pub fn set_status(&self, status: ResourceStatus) {
        *self.machine.lock().unwrap() = Machine::new(status);
    }

    pub fn calls(&self) -> Vec<ResourceCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than status and address queries
    pub fn commands(&self) -> Vec<ResourceCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ResourceCall::Start | ResourceCall::Stop { .. }))
            .collect()
    }

    fn record(&self, call: ResourceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for MockResource {
    fn default() -> Self {
        Self::stopped()
    }
}

#[async_trait]
impl ResourceController for MockResource {
    async fn start(&self) -> HostResult<()> {
        self.record(ResourceCall::Start);
        if *self.fail_start.lock().unwrap() {
            return Err(HostError::Provider("Mock start failure".into()));
        }
        let polls = *self.settle_polls.lock().unwrap();
        self.machine.lock().unwrap().begin(
            ResourceStatus::Starting,
            ResourceStatus::Running,
            polls,
        );
        Ok(())
    }

    async fn stop(&self, force: bool, mode: ResourceStopMode) -> HostResult<()> {
        self.record(ResourceCall::Stop { force, mode });
        if *self.fail_stop.lock().unwrap() {
            return Err(HostError::Provider("Mock stop failure".into()));
        }
        let polls = *self.settle_polls.lock().unwrap();
        self.machine.lock().unwrap().begin(
            ResourceStatus::Stopping,
            ResourceStatus::Stopped,
            polls,
        );
        Ok(())
    }

    async fn describe_status(&self) -> HostResult<ResourceStatus> {
        self.record(ResourceCall::DescribeStatus);
        if *self.fail_describe.lock().unwrap() {
            return Err(HostError::Provider("Mock describe failure".into()));
        }
        let stuck = *self.stuck.lock().unwrap();
        Ok(self.machine.lock().unwrap().observe(stuck))
    }

    async fn public_address(&self) -> HostResult<Option<String>> {
        self.record(ResourceCall::PublicAddress);
        if *self.fail_address.lock().unwrap() {
            return Err(HostError::Provider("Mock address failure".into()));
        }
        Ok(self.address.lock().unwrap().clone())
    }
}

/// Mock game-server daemon
pub struct MockDaemon {
    machine: Mutex<Machine<DaemonStatus>>,
    calls: Arc<Mutex<Vec<DaemonCall>>>,

    /// Status queries needed after start/stop before the target is reported
    pub settle_polls: Arc<Mutex<u32>>,

    /// Transitions never complete
    pub stuck: Arc<Mutex<bool>>,

    pub fail_start: Arc<Mutex<bool>>,
    pub fail_stop: Arc<Mutex<bool>>,
    pub fail_kill: Arc<Mutex<bool>>,
    pub fail_describe: Arc<Mutex<bool>>,
}

impl MockDaemon {
    pub fn new(status: DaemonStatus) -> Self {
        Self {
            machine: Mutex::new(Machine::new(status)),
            calls: Arc::new(Mutex::new(Vec::new())),
            settle_polls: Arc::new(Mutex::new(1)),
            stuck: Arc::new(Mutex::new(false)),
            fail_start: Arc::new(Mutex::new(false)),
            fail_stop: Arc::new(Mutex::new(false)),
            fail_kill: Arc::new(Mutex::new(false)),
            fail_describe: Arc::new(Mutex::new(false)),
        }
    }

    pub fn stopped() -> Self {
        Self::new(DaemonStatus::Stopped)
    }

    pub fn running() -> Self {
        Self::new(DaemonStatus::Running)
    }

    pub fn status(&self) -> DaemonStatus {
        self.machine.lock().unwrap().status
    }

    pub fn set_status(&self, status: DaemonStatus) {
        *self.machine.lock().unwrap() = Machine::new(status);
    }

    pub fn calls(&self) -> Vec<DaemonCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: DaemonCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for MockDaemon {
    fn default() -> Self {
        Self::stopped()
    }
}

#[async_trait]
impl DaemonController for MockDaemon {
    async fn start(&self) -> HostResult<()> {
        self.record(DaemonCall::Start);
        if *self.fail_start.lock().unwrap() {
            return Err(HostError::Daemon("Mock start failure".into()));
        }
        let polls = *self.settle_polls.lock().unwrap();
        self.machine
            .lock()
            .unwrap()
            .begin(DaemonStatus::Starting, DaemonStatus::Running, polls);
        Ok(())
    }

    async fn stop(&self) -> HostResult<()> {
        self.record(DaemonCall::Stop);
        if *self.fail_stop.lock().unwrap() {
            return Err(HostError::Daemon("Mock stop failure".into()));
        }
        let polls = *self.settle_polls.lock().unwrap();
        self.machine
            .lock()
            .unwrap()
            .begin(DaemonStatus::Stopping, DaemonStatus::Stopped, polls);
        Ok(())
    }

    async fn kill(&self) -> HostResult<()> {
        self.record(DaemonCall::Kill);
        if *self.fail_kill.lock().unwrap() {
            return Err(HostError::Daemon("Mock kill failure".into()));
        }
        *self.machine.lock().unwrap() = Machine::new(DaemonStatus::Stopped);
        Ok(())
    }

    async fn describe_status(&self) -> HostResult<DaemonStatus> {
        self.record(DaemonCall::DescribeStatus);
        if *self.fail_describe.lock().unwrap() {
            return Err(HostError::Daemon("Mock describe failure".into()));
        }
        let stuck = *self.stuck.lock().unwrap();
        Ok(self.machine.lock().unwrap().observe(stuck))
    }
}

/// Notifier that keeps every published message
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,

    /// Report every publish as undelivered
    pub fail: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Whether any published message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().unwrap().iter().any(|m| m.contains(needle))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, message: &str) -> bool {
        self.messages.lock().unwrap().push(message.to_string());
        !*self.fail.lock().unwrap()
    }
}
