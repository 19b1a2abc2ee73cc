//! Lifecycle state machine
//!
//! One mutex guards the state, both timestamps and the expiry timer. It is
//! only ever held for in-memory bookkeeping; no method here awaits.
//!
//! Operations come in triads: a `try_*` pre-check that moves into a
//! transitional state (or is rejected without side effects), then exactly one
//! of `on_*_success` or `on_*_failed` once the external work is done.

use chrono::{DateTime, Local};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use underlamp_api::{LifecycleState, StatusSnapshot};
use underlamp_util::remaining_minutes;

use crate::{Clock, ExpiryFired, ExpiryTimer};

/// The legal transition table
const TRANSITIONS: &[(LifecycleState, LifecycleState)] = {
    use LifecycleState::*;
    &[
        (Stopped, Starting),
        (Starting, Running),
        (Starting, Stopped),
        (Running, Stopping),
        (Running, Extending),
        (Running, WaitingForStop),
        (Extending, Running),
        (Stopping, Stopped),
        (WaitingForStop, Stopping),
    ]
};

/// Whether `from -> to` appears in the transition table
pub fn is_legal_transition(from: LifecycleState, to: LifecycleState) -> bool {
    TRANSITIONS.contains(&(from, to))
}

/// A `try_*` pre-check refused the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub action: &'static str,
    pub state: LifecycleState,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Current state is {}, cannot {}", self.state, self.action)
    }
}

impl std::error::Error for Rejection {}

/// Result of the auto-shutdown re-validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoShutdownDecision {
    /// Claimed: the state is now `WaitingForStop` and the stop sequence must run
    Proceed,
    /// The expiry was moved after the timer was armed
    Extended { expire_time: DateTime<Local> },
    /// Nothing to shut down, or another operation owns the state
    NotRunning { state: LifecycleState },
}

struct Inner {
    state: LifecycleState,
    start_time: Option<DateTime<Local>>,
    expire_time: Option<DateTime<Local>>,
    timer: ExpiryTimer,
}

impl Inner {
    fn transition(&mut self, to: LifecycleState) {
        let from = self.state;
        assert!(
            is_legal_transition(from, to),
            "illegal lifecycle transition: {} -> {}",
            from,
            to
        );

        self.state = to;
        if to == LifecycleState::Stopped {
            self.start_time = None;
            self.expire_time = None;
        }
        debug!(from = %from, to = %to, "Lifecycle transition");
    }
}

/// Authoritative lifecycle state for the managed resource/daemon pair
pub struct Lifecycle {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl Lifecycle {
    /// Create a lifecycle in `Stopped`, plus the receiver for expiry firings
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<ExpiryFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let lifecycle = Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::Stopped,
                start_time: None,
                expire_time: None,
                timer: ExpiryTimer::new(tx),
            }),
            clock,
        };
        (lifecycle, rx)
    }

    // A panic under the lock only happens on an illegal transition, which
    // leaves the data itself consistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_enter(
        &self,
        action: &'static str,
        sources: &[LifecycleState],
        to: LifecycleState,
    ) -> Result<(), Rejection> {
        let mut inner = self.lock();
        if !sources.contains(&inner.state) {
            debug!(state = %inner.state, action, "Pre-check rejected");
            return Err(Rejection {
                action,
                state: inner.state,
            });
        }
        inner.transition(to);
        Ok(())
    }

    /// `Stopped -> Starting`
    pub fn try_start(&self) -> Result<(), Rejection> {
        self.try_enter("start", &[LifecycleState::Stopped], LifecycleState::Starting)
    }

    /// `Running | WaitingForStop -> Stopping`
    pub fn try_stop(&self) -> Result<(), Rejection> {
        self.try_enter(
            "stop",
            &[LifecycleState::Running, LifecycleState::WaitingForStop],
            LifecycleState::Stopping,
        )
    }

    /// `Running -> Extending`
    pub fn try_extend(&self) -> Result<(), Rejection> {
        self.try_enter("extend", &[LifecycleState::Running], LifecycleState::Extending)
    }

    /// `Starting -> Running`, recording the run window and arming the timer
    pub fn on_start_success(&self, start_time: DateTime<Local>, expire_time: DateTime<Local>) {
        let mut inner = self.lock();
        inner.transition(LifecycleState::Running);
        inner.start_time = Some(start_time);
        inner.expire_time = Some(expire_time);

        let delay = self.delay_until(expire_time);
        inner.timer.arm(delay);
        info!(
            start = %underlamp_util::format_datetime_full(&start_time),
            expire = %underlamp_util::format_datetime_full(&expire_time),
            "Lifecycle running"
        );
    }

    /// `Stopping -> Stopped`, cancelling the timer
    pub fn on_stop_success(&self) {
        let mut inner = self.lock();
        inner.transition(LifecycleState::Stopped);
        inner.timer.cancel();
        info!("Lifecycle stopped");
    }

    /// `Extending -> Running` with a new expiry; the previous timer is replaced
    pub fn on_extend_success(&self, new_expire_time: DateTime<Local>) {
        let mut inner = self.lock();
        inner.transition(LifecycleState::Running);
        inner.expire_time = Some(new_expire_time);

        let delay = self.delay_until(new_expire_time);
        inner.timer.arm(delay);
        info!(
            expire = %underlamp_util::format_datetime_full(&new_expire_time),
            "Lifecycle extended"
        );
    }

    /// `Starting -> Stopped`
    pub fn on_start_failed(&self) {
        self.lock().transition(LifecycleState::Stopped);
    }

    /// `Stopping -> Running`, leaving timestamps and timer untouched
    pub fn on_stop_failed(&self) {
        self.lock().transition(LifecycleState::Running);
    }

    /// `Extending -> Running`, leaving timestamps and timer untouched
    pub fn on_extend_failed(&self) {
        self.lock().transition(LifecycleState::Running);
    }

    /// Re-validate an expiry firing and, if it still stands, claim the
    /// resource for the stop sequence by moving to `WaitingForStop`.
    ///
    /// The claim happens under the same lock as the check, so no extension can
    /// slip in between.
    pub fn begin_auto_shutdown(&self) -> AutoShutdownDecision {
        let mut inner = self.lock();
        let now = self.clock.now();

        if let Some(expire_time) = inner.expire_time
            && now < expire_time
        {
            return AutoShutdownDecision::Extended { expire_time };
        }

        if inner.state != LifecycleState::Running {
            return AutoShutdownDecision::NotRunning { state: inner.state };
        }

        inner.transition(LifecycleState::WaitingForStop);
        AutoShutdownDecision::Proceed
    }

    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    pub fn expire_time(&self) -> Option<DateTime<Local>> {
        self.lock().expire_time
    }

    pub fn start_time(&self) -> Option<DateTime<Local>> {
        self.lock().start_time
    }

    /// Whether an expiry timer is pending
    pub fn timer_armed(&self) -> bool {
        self.lock().timer.is_armed()
    }

    pub fn status(&self) -> StatusSnapshot {
        let inner = self.lock();
        let now = self.clock.now();
        StatusSnapshot {
            state: inner.state,
            start_time: inner.start_time,
            expire_time: inner.expire_time,
            remaining_minutes: inner
                .expire_time
                .map(|expire| remaining_minutes(&expire, &now)),
        }
    }

    fn delay_until(&self, at: DateTime<Local>) -> Duration {
        at.signed_duration_since(self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
