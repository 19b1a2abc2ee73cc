//! Single-shot, replaceable expiry timer

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Message sent when an armed timer elapses
///
/// The receiver must re-validate the expiry before acting on it: a firing
/// can already be in the channel when the timer is re-armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryFired {
    /// Arm counter at the time this timer was armed
    pub generation: u64,
}

/// At most one pending expiry callback
pub struct ExpiryTimer {
    tx: mpsc::UnboundedSender<ExpiryFired>,
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl ExpiryTimer {
    pub fn new(tx: mpsc::UnboundedSender<ExpiryFired>) -> Self {
        Self {
            tx,
            handle: None,
            generation: 0,
        }
    }

    /// Cancel any pending timer and arm a new one. Must be called from
    /// within a tokio runtime.
    pub fn arm(&mut self, delay: Duration) -> u64 {
        self.cancel();
        self.generation += 1;

        let generation = self.generation;
        let tx = self.tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(generation, "Expiry timer elapsed");
            let _ = tx.send(ExpiryFired { generation });
        }));

        debug!(generation, delay_secs = delay.as_secs(), "Expiry timer armed");
        generation
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a timer is armed and has not fired yet
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = ExpiryTimer::new(tx);

        let generation = timer.arm(Duration::from_secs(60));
        assert!(timer.is_armed());

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.generation, generation);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = ExpiryTimer::new(tx);

        timer.arm(Duration::from_secs(60));
        let second = timer.arm(Duration::from_secs(120));

        let early = tokio::time::timeout(Duration::from_secs(90), rx.recv()).await;
        assert!(early.is_err(), "first timer should have been cancelled");

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.generation, second);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = ExpiryTimer::new(tx);

        timer.arm(Duration::from_secs(10));
        timer.cancel();
        assert!(!timer.is_armed());

        let result = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(result.is_err());
    }
}
