//! Time source for the lifecycle

use chrono::{DateTime, Local};
use tokio::time::Instant;

/// Source of "now" for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall-clock readings derived from a monotonic instant
///
/// The wall time is sampled once at construction; later readings add the
/// monotonic time elapsed since then, so expiry checks are immune to the
/// system clock being stepped. Built on `tokio::time::Instant`, which means
/// a paused test runtime controls it too.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    base_wall: DateTime<Local>,
    base_instant: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            base_wall: underlamp_util::now(),
            base_instant: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Local> {
        let elapsed = Instant::now().saturating_duration_since(self.base_instant);
        match chrono::Duration::from_std(elapsed) {
            Ok(delta) => self.base_wall + delta,
            Err(_) => self.base_wall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn follows_tokio_time() {
        let clock = MonotonicClock::new();
        let t0 = clock.now();

        tokio::time::advance(Duration::from_secs(90)).await;

        let elapsed = clock.now().signed_duration_since(t0);
        assert_eq!(elapsed.num_seconds(), 90);
    }
}
