//! Bounded status polling

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use underlamp_host_api::HostResult;

use crate::{OrchestrationError, OrchestrationResult};

/// Poll `probe` every `interval` until `done` accepts its value or `timeout`
/// has elapsed.
///
/// The first probe happens one interval after the call. Probe errors end the
/// wait immediately.
pub async fn poll_until<T, F, Fut, P>(
    what: &'static str,
    interval: Duration,
    timeout: Duration,
    mut probe: F,
    mut done: P,
) -> OrchestrationResult<T>
where
    T: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = HostResult<T>>,
    P: FnMut(&T) -> bool,
{
    let deadline = Instant::now() + timeout;

    loop {
        tokio::time::sleep(interval).await;

        let value = probe().await?;
        if done(&value) {
            debug!(what, status = %value, "Poll satisfied");
            return Ok(value);
        }
        debug!(what, status = %value, "Still waiting");

        if Instant::now() >= deadline {
            return Err(OrchestrationError::Timeout {
                what,
                after: timeout,
                last_status: value.to_string(),
            });
        }
    }
}
