//! Time utilities for underlampd
//!
//! Wall-clock time is used for display and for the expiry timestamps reported
//! to operators. Enforcement of expiry uses a monotonic clock anchored to
//! [`now()`] (see `underlamp_core::MonotonicClock`).
//!
//! # Mock Time for Development
//!
//! In debug builds, the `UNDERLAMP_MOCK_TIME` environment variable overrides the
//! starting wall-clock time. Mock time then advances at the real rate.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "UNDERLAMP_MOCK_TIME";

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // wraps Local::now()
fn mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let raw = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            match parse_mock_time(&raw) {
                Some(mock) => {
                    let offset = mock.signed_duration_since(chrono::Local::now());
                    tracing::info!(
                        mock_time = %raw,
                        offset_secs = offset.num_seconds(),
                        "Mock time enabled"
                    );
                    Some(offset)
                }
                None => {
                    tracing::warn!(
                        mock_time = %raw,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time, ignoring"
                    );
                    None
                }
            }
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

fn parse_mock_time(raw: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()?;
    Local.from_local_datetime(&naive).single()
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)]
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();
    match mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Format a timestamp as `HH:MM`, the form used in operator notifications.
pub fn format_clock_time(dt: &DateTime<Local>) -> String {
    dt.format("%H:%M").to_string()
}

/// Format a timestamp with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Whole minutes left until `expire`, floored and clamped at zero.
pub fn remaining_minutes(expire: &DateTime<Local>, now: &DateTime<Local>) -> u64 {
    let secs = expire.signed_duration_since(*now).num_seconds();
    if secs <= 0 { 0 } else { (secs / 60) as u64 }
}

/// Build a `Duration` from a number of minutes.
pub const fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Format a duration in a human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    match (hours, minutes, seconds) {
        (0, 0, s) => format!("{}s", s),
        (0, m, 0) => format!("{}m", m),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, m, _) => format!("{}h {}m", h, m),
    }
}
