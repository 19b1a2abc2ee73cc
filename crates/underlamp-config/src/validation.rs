//! Configuration validation

use crate::policy::{DEFAULT_EXTEND_MINUTES, DEFAULT_START_MINUTES, Timings};
use crate::schema::{RawAccessConfig, RawConfig, RawScheduleConfig, RawTimings};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[{section}] {field} cannot be empty")]
    EmptyField {
        section: &'static str,
        field: &'static str,
    },

    #[error("[{section}] {field} must be an http(s) URL, got '{value}'")]
    InvalidUrl {
        section: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Duplicate operator ID: {0}")]
    DuplicateOperator(String),

    #[error("Admin '{0}' is not on the operator list")]
    UnknownAdmin(String),

    #[error("[schedule] {field}: {message}")]
    InvalidMinutes {
        field: &'static str,
        message: String,
    },

    #[error("[timings] {field}: {message}")]
    InvalidTiming {
        field: &'static str,
        message: String,
    },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_access(&config.access));
    errors.extend(validate_schedule(&config.schedule));
    errors.extend(validate_timings(&config.timings));

    if config.resource.region_id.trim().is_empty() {
        errors.push(ValidationError::EmptyField {
            section: "resource",
            field: "region_id",
        });
    }
    if config.resource.instance_id.trim().is_empty() {
        errors.push(ValidationError::EmptyField {
            section: "resource",
            field: "instance_id",
        });
    }

    let daemon = &config.daemon;
    if !is_http_url(&daemon.base_url) {
        errors.push(ValidationError::InvalidUrl {
            section: "daemon",
            field: "base_url",
            value: daemon.base_url.clone(),
        });
    }
    for (field, value) in [
        ("api_key", &daemon.api_key),
        ("daemon_id", &daemon.daemon_id),
        ("instance_uuid", &daemon.instance_uuid),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::EmptyField {
                section: "daemon",
                field,
            });
        }
    }
    if daemon.request_timeout_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "[daemon] request_timeout_seconds must be positive".into(),
        ));
    }

    if let Some(url) = &config.notify.webhook_url
        && !is_http_url(url)
    {
        errors.push(ValidationError::InvalidUrl {
            section: "notify",
            field: "webhook_url",
            value: url.clone(),
        });
    }

    errors
}

fn validate_access(access: &RawAccessConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for operator in &access.operators {
        if operator.id.trim().is_empty() {
            errors.push(ValidationError::EmptyField {
                section: "access",
                field: "operators.id",
            });
        } else if !seen.insert(operator.id.as_str()) {
            errors.push(ValidationError::DuplicateOperator(operator.id.clone()));
        }
    }

    for admin in &access.admins {
        if !seen.contains(admin.as_str()) {
            errors.push(ValidationError::UnknownAdmin(admin.clone()));
        }
    }

    if access.code_ttl_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "[access] code_ttl_seconds must be positive".into(),
        ));
    }
    if access.code_requests_per_hour == Some(0) {
        errors.push(ValidationError::GlobalError(
            "[access] code_requests_per_hour must be positive".into(),
        ));
    }

    errors
}

fn validate_schedule(schedule: &RawScheduleConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let lists: [(&'static str, &[u32]); 2] = [
        (
            "start_minutes",
            schedule
                .start_minutes
                .as_deref()
                .unwrap_or(DEFAULT_START_MINUTES),
        ),
        (
            "extend_minutes",
            schedule
                .extend_minutes
                .as_deref()
                .unwrap_or(DEFAULT_EXTEND_MINUTES),
        ),
    ];

    for (field, values) in lists {
        if values.is_empty() {
            errors.push(ValidationError::InvalidMinutes {
                field,
                message: "at least one value is required".into(),
            });
        }
        if values.contains(&0) {
            errors.push(ValidationError::InvalidMinutes {
                field,
                message: "values must be positive".into(),
            });
        }
        let unique: HashSet<_> = values.iter().collect();
        if unique.len() != values.len() {
            errors.push(ValidationError::InvalidMinutes {
                field,
                message: "values must be unique".into(),
            });
        }
    }

    errors
}

fn validate_timings(raw: &RawTimings) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let timings = Timings::from_raw(raw);

    if timings.poll_interval.is_zero() {
        errors.push(ValidationError::InvalidTiming {
            field: "poll_interval_seconds",
            message: "must be positive".into(),
        });
        return errors;
    }

    let bounded = [
        ("resource_boot_timeout_seconds", timings.resource_boot_timeout),
        ("resource_stop_timeout_seconds", timings.resource_stop_timeout),
        ("daemon_boot_timeout_seconds", timings.daemon_boot_timeout),
    ];
    for (field, timeout) in bounded {
        if timeout < timings.poll_interval {
            errors.push(ValidationError::InvalidTiming {
                field,
                message: format!(
                    "{}s is shorter than the poll interval ({}s)",
                    timeout.as_secs(),
                    timings.poll_interval.as_secs()
                ),
            });
        }
    }

    if timings.poll_interval > Duration::from_secs(300) {
        errors.push(ValidationError::InvalidTiming {
            field: "poll_interval_seconds",
            message: "must not exceed 300".into(),
        });
    }

    errors
}

fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}
