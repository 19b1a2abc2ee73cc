//! One-time verification codes
//!
//! Codes are checked at request admission only. A code stays valid until its
//! TTL runs out or a newer code is issued for the same operator.

use chrono::{DateTime, Local};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use underlamp_config::AccessPolicy;
use underlamp_util::RateLimiter;

use crate::Clock;

/// Check an operator's verification code
pub trait Verifier: Send + Sync {
    fn check_code(&self, identity: &str, code: &str) -> bool;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("{0} is not on the access list")]
    NotAnOperator(String),

    #[error("Too many codes requested for {0}")]
    RateLimited(String),
}

/// A freshly issued code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Local>,
}

struct LiveCode {
    code: String,
    expires_at: DateTime<Local>,
}

struct Book {
    operators: HashMap<String, String>,
    admins: HashSet<String>,
    codes: HashMap<String, LiveCode>,
    limiter: RateLimiter<String>,
}

/// In-memory code book plus the mutable access list
pub struct CodeBook {
    book: Mutex<Book>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CodeBook {
    pub fn new(access: &AccessPolicy, clock: Arc<dyn Clock>) -> Self {
        let operators = access
            .operators
            .iter()
            .map(|op| (op.id.clone(), op.display_name.clone()))
            .collect();

        Self {
            book: Mutex::new(Book {
                operators,
                admins: access.admins.clone(),
                codes: HashMap::new(),
                limiter: RateLimiter::new(
                    access.code_requests_per_hour,
                    Duration::from_secs(3600),
                ),
            }),
            ttl: access.code_ttl,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a new code for `operator`, replacing any live one
    pub fn issue(&self, operator: &str) -> Result<IssuedCode, VerificationError> {
        let mut book = self.lock();
        if !book.operators.contains_key(operator) {
            return Err(VerificationError::NotAnOperator(operator.to_string()));
        }
        if !book.limiter.check(&operator.to_string()) {
            return Err(VerificationError::RateLimited(operator.to_string()));
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(100_000..=999_999));
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::minutes(5));
        let expires_at = self.clock.now() + ttl;

        book.codes.insert(
            operator.to_string(),
            LiveCode {
                code: code.clone(),
                expires_at,
            },
        );
        info!(operator, "Verification code issued");

        Ok(IssuedCode { code, expires_at })
    }

    pub fn is_operator(&self, id: &str) -> bool {
        self.lock().operators.contains_key(id)
    }

    pub fn is_admin(&self, id: &str) -> bool {
        self.lock().admins.contains(id)
    }

    /// Display name for `id`, falling back to the id itself
    pub fn display_name(&self, id: &str) -> String {
        self.lock()
            .operators
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Add `id` to the access list. Returns `false` if it was already there.
    pub fn add_operator(&self, id: &str, display_name: &str) -> bool {
        let mut book = self.lock();
        if book.operators.contains_key(id) {
            return false;
        }
        book.operators
            .insert(id.to_string(), display_name.to_string());
        info!(operator = id, "Operator added to access list");
        true
    }

    /// Drop expired codes
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let mut book = self.lock();
        book.codes.retain(|_, live| live.expires_at > now);
        book.limiter.cleanup(Duration::from_secs(2 * 3600));
    }
}

impl Verifier for CodeBook {
    fn check_code(&self, identity: &str, code: &str) -> bool {
        let now = self.clock.now();
        let book = self.lock();
        match book.codes.get(identity) {
            Some(live) if live.expires_at <= now => {
                debug!(operator = identity, "Verification code expired");
                false
            }
            Some(live) => live.code == code,
            None => false,
        }
    }
}
