//! Rate limiting primitives for the admin login flow.
//!
//! Counters live in process memory: they reset on restart and are not shared
//! between instances.

use chrono::{DateTime, Duration, Utc};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_WINDOW_SECONDS: i64 = 15 * 60;

/// Identity used when the caller's address cannot be determined.
pub const UNKNOWN_IDENTITY: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { reset_at: DateTime<Utc> },
}

pub trait RateLimiter: Send + Sync {
    /// Register one attempt for `identity` and decide whether it may proceed.
    fn check(&self, identity: &str, now: DateTime<Utc>) -> RateLimitDecision;
}

#[derive(Clone, Copy, Debug)]
struct RateLimitRecord {
    attempts: u32,
    window_reset_at: DateTime<Utc>,
}

/// Fixed-window counter keyed by identity.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    max_attempts: u32,
    window: Duration,
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl InMemoryRateLimiter {
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            window,
            records: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::seconds(DEFAULT_WINDOW_SECONDS),
        )
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn check(&self, identity: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match records.get_mut(identity) {
            Some(record) if now < record.window_reset_at => {
                if record.attempts >= self.max_attempts {
                    return RateLimitDecision::Limited {
                        reset_at: record.window_reset_at,
                    };
                }
                record.attempts += 1;
                RateLimitDecision::Allowed {
                    remaining: self.max_attempts - record.attempts,
                }
            }
            _ => {
                records.insert(
                    identity.to_string(),
                    RateLimitRecord {
                        attempts: 1,
                        window_reset_at: now + self.window,
                    },
                );
                RateLimitDecision::Allowed {
                    remaining: self.max_attempts - 1,
                }
            }
        }
    }
}
