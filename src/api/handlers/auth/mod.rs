//! Admin authentication and session lifecycle.
//!
//! A single shared admin password guards the dashboard. A successful login
//! yields an opaque bearer token valid for 15 minutes; the client rotates it
//! through `/admin/refresh-token` before it runs out.
//!
//! ## Rate Limiting
//!
//! Login attempts are limited per client IP: 5 attempts in a 15 minute fixed
//! window. Every attempt counts, successful or not. Counters are process
//! local.
//!
//! ## Bot Check
//!
//! When a reCAPTCHA secret is configured and the request carries a token, the
//! token must verify with a score of at least 0.5. Without a secret the check
//! is skipped.

pub(crate) mod audit;
pub(crate) mod captcha;
mod error;
pub(crate) mod guard;
pub(crate) mod rate_limit;
mod service;
pub(crate) mod session;
pub(crate) mod types;
pub(crate) mod utils;

pub use audit::AuditLog;
pub use captcha::{BotVerifier, DisabledBotVerifier, RecaptchaVerifier};
pub use error::{AuthError, ErrorBody};
pub use guard::{require_session, SessionContext};
pub use rate_limit::{InMemoryRateLimiter, RateLimitDecision, RateLimiter};
pub use service::{AuthConfig, AuthService, IssuedToken, LoginInput};

#[cfg(test)]
mod tests;
