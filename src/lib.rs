//! # Folio (portfolio admin API)
//!
//! `folio` guards the admin side of a portfolio site. It verifies the shared
//! admin password, issues short-lived rotating session tokens, and records
//! every security event in an append-only audit log.
//!
//! ## Login gate
//!
//! A login attempt passes three gates in order:
//!
//! - **Rate limit:** 5 attempts per client IP every 15 minutes. The counter is
//!   process-local and resets when the process restarts.
//! - **Bot check:** a reCAPTCHA v3 token is verified when a secret is
//!   configured; the score must be at least `0.5`.
//! - **Password:** compared in constant time against the configured secret.
//!
//! ## Sessions
//!
//! Session tokens live for 15 minutes. Only a SHA-256 hash of each token is
//! stored. A refresh rotates the token and deactivates the previous row, so a
//! token can never be extended in place. Expired rows are deactivated lazily
//! on their next use.
//!
//! ## Client
//!
//! The [`client`] module holds the session controller used by admin
//! front-ends: it polls the remaining lifetime, refreshes once inside the
//! last-five-minutes band, and logs out locally when the token expires.

pub mod api;
pub mod cli;
pub mod client;
pub mod clock;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
