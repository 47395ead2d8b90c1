//! Admin login, token rotation and session validation.
//!
//! Flow Overview:
//! 1) `login` runs the rate limiter, the bot check and the password check, in
//!    that order, and issues a session token on success.
//! 2) `refresh` validates the presented token, retires it and issues a new
//!    one with a fresh expiry.
//! 3) `validate` resolves a bearer token to its session and bumps
//!    `last_activity`; expiry is never extended.
//! 4) `logout` retires a token and always succeeds.
//!
//! Every security-relevant failure is written to the audit log before the
//! error is returned.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    audit::AuditLog,
    captcha::{BotVerifier, DisabledBotVerifier},
    error::AuthError,
    rate_limit::{InMemoryRateLimiter, RateLimitDecision, RateLimiter, UNKNOWN_IDENTITY},
    utils::{generate_session_token, hash_session_token, secrets_match},
};
use crate::{
    api::notify::LoginAlerts,
    clock::{Clock, SystemClock},
    store::{AuditAction, AuditReason, LogStore, NewSession, Session, SessionStore},
};

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 15 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    admin_password: SecretString,
    session_ttl_seconds: i64,
    trust_proxy_headers: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(admin_password: SecretString) -> Self {
        Self {
            admin_password,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            trust_proxy_headers: false,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    /// Take the client address from `x-forwarded-for`/`x-real-ip` instead of
    /// the socket peer. Only safe behind a proxy that overwrites them.
    #[must_use]
    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoginInput {
    pub password: String,
    pub captcha_token: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// A freshly minted token. The raw value is never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthService {
    config: AuthConfig,
    sessions: Arc<dyn SessionStore>,
    logs: Arc<dyn LogStore>,
    audit: AuditLog,
    clock: Arc<dyn Clock>,
    limiter: Arc<dyn RateLimiter>,
    verifier: Arc<dyn BotVerifier>,
    alerts: LoginAlerts,
}

impl AuthService {
    /// Service with the system clock, the default in-memory limiter, the bot
    /// check disabled and log-only alerts.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        sessions: Arc<dyn SessionStore>,
        logs: Arc<dyn LogStore>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            config,
            sessions,
            audit: AuditLog::new(logs.clone(), clock.clone()),
            logs,
            clock,
            limiter: Arc::new(InMemoryRateLimiter::default()),
            verifier: Arc::new(DisabledBotVerifier),
            alerts: LoginAlerts::log_only(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.audit = AuditLog::new(self.logs.clone(), clock.clone());
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_bot_verifier(mut self, verifier: Arc<dyn BotVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub fn with_alerts(mut self, alerts: LoginAlerts) -> Self {
        self.alerts = alerts;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// # Errors
    /// `RateLimited` when the caller exhausted its attempts, `Validation` when
    /// the bot check fails, `Unauthorized` on a wrong password and `Upstream`
    /// when the session cannot be stored.
    #[instrument(skip_all, fields(client_ip = input.client_ip.as_deref().unwrap_or(UNKNOWN_IDENTITY)))]
    pub async fn login(&self, input: LoginInput) -> Result<IssuedToken, AuthError> {
        let now = self.clock.now();
        let ip = input.client_ip.as_deref();
        let identity = ip.unwrap_or(UNKNOWN_IDENTITY);

        if let RateLimitDecision::Limited { reset_at } = self.limiter.check(identity, now) {
            warn!("Admin login rate limited");
            self.audit
                .record(
                    AuditAction::Login,
                    false,
                    Some(AuditReason::RateLimited),
                    json!({ "reset_at": reset_at }),
                    ip,
                )
                .await;
            return Err(AuthError::RateLimited { reset_at });
        }

        if self.verifier.enabled() {
            if let Some(token) = input.captcha_token.as_deref() {
                if !self.verifier.verify(token, ip).await {
                    warn!("Admin login failed bot check");
                    self.audit
                        .record(
                            AuditAction::Login,
                            false,
                            Some(AuditReason::InvalidCaptcha),
                            json!({ "user_agent": input.user_agent }),
                            ip,
                        )
                        .await;
                    return Err(AuthError::Validation(
                        "reCAPTCHA verification failed".to_string(),
                    ));
                }
            }
        }

        let expected = self.config.admin_password.expose_secret();
        if expected.is_empty() || !secrets_match(&input.password, expected) {
            warn!("Admin login with wrong password");
            self.audit
                .record(
                    AuditAction::Login,
                    false,
                    Some(AuditReason::WrongPassword),
                    json!({ "user_agent": input.user_agent }),
                    ip,
                )
                .await;
            self.alerts
                .login_attempt(false, ip, input.user_agent.as_deref(), now);
            return Err(AuthError::Unauthorized("Invalid password".to_string()));
        }

        let issued = self
            .issue(now, input.client_ip.clone(), input.user_agent.clone())
            .await?;
        info!("Admin login succeeded");
        self.audit
            .record(
                AuditAction::Login,
                true,
                None,
                json!({ "user_agent": input.user_agent, "expires_at": issued.expires_at }),
                ip,
            )
            .await;
        self.alerts
            .login_attempt(true, ip, input.user_agent.as_deref(), now);
        Ok(issued)
    }

    /// Swap a valid token for a new one. The old token stops working.
    ///
    /// # Errors
    /// `Unauthorized` when the token is unknown, inactive or expired.
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        token: &str,
        client_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<IssuedToken, AuthError> {
        let session = match self.validate(token).await {
            Ok(session) => session,
            Err(AuthError::Unauthorized(message)) => {
                self.audit_invalid_refresh(client_ip.as_deref()).await;
                return Err(AuthError::Unauthorized(message));
            }
            Err(err) => return Err(err),
        };

        // Only the caller that flips the row may mint its successor.
        if !self.sessions.deactivate_session(session.id).await? {
            warn!("Concurrent refresh lost the race for session {}", session.id);
            self.audit_invalid_refresh(client_ip.as_deref()).await;
            return Err(AuthError::Unauthorized("Invalid session".to_string()));
        }
        let now = self.clock.now();
        let issued = self.issue(now, client_ip.clone(), user_agent).await?;
        self.audit
            .record(
                AuditAction::Refresh,
                true,
                None,
                json!({ "previous_session": session.id, "expires_at": issued.expires_at }),
                client_ip.as_deref(),
            )
            .await;
        Ok(issued)
    }

    /// Retire a token. Unknown and already inactive tokens are not an error.
    ///
    /// # Errors
    /// `Upstream` when the store cannot be reached.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str, client_ip: Option<&str>) -> Result<(), AuthError> {
        let token_hash = hash_session_token(token);
        let was_active = match self.sessions.find_session(&token_hash).await? {
            Some(session) => self.sessions.deactivate_session(session.id).await?,
            None => false,
        };
        self.audit
            .record(
                AuditAction::Logout,
                true,
                None,
                json!({ "already_inactive": !was_active }),
                client_ip,
            )
            .await;
        Ok(())
    }

    /// Resolve a token to its active session and record the activity.
    ///
    /// An expired session is deactivated on the spot.
    ///
    /// # Errors
    /// `Unauthorized` when the token is unknown, inactive or expired.
    pub async fn validate(&self, token: &str) -> Result<Session, AuthError> {
        let token_hash = hash_session_token(token);
        let Some(session) = self.sessions.find_session(&token_hash).await? else {
            return Err(AuthError::Unauthorized("Invalid session".to_string()));
        };
        if !session.is_active {
            return Err(AuthError::Unauthorized("Invalid session".to_string()));
        }

        let now = self.clock.now();
        if session.is_expired_at(now) {
            self.sessions.deactivate_session(session.id).await?;
            return Err(AuthError::Unauthorized("Session expired".to_string()));
        }

        self.sessions.touch_session(session.id, now).await?;
        Ok(Session {
            last_activity: now,
            ..session
        })
    }

    async fn audit_invalid_refresh(&self, client_ip: Option<&str>) {
        self.audit
            .record(
                AuditAction::Refresh,
                false,
                Some(AuditReason::InvalidSession),
                json!({}),
                client_ip,
            )
            .await;
    }

    async fn issue(
        &self,
        now: DateTime<Utc>,
        client_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<IssuedToken, AuthError> {
        let token = generate_session_token()?;
        let expires_at = now + Duration::seconds(self.config.session_ttl_seconds);
        self.sessions
            .insert_session(NewSession {
                token_hash: hash_session_token(&token),
                issued_at: now,
                expires_at,
                client_ip,
                user_agent,
            })
            .await?;
        Ok(IssuedToken {
            token,
            expires_in: self.config.session_ttl_seconds,
            expires_at,
        })
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
