//! Client session state machine.
//!
//! The controller holds no I/O. The driver feeds it clock ticks and server
//! results and performs the actions it returns.
//!
//! A session is refreshed once while its remaining lifetime is in the
//! `(4, 5]` minute band. The band is re-armed only when a new expiry is
//! installed, so a stalled or repeated tick never triggers a second refresh
//! for the same token. At or past expiry the session is dropped locally.

use chrono::{DateTime, Utc};

use super::{
    credentials::StoredCredentials,
    errors::{login_error_message, ClientError},
};

const REFRESH_BAND_UPPER_MINUTES: f64 = 5.0;
const REFRESH_BAND_LOWER_MINUTES: f64 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggingIn,
    Authenticated,
    /// A refresh request is in flight.
    Refreshing,
}

/// What the driver must do after a tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickAction {
    None,
    Refresh { token: String },
    /// Local state is already cleared; tell the server in the background.
    ForceLogout { token: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    Empty,
    Expired,
    Restored,
}

#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
    credentials: Option<StoredCredentials>,
    refreshed_for: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    message: Option<String>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::LoggedOut,
            credentials: None,
            refreshed_for: None,
            last_seen: None,
            message: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&StoredCredentials> {
        self.credentials.as_ref()
    }

    /// Message for the last failed login, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Fractional minutes until the current token expires.
    #[must_use]
    pub fn minutes_left(&self, now: DateTime<Utc>) -> Option<f64> {
        self.credentials.as_ref().map(|creds| {
            #[allow(clippy::cast_precision_loss)]
            let millis = (creds.expires_at - now).num_milliseconds() as f64;
            millis / 60_000.0
        })
    }

    /// Adopt previously stored credentials unless they already expired.
    pub fn restore(
        &mut self,
        stored: Option<StoredCredentials>,
        now: DateTime<Utc>,
    ) -> RestoreOutcome {
        match stored {
            None => RestoreOutcome::Empty,
            Some(creds) if creds.is_expired_at(now) => RestoreOutcome::Expired,
            Some(creds) => {
                self.install(creds);
                RestoreOutcome::Restored
            }
        }
    }

    /// Returns `false` when a login can't start from the current state.
    pub fn begin_login(&mut self) -> bool {
        if self.state != SessionState::LoggedOut {
            return false;
        }
        self.state = SessionState::LoggingIn;
        self.message = None;
        true
    }

    pub fn login_succeeded(&mut self, credentials: StoredCredentials) {
        self.install(credentials);
    }

    pub fn login_failed(&mut self, err: &ClientError) {
        self.clear();
        self.message = Some(login_error_message(err));
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> TickAction {
        if !matches!(
            self.state,
            SessionState::Authenticated | SessionState::Refreshing
        ) {
            return TickAction::None;
        }
        let Some(creds) = self.credentials.clone() else {
            return TickAction::None;
        };
        let minutes_left = self.minutes_left(now).unwrap_or(0.0);

        if minutes_left <= 0.0 {
            self.clear();
            return TickAction::ForceLogout { token: creds.token };
        }

        let in_band = minutes_left > REFRESH_BAND_LOWER_MINUTES
            && minutes_left <= REFRESH_BAND_UPPER_MINUTES;
        if self.state == SessionState::Authenticated
            && in_band
            && self.refreshed_for != Some(creds.expires_at)
        {
            self.state = SessionState::Refreshing;
            self.refreshed_for = Some(creds.expires_at);
            return TickAction::Refresh { token: creds.token };
        }

        TickAction::None
    }

    /// Install a refreshed token. Ignored unless a refresh was in flight.
    pub fn refresh_succeeded(&mut self, credentials: StoredCredentials) -> bool {
        if self.state != SessionState::Refreshing {
            return false;
        }
        self.install(credentials);
        true
    }

    /// Any refresh failure ends the session without a message. Returns
    /// false when the session already moved on while the call was out.
    pub fn refresh_failed(&mut self) -> bool {
        if self.state != SessionState::Refreshing {
            return false;
        }
        self.clear();
        true
    }

    /// Clear the local session and hand back the token for the server call.
    pub fn logout(&mut self) -> Option<String> {
        let token = self.credentials.as_ref().map(|creds| creds.token.clone());
        self.clear();
        token
    }

    /// Local bookkeeping only; activity never extends the session.
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        self.last_seen = Some(now);
    }

    fn install(&mut self, credentials: StoredCredentials) {
        self.credentials = Some(credentials);
        self.state = SessionState::Authenticated;
        self.message = None;
    }

    fn clear(&mut self) {
        self.state = SessionState::LoggedOut;
        self.credentials = None;
        self.refreshed_for = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn creds(token: &str, expires_at: DateTime<Utc>) -> StoredCredentials {
        StoredCredentials {
            token: token.to_string(),
            expires_at,
        }
    }

    fn authenticated(issued_at: DateTime<Utc>) -> SessionController {
        let mut controller = SessionController::new();
        assert!(controller.begin_login());
        controller.login_succeeded(creds("first", issued_at + Duration::minutes(15)));
        controller
    }

    #[test]
    fn duplicate_login_is_rejected_while_in_flight() {
        let mut controller = SessionController::new();
        assert!(controller.begin_login());
        assert_eq!(controller.state(), SessionState::LoggingIn);
        assert!(!controller.begin_login());
    }

    #[test]
    fn login_failure_sets_message() {
        let mut controller = SessionController::new();
        controller.begin_login();
        controller.login_failed(&ClientError::Http {
            status: 401,
            message: Some("Invalid password".to_string()),
            reset_time: None,
        });
        assert_eq!(controller.state(), SessionState::LoggedOut);
        assert_eq!(controller.message(), Some("Invalid password"));
        assert!(controller.begin_login());
        assert_eq!(controller.message(), None);
    }

    #[test]
    fn no_refresh_outside_the_band() {
        let t0 = Utc::now();
        let mut controller = authenticated(t0);
        assert_eq!(controller.tick(t0), TickAction::None);
        assert_eq!(controller.tick(t0 + Duration::minutes(9)), TickAction::None);
        assert_eq!(
            controller.tick(t0 + Duration::minutes(11) + Duration::seconds(1)),
            TickAction::None
        );
    }

    #[test]
    fn band_triggers_exactly_one_refresh_per_expiry() {
        let t0 = Utc::now();
        let mut controller = authenticated(t0);

        let at = t0 + Duration::minutes(10) + Duration::seconds(10);
        assert_eq!(
            controller.tick(at),
            TickAction::Refresh {
                token: "first".to_string()
            }
        );
        assert_eq!(controller.state(), SessionState::Refreshing);
        // In flight: later ticks inside the band do nothing.
        assert_eq!(controller.tick(at + Duration::seconds(10)), TickAction::None);

        assert!(controller.refresh_succeeded(creds("second", at + Duration::minutes(15))));
        assert_eq!(controller.state(), SessionState::Authenticated);
        assert_eq!(controller.tick(at + Duration::seconds(20)), TickAction::None);

        // The new expiry re-arms the band.
        let next = at + Duration::minutes(10) + Duration::seconds(30);
        assert_eq!(
            controller.tick(next),
            TickAction::Refresh {
                token: "second".to_string()
            }
        );
    }

    #[test]
    fn band_is_not_retriggered_for_the_same_expiry() {
        let t0 = Utc::now();
        let mut controller = authenticated(t0);
        let expires_at = t0 + Duration::minutes(15);
        let at = t0 + Duration::minutes(10) + Duration::seconds(30);

        assert!(matches!(controller.tick(at), TickAction::Refresh { .. }));
        // A refresh that returns the same expiry leaves the band disarmed.
        controller.refresh_succeeded(creds("first", expires_at));
        assert_eq!(controller.tick(at + Duration::seconds(10)), TickAction::None);
    }

    #[test]
    fn expiry_forces_local_logout() {
        let t0 = Utc::now();
        let mut controller = authenticated(t0);
        assert_eq!(
            controller.tick(t0 + Duration::minutes(15)),
            TickAction::ForceLogout {
                token: "first".to_string()
            }
        );
        assert_eq!(controller.state(), SessionState::LoggedOut);
        assert!(controller.credentials().is_none());
        assert_eq!(controller.tick(t0 + Duration::minutes(16)), TickAction::None);
    }

    #[test]
    fn expiry_during_refresh_still_logs_out() {
        let t0 = Utc::now();
        let mut controller = authenticated(t0);
        assert!(matches!(
            controller.tick(t0 + Duration::minutes(10) + Duration::seconds(5)),
            TickAction::Refresh { .. }
        ));
        assert!(matches!(
            controller.tick(t0 + Duration::minutes(15)),
            TickAction::ForceLogout { .. }
        ));
        // A late success is ignored.
        assert!(!controller.refresh_succeeded(creds("late", t0 + Duration::minutes(30))));
        assert_eq!(controller.state(), SessionState::LoggedOut);
    }

    #[test]
    fn refresh_failure_clears_session_silently() {
        let t0 = Utc::now();
        let mut controller = authenticated(t0);
        controller.tick(t0 + Duration::minutes(10) + Duration::seconds(5));
        assert!(controller.refresh_failed());
        assert_eq!(controller.state(), SessionState::LoggedOut);
        assert!(controller.credentials().is_none());
        assert_eq!(controller.message(), None);
    }

    #[test]
    fn late_refresh_failure_leaves_new_session_alone() {
        let t0 = Utc::now();
        let mut controller = authenticated(t0);
        controller.tick(t0 + Duration::minutes(10) + Duration::seconds(5));
        controller.logout();
        assert!(controller.begin_login());
        controller.login_succeeded(creds("fresh", t0 + Duration::minutes(30)));

        assert!(!controller.refresh_failed());
        assert_eq!(controller.state(), SessionState::Authenticated);
        assert_eq!(
            controller.credentials().map(|c| c.token.as_str()),
            Some("fresh")
        );
    }

    #[test]
    fn activity_never_extends_expiry() {
        let t0 = Utc::now();
        let mut controller = authenticated(t0);
        controller.record_activity(t0 + Duration::minutes(14));
        assert_eq!(controller.last_seen(), Some(t0 + Duration::minutes(14)));
        assert!(matches!(
            controller.tick(t0 + Duration::minutes(15)),
            TickAction::ForceLogout { .. }
        ));
    }

    #[test]
    fn restore_skips_expired_credentials() {
        let now = Utc::now();
        let mut controller = SessionController::new();
        assert_eq!(controller.restore(None, now), RestoreOutcome::Empty);
        assert_eq!(
            controller.restore(Some(creds("old", now - Duration::seconds(1))), now),
            RestoreOutcome::Expired
        );
        assert_eq!(controller.state(), SessionState::LoggedOut);
        assert_eq!(
            controller.restore(Some(creds("live", now + Duration::minutes(3))), now),
            RestoreOutcome::Restored
        );
        assert_eq!(controller.state(), SessionState::Authenticated);
    }

    #[test]
    fn manual_logout_returns_token() {
        let t0 = Utc::now();
        let mut controller = authenticated(t0);
        assert_eq!(controller.logout(), Some("first".to_string()));
        assert_eq!(controller.logout(), None);
        assert_eq!(controller.state(), SessionState::LoggedOut);
    }
}
