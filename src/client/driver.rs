//! Background task that keeps a client session alive.

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn, Instrument};

use super::{
    api::{AdminApi, TokenGrant},
    controller::{RestoreOutcome, SessionController, SessionState, TickAction},
    credentials::{CredentialStore, StoredCredentials},
    ClientError,
};
use crate::clock::Clock;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

struct Shared {
    controller: Mutex<SessionController>,
    api: Arc<dyn AdminApi>,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn persist(&self, credentials: &StoredCredentials) {
        if let Err(err) = self.credentials.save(credentials) {
            warn!("Failed to persist session: {err}");
        }
    }

    fn forget(&self) {
        if let Err(err) = self.credentials.clear() {
            warn!("Failed to clear stored session: {err}");
        }
    }

    /// Fire a server logout without waiting for it.
    fn logout_in_background(&self, token: String) {
        let api = self.api.clone();
        tokio::spawn(
            async move {
                if let Err(err) = api.logout(&token).await {
                    debug!("Background logout failed: {err}");
                }
            }
            .instrument(tracing::debug_span!("client.logout")),
        );
    }

    async fn tick(&self) -> SessionState {
        let now = self.clock.now();
        let action = self.controller.lock().await.tick(now);

        match action {
            TickAction::None => {}
            TickAction::ForceLogout { token } => {
                info!("Session expired, logging out");
                self.forget();
                self.logout_in_background(token);
            }
            TickAction::Refresh { token } => match self.api.refresh(&token).await {
                Ok(grant) => {
                    let credentials = credentials_from(grant);
                    let installed = self
                        .controller
                        .lock()
                        .await
                        .refresh_succeeded(credentials.clone());
                    if installed {
                        debug!("Session refreshed");
                        self.persist(&credentials);
                    } else {
                        // The session changed while the call was out; retire the orphan.
                        debug!("Discarding refreshed token for a replaced session");
                        self.logout_in_background(credentials.token);
                    }
                }
                Err(err) => {
                    debug!("Session refresh failed: {err}");
                    if self.controller.lock().await.refresh_failed() {
                        self.forget();
                    }
                }
            },
        }

        self.controller.lock().await.state()
    }
}

fn credentials_from(grant: TokenGrant) -> StoredCredentials {
    StoredCredentials {
        token: grant.token,
        expires_at: grant.expires_at,
    }
}

/// Owns a [`SessionController`] and polls it on an interval.
///
/// Dropping the driver stops the poll task.
pub struct SessionDriver {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SessionDriver {
    /// Restore any stored session and start polling.
    ///
    /// # Errors
    /// Returns `ClientError::Storage` if stored credentials cannot be read.
    pub async fn start(
        api: Arc<dyn AdminApi>,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Result<Self, ClientError> {
        let stored = credentials.load()?;
        let mut controller = SessionController::new();
        match controller.restore(stored, clock.now()) {
            RestoreOutcome::Restored => info!("Restored stored session"),
            RestoreOutcome::Expired => {
                info!("Stored session expired, discarding");
                credentials.clear()?;
            }
            RestoreOutcome::Empty => {}
        }

        let shared = Arc::new(Shared {
            controller: Mutex::new(controller),
            api,
            credentials,
            clock,
        });
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let poll = shared.clone();
        let task = tokio::spawn(
            async move {
                let start = tokio::time::Instant::now() + poll_interval;
                let mut interval = tokio::time::interval_at(start, poll_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            poll.tick().await;
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                }
                debug!("Session poll stopped");
            }
            .instrument(tracing::debug_span!("client.poll")),
        );

        Ok(Self {
            shared,
            shutdown,
            task: Some(task),
        })
    }

    /// # Errors
    /// `ClientError::LoginInProgress` for a duplicate submission; otherwise the
    /// server or transport error. The user-facing text is in [`Self::message`].
    pub async fn login(
        &self,
        password: &str,
        recaptcha_token: Option<&str>,
    ) -> Result<(), ClientError> {
        if !self.shared.controller.lock().await.begin_login() {
            return Err(ClientError::LoginInProgress);
        }

        match self.shared.api.login(password, recaptcha_token).await {
            Ok(grant) => {
                let credentials = credentials_from(grant);
                self.shared.persist(&credentials);
                self.shared
                    .controller
                    .lock()
                    .await
                    .login_succeeded(credentials);
                Ok(())
            }
            Err(err) => {
                self.shared.controller.lock().await.login_failed(&err);
                Err(err)
            }
        }
    }

    /// Best-effort server logout, then clear the local session.
    pub async fn logout(&self) {
        let token = self
            .shared
            .controller
            .lock()
            .await
            .credentials()
            .map(|creds| creds.token.clone());
        if let Some(token) = token {
            if let Err(err) = self.shared.api.logout(&token).await {
                debug!("Server logout failed: {err}");
            }
        }
        self.shared.controller.lock().await.logout();
        self.shared.forget();
    }

    /// Run one poll iteration immediately.
    pub async fn tick(&self) -> SessionState {
        self.shared.tick().await
    }

    pub async fn record_activity(&self) {
        let now = self.shared.clock.now();
        self.shared.controller.lock().await.record_activity(now);
    }

    pub async fn state(&self) -> SessionState {
        self.shared.controller.lock().await.state()
    }

    pub async fn token(&self) -> Option<String> {
        self.shared
            .controller
            .lock()
            .await
            .credentials()
            .map(|creds| creds.token.clone())
    }

    pub async fn message(&self) -> Option<String> {
        self.shared
            .controller
            .lock()
            .await
            .message()
            .map(str::to_string)
    }

    /// Stop polling and wait for the task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!("Session poll task failed: {err}");
            }
        }
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver").finish_non_exhaustive()
    }
}
