//! Login notifications.
//!
//! Delivery is fire-and-forget: messages are sent from a spawned task and a
//! failure is only logged. `LogNotifier` is used when no email API is
//! configured.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, Instrument};

use crate::APP_USER_AGENT;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotifyMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message or return an error describing why it failed.
    async fn send(&self, message: &NotifyMessage) -> Result<()>;
}

/// Local dev notifier that logs the message instead of sending it.
#[derive(Clone, Debug)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &NotifyMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "notification send stub"
        );
        Ok(())
    }
}

/// Posts `{from, to, subject, html}` to an HTTP email API.
#[derive(Debug)]
pub struct HttpNotifier {
    url: String,
    api_key: SecretString,
    client: Client,
}

impl HttpNotifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: String, api_key: SecretString) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build notification client")?;
        Ok(Self {
            url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, message: &NotifyMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(message)
            .send()
            .await
            .context("failed to reach notification API")?;
        response
            .error_for_status()
            .context("notification API rejected message")?;
        Ok(())
    }
}

/// Sender plus addressing for admin login alerts.
#[derive(Clone)]
pub struct LoginAlerts {
    notifier: Arc<dyn Notifier>,
    from: String,
    to: String,
}

impl LoginAlerts {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, from: String, to: String) -> Self {
        Self { notifier, from, to }
    }

    /// Alerts that only log.
    #[must_use]
    pub fn log_only() -> Self {
        Self::new(
            Arc::new(LogNotifier),
            "admin@localhost".to_string(),
            "admin@localhost".to_string(),
        )
    }

    /// Queue an alert for a login attempt without waiting for delivery.
    pub fn login_attempt(
        &self,
        success: bool,
        ip: Option<&str>,
        user_agent: Option<&str>,
        at: DateTime<Utc>,
    ) {
        let message = self.login_message(success, ip, user_agent, at);
        spawn_notification(self.notifier.clone(), message);
    }

    pub(crate) fn login_message(
        &self,
        success: bool,
        ip: Option<&str>,
        user_agent: Option<&str>,
        at: DateTime<Utc>,
    ) -> NotifyMessage {
        let (subject, headline) = if success {
            ("Admin login successful", "Successful admin login")
        } else {
            ("Failed admin login attempt", "Failed admin login attempt")
        };
        let html = format!(
            "<h2>{headline}</h2>\
             <p><strong>Time:</strong> {time}</p>\
             <p><strong>IP:</strong> {ip}</p>\
             <p><strong>User agent:</strong> {agent}</p>",
            time = at.to_rfc3339(),
            ip = escape_html(ip.unwrap_or("unknown")),
            agent = escape_html(user_agent.unwrap_or("unknown")),
        );
        NotifyMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: subject.to_string(),
            html,
        }
    }
}

impl std::fmt::Debug for LoginAlerts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAlerts")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

pub fn spawn_notification(notifier: Arc<dyn Notifier>, message: NotifyMessage) {
    let span = tracing::info_span!("notify.send", subject = %message.subject);
    tokio::spawn(
        async move {
            if let Err(err) = notifier.send(&message).await {
                error!("Failed to send notification: {err:#}");
            }
        }
        .instrument(span),
    );
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
