use chrono::{DateTime, Local, Utc};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server returned {status}: {}", message.as_deref().unwrap_or("no details"))]
    Http {
        status: u16,
        message: Option<String>,
        reset_time: Option<DateTime<Utc>>,
    },
    #[error("unexpected response: {0}")]
    Parse(String),
    #[error("credential storage error: {0}")]
    Storage(String),
    #[error("a login is already in progress")]
    LoginInProgress,
}

impl ClientError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Message shown to the user after a failed login.
#[must_use]
pub fn login_error_message(err: &ClientError) -> String {
    match err {
        ClientError::Http {
            status: 429,
            reset_time,
            ..
        } => match reset_time {
            Some(reset) => format!(
                "Too many attempts. Try again at {}",
                reset.with_timezone(&Local).format("%H:%M:%S")
            ),
            None => "Too many attempts. Try again later".to_string(),
        },
        ClientError::Http {
            message: Some(message),
            ..
        } => message.clone(),
        _ => "Login failed".to_string(),
    }
}
