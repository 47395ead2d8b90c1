use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Too many login attempts")]
    RateLimited { reset_at: DateTime<Utc> },
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::Unauthorized("Unauthorized".to_string())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(rename = "resetTime", skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<String>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Validation(message) | Self::Unauthorized(message) => ErrorBody {
                error: message,
                reset_time: None,
            },
            Self::RateLimited { reset_at } => ErrorBody {
                error: "Too many login attempts. Please try again later.".to_string(),
                reset_time: Some(reset_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            },
            Self::Upstream(err) => {
                error!("Internal error: {err:#}");
                ErrorBody {
                    error: "Internal server error".to_string(),
                    reset_time: None,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}
