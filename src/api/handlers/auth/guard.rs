//! Bearer-token guard for admin routes.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::{error::AuthError, service::AuthService, utils::extract_bearer_token};

/// The validated session, available to handlers behind the guard.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub client_ip: Option<String>,
}

/// Rejects the request with 401 unless it carries a valid session token.
pub async fn require_session(
    Extension(auth): Extension<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(request.headers()) else {
        return AuthError::Unauthorized("Missing bearer token".to_string()).into_response();
    };

    match auth.validate(&token).await {
        Ok(session) => {
            request.extensions_mut().insert(SessionContext {
                session_id: session.id,
                expires_at: session.expires_at,
                client_ip: session.client_ip,
            });
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
