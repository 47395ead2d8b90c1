//! Session endpoints: login, token refresh and logout.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::{net::SocketAddr, sync::Arc};

use super::{
    error::{AuthError, ErrorBody},
    service::{AuthService, LoginInput},
    types::{LoginRequest, OkResponse, TokenResponse},
    utils::{client_ip, extract_bearer_token, extract_user_agent},
};

fn request_ip(
    auth: &AuthService,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Option<String> {
    client_ip(
        headers,
        peer.map(|ConnectInfo(addr)| addr),
        auth.config().trust_proxy_headers(),
    )
}

#[utoipa::path(
    post,
    path = "/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = TokenResponse),
        (status = 400, description = "Bot check failed", body = ErrorBody),
        (status = 401, description = "Wrong password", body = ErrorBody),
        (status = 429, description = "Too many attempts", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth: Extension<Arc<AuthService>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let issued = auth
        .login(LoginInput {
            password: request.password,
            captcha_token: request.recaptcha_token,
            client_ip: request_ip(&auth, &headers, peer),
            user_agent: extract_user_agent(&headers),
        })
        .await?;
    Ok(Json(issued.into()))
}

#[utoipa::path(
    post,
    path = "/admin/refresh-token",
    responses(
        (status = 200, description = "Token rotated", body = TokenResponse),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn refresh_token(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth: Extension<Arc<AuthService>>,
) -> Result<Json<TokenResponse>, AuthError> {
    let token = extract_bearer_token(&headers)
        .ok_or_else(|| AuthError::Unauthorized("Missing bearer token".to_string()))?;
    let issued = auth
        .refresh(
            &token,
            request_ip(&auth, &headers, peer),
            extract_user_agent(&headers),
        )
        .await?;
    Ok(Json(issued.into()))
}

#[utoipa::path(
    post,
    path = "/admin/logout",
    responses(
        (status = 200, description = "Session cleared", body = OkResponse),
        (status = 401, description = "No bearer token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth: Extension<Arc<AuthService>>,
) -> Result<impl IntoResponse, AuthError> {
    let token = extract_bearer_token(&headers)
        .ok_or_else(|| AuthError::Unauthorized("Missing bearer token".to_string()))?;
    auth.logout(&token, request_ip(&auth, &headers, peer).as_deref())
        .await?;
    Ok((StatusCode::OK, Json(OkResponse::ok())))
}
