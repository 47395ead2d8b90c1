//! Router-level tests for the admin session endpoints and the guard.

use super::{AuthConfig, AuthService};
use crate::{
    api::{handlers::settings::SettingsGate, router},
    clock::{Clock, ManualClock},
    store::{MemoryStore, SessionStore, Stores},
};
use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header::AUTHORIZATION, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceExt;

const PASSWORD: &str = "let-me-in";
const ADMIN_SECRET: &str = "settings-secret";
const PEER_IP: [u8; 4] = [203, 0, 113, 7];
const FORWARDED_IP: &str = "198.51.100.99";

struct TestApp {
    app: Router,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(AuthConfig::new(SecretString::from(PASSWORD.to_string())))
    }

    fn with_config(config: AuthConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let auth = AuthService::new(
            config,
            store.clone(),
            store.clone(),
        )
        .with_clock(clock.clone());
        let app = router(
            Arc::new(auth),
            Stores::from_backend(store.clone()),
            SettingsGate::new(Some(SecretString::from(ADMIN_SECRET.to_string()))),
        );
        Self { app, clock, store }
    }

    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("response is not JSON")?
        };
        Ok((status, body))
    }

    async fn login(&self) -> Result<String> {
        let (status, body) = self
            .send(json_request("POST", "/admin/login", &json!({ "password": PASSWORD }))?)
            .await?;
        assert_eq!(status, StatusCode::OK);
        body["token"]
            .as_str()
            .map(str::to_string)
            .context("missing token")
    }
}

/// JSON request from `PEER_IP` that also claims `FORWARDED_IP` in a proxy header.
fn json_request(method: &str, uri: &str, body: &Value) -> Result<Request<Body>> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", FORWARDED_IP)
        .body(Body::from(serde_json::to_vec(body)?))?;
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((PEER_IP, 51_000))));
    Ok(request)
}

fn settings_put(body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("PUT")
        .uri("/admin/settings")
        .header("content-type", "application/json")
        .header("x-admin-token", ADMIN_SECRET)
        .body(Body::from(serde_json::to_vec(body)?))?)
}

fn bearer_request(method: &str, uri: &str, token: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())?)
}

#[tokio::test]
async fn login_returns_token_payload() -> Result<()> {
    let test = TestApp::new();
    let (status, body) = test
        .send(json_request(
            "POST",
            "/admin/login",
            &json!({ "password": PASSWORD }),
        )?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expiresIn"], 900);
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["expiresAt"].as_str().is_some());
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_401() -> Result<()> {
    let test = TestApp::new();
    let (status, body) = test
        .send(json_request(
            "POST",
            "/admin/login",
            &json!({ "password": "guess" }),
        )?)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
    assert_eq!(test.store.session_count(), 0);
    Ok(())
}

#[tokio::test]
async fn logout_twice_returns_ok_both_times() -> Result<()> {
    let test = TestApp::new();
    let token = test.login().await?;

    for _ in 0..2 {
        let (status, body) = test
            .send(bearer_request("POST", "/admin/logout", &token)?)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    let (status, _) = test
        .send(bearer_request("POST", "/admin/refresh-token", &token)?)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_without_bearer_is_401() -> Result<()> {
    let test = TestApp::new();
    let (status, _) = test
        .send(
            Request::builder()
                .method("POST")
                .uri("/admin/logout")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn guard_rejects_missing_and_unknown_tokens() -> Result<()> {
    let test = TestApp::new();
    let (status, _) = test
        .send(Request::get("/admin/logs").body(Body::empty())?)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = test
        .send(bearer_request("GET", "/admin/logs", "not-a-session")?)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn guard_bumps_last_activity() -> Result<()> {
    let test = TestApp::new();
    let token = test.login().await?;

    test.clock.advance(Duration::minutes(3));
    let (status, _) = test
        .send(bearer_request("GET", "/admin/logs", &token)?)
        .await?;
    assert_eq!(status, StatusCode::OK);

    let session = test
        .store
        .find_session(&super::utils::hash_session_token(&token))
        .await?
        .context("session missing")?;
    assert_eq!(session.last_activity, test.clock.now());
    assert_eq!(session.expires_at, session.issued_at + Duration::minutes(15));
    Ok(())
}

#[tokio::test]
async fn audit_logs_summarise_outcomes() -> Result<()> {
    let test = TestApp::new();
    let (status, _) = test
        .send(json_request(
            "POST",
            "/admin/login",
            &json!({ "password": "nope" }),
        )?)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let token = test.login().await?;

    let (status, body) = test
        .send(bearer_request("GET", "/admin/logs?type=audit&days=1", &token)?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "audit");
    assert_eq!(body["days"], 1);
    assert_eq!(body["total"], 2);
    assert_eq!(body["successes"], 1);
    assert_eq!(body["failures"], 1);
    assert_eq!(body["logs"][1]["reason"], "wrong_password");
    assert_eq!(body["logs"][1]["ip"], "203.0.113.7");
    Ok(())
}

#[tokio::test]
async fn proxy_headers_name_the_client_only_when_trusted() -> Result<()> {
    let test = TestApp::with_config(
        AuthConfig::new(SecretString::from(PASSWORD.to_string())).with_trust_proxy_headers(true),
    );
    let (status, _) = test
        .send(json_request(
            "POST",
            "/admin/login",
            &json!({ "password": "nope" }),
        )?)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let token = test.login().await?;

    let (_, body) = test
        .send(bearer_request("GET", "/admin/logs?type=audit&days=1", &token)?)
        .await?;
    assert_eq!(body["logs"][1]["ip"], FORWARDED_IP);
    Ok(())
}

#[tokio::test]
async fn analytics_events_are_public_but_restricted() -> Result<()> {
    let test = TestApp::new();
    let (status, body) = test
        .send(json_request(
            "POST",
            "/admin/logs",
            &json!({ "event_type": "fetch_repos", "event_data": { "count": 4 } }),
        )?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, body) = test
        .send(json_request(
            "POST",
            "/admin/logs",
            &json!({ "event_type": "settings_update" }),
        )?)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid event_type");

    let token = test.login().await?;
    let (status, body) = test
        .send(bearer_request("GET", "/admin/logs?type=analytics", &token)?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["events"]["fetch_repos"], 1);
    assert_eq!(body["logs"][0]["event_data"]["count"], 4);

    let (status, _) = test
        .send(bearer_request("GET", "/admin/logs?type=secrets", &token)?)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn settings_require_shared_secret_not_session() -> Result<()> {
    let test = TestApp::new();
    let token = test.login().await?;

    let (status, _) = test
        .send(bearer_request("GET", "/admin/settings", &token)?)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = test
        .send(settings_put(
            &json!({ "github_username": "octocat", "max_repos": 6 }),
        )?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["github_username"], "octocat");
    assert!(body["updated_at"].is_string());

    let read = Request::get("/admin/settings")
        .header("x-admin-token", ADMIN_SECRET)
        .body(Body::empty())?;
    let (status, body) = test.send(read).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["max_repos"], 6);
    Ok(())
}

#[tokio::test]
async fn settings_update_keeps_fields_it_does_not_name() -> Result<()> {
    let test = TestApp::new();
    let (status, _) = test
        .send(settings_put(
            &json!({ "github_username": "octocat", "bio_override": "hi" }),
        )?)
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = test.send(settings_put(&json!({ "max_repos": 10 }))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["github_username"], "octocat");
    assert_eq!(body["bio_override"], "hi");
    assert_eq!(body["max_repos"], 10);

    let read = Request::get("/admin/settings")
        .header("x-admin-token", ADMIN_SECRET)
        .body(Body::empty())?;
    let (_, body) = test.send(read).await?;
    assert_eq!(body["github_username"], "octocat");
    assert_eq!(body["bio_override"], "hi");
    assert_eq!(body["max_repos"], 10);
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let test = TestApp::new();
    let (status, body) = test
        .send(Request::get("/api-docs/openapi.json").body(Body::empty())?)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/admin/login"].is_object());
    Ok(())
}
