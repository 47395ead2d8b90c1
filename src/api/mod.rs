use crate::{
    api::handlers::{
        auth::{self, AuthService},
        health, logs, root,
        settings::{self, SettingsGate},
    },
    store::Stores,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::{get, post},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
pub mod notify;
mod openapi;

pub use openapi::openapi;

/// Build the application router with every route and its shared state.
///
/// Transport layers (CORS, request ids, tracing) are added by [`new`].
#[must_use]
pub fn router(auth: Arc<AuthService>, stores: Stores, gate: SettingsGate) -> Router {
    let guarded = Router::new()
        .route("/admin/logs", get(logs::list_logs))
        .route_layer(middleware::from_fn(auth::require_session));

    Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health))
        .route("/admin/login", post(auth::session::login))
        .route("/admin/refresh-token", post(auth::session::refresh_token))
        .route("/admin/logout", post(auth::session::logout))
        .route("/admin/logs", post(logs::record_event))
        .route(
            "/admin/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .merge(guarded)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(Extension(auth))
        .layer(Extension(stores))
        .layer(Extension(gate))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    frontend_base_url: Option<&str>,
    auth: Arc<AuthService>,
    stores: Stores,
    gate: SettingsGate,
) -> Result<()> {
    let cors = CorsLayer::new()
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(settings::ADMIN_TOKEN_HEADER),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT]);
    let cors = match frontend_base_url {
        Some(url) => cors.allow_origin(AllowOrigin::exact(frontend_origin(url)?)),
        None => cors.allow_origin(Any),
    };

    let app = router(auth, stores, gate).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
