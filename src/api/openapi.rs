use super::handlers::{auth, health, logs, settings};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::session::login,
        auth::session::refresh_token,
        auth::session::logout,
        logs::list_logs,
        logs::record_event,
        settings::get_settings,
        settings::update_settings,
    ),
    components(
        schemas(
            health::Health,
            auth::types::LoginRequest,
            auth::types::TokenResponse,
            auth::types::OkResponse,
            auth::ErrorBody,
            logs::LogsResponse,
            logs::EventRequest,
            settings::SettingsUpdate,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness and build information"),
        (name = "auth", description = "Admin login and session lifecycle"),
        (name = "logs", description = "Audit and analytics logs"),
        (name = "settings", description = "Portfolio settings"),
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
            components.add_security_scheme(
                "admin_token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    settings::ADMIN_TOKEN_HEADER,
                ))),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc
}
