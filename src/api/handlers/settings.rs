//! Portfolio settings, guarded by the shared `x-admin-token` secret.

use axum::{extract::Extension, http::HeaderMap, response::Json};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use super::auth::{utils::secrets_match, AuthError, AuthService, ErrorBody};
use crate::store::{AdminSettings, NewActivity, Stores};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
const MAX_REPOS_LIMIT: i32 = 100;

/// Holds the shared secret for the settings endpoints. Without one every
/// request is rejected.
#[derive(Clone, Debug, Default)]
pub struct SettingsGate {
    secret: Option<SecretString>,
}

impl SettingsGate {
    #[must_use]
    pub fn new(secret: Option<SecretString>) -> Self {
        Self {
            secret: secret.filter(|secret| !secret.expose_secret().is_empty()),
        }
    }

    fn check(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let Some(expected) = &self.secret else {
            return Err(AuthError::unauthorized());
        };
        let supplied = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if secrets_match(supplied, expected.expose_secret()) {
            Ok(())
        } else {
            Err(AuthError::unauthorized())
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SettingsUpdate {
    pub github_username: Option<String>,
    pub repo_filter: Option<String>,
    pub max_repos: Option<i32>,
    pub bio_override: Option<String>,
}

fn validate_update(update: &SettingsUpdate) -> Result<(), AuthError> {
    if let Some(username) = update.github_username.as_deref() {
        let valid = Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,38})$")
            .is_ok_and(|re| re.is_match(username));
        if !valid {
            return Err(AuthError::Validation("Invalid github_username".to_string()));
        }
    }
    if let Some(max_repos) = update.max_repos {
        if !(1..=MAX_REPOS_LIMIT).contains(&max_repos) {
            return Err(AuthError::Validation(format!(
                "max_repos must be between 1 and {MAX_REPOS_LIMIT}"
            )));
        }
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/admin/settings",
    responses(
        (status = 200, description = "Current settings", body = AdminSettings),
        (status = 401, description = "Missing or wrong admin token", body = ErrorBody)
    ),
    security(("admin_token" = [])),
    tag = "settings"
)]
pub async fn get_settings(
    headers: HeaderMap,
    gate: Extension<SettingsGate>,
    stores: Extension<Stores>,
) -> Result<Json<AdminSettings>, AuthError> {
    gate.check(&headers)?;
    let settings = stores.settings.load_settings().await?;
    Ok(Json(settings))
}

#[utoipa::path(
    put,
    path = "/admin/settings",
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Settings saved", body = AdminSettings),
        (status = 400, description = "Invalid settings", body = ErrorBody),
        (status = 401, description = "Missing or wrong admin token", body = ErrorBody)
    ),
    security(("admin_token" = [])),
    tag = "settings"
)]
pub async fn update_settings(
    headers: HeaderMap,
    gate: Extension<SettingsGate>,
    stores: Extension<Stores>,
    auth: Extension<Arc<AuthService>>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<AdminSettings>, AuthError> {
    gate.check(&headers)?;
    validate_update(&update)?;

    let now = auth.clock().now();
    // Fields left out of the body keep their stored value.
    let current = stores.settings.load_settings().await?;
    let saved = stores
        .settings
        .save_settings(AdminSettings {
            github_username: update.github_username.or(current.github_username),
            repo_filter: update.repo_filter.or(current.repo_filter),
            max_repos: update.max_repos.or(current.max_repos),
            bio_override: update.bio_override.or(current.bio_override),
            updated_at: Some(now),
        })
        .await?;
    info!("Admin settings updated");

    let activity = NewActivity {
        event_type: "settings_update".to_string(),
        event_data: json!({
            "github_username": saved.github_username,
            "repo_filter": saved.repo_filter,
            "max_repos": saved.max_repos,
            "bio_override": saved.bio_override.is_some(),
        }),
        error_message: None,
        created_at: now,
    };
    if let Err(err) = stores.logs.insert_activity(activity).await {
        error!("Failed to record settings update: {err:#}");
    }

    Ok(Json(saved))
}
