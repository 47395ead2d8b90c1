//! Audit and analytics log endpoints.
//!
//! Reading is restricted to authenticated admin sessions. Posting analytics
//! events is public but limited to a fixed set of event types.

use axum::{
    extract::{Extension, Query},
    response::Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use utoipa::{IntoParams, ToSchema};

use super::auth::{types::OkResponse, AuthError, AuthService, ErrorBody, SessionContext};
use crate::store::{ActivityEntry, AuditEntry, NewActivity, Stores};

pub const DEFAULT_DAYS: i64 = 7;
pub const MAX_DAYS: i64 = 90;
const ANALYTICS_LIMIT: i64 = 100;

/// Event types the public endpoint accepts.
pub const PUBLIC_EVENT_TYPES: [&str; 3] = ["fetch_profile", "fetch_repos", "error"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    #[default]
    Audit,
    Analytics,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogsQuery {
    /// `audit` (default) or `analytics`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Look-back window in days, 1 to 90 (default 7).
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum LogEntries {
    Audit(Vec<AuditEntry>),
    Analytics(Vec<ActivityEntry>),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogsResponse {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub days: i64,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<usize>,
    /// Event counts by type (analytics only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<BTreeMap<String, usize>>,
    pub logs: LogEntries,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EventRequest {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub event_data: serde_json::Value,
    pub error_message: Option<String>,
}

fn parse_kind(kind: Option<&str>) -> Result<LogKind, AuthError> {
    match kind {
        None | Some("audit") => Ok(LogKind::Audit),
        Some("analytics") => Ok(LogKind::Analytics),
        Some(other) => Err(AuthError::Validation(format!("Invalid log type: {other}"))),
    }
}

#[utoipa::path(
    get,
    path = "/admin/logs",
    params(LogsQuery),
    responses(
        (status = 200, description = "Log entries for the window, newest first", body = LogsResponse),
        (status = 400, description = "Unknown log type", body = ErrorBody),
        (status = 401, description = "Missing, invalid or expired session", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "logs"
)]
pub async fn list_logs(
    Extension(_session): Extension<SessionContext>,
    auth: Extension<Arc<AuthService>>,
    stores: Extension<Stores>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, AuthError> {
    let kind = parse_kind(query.kind.as_deref())?;
    let days = query.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS);
    let since = auth.clock().now() - Duration::days(days);

    let response = match kind {
        LogKind::Audit => {
            let entries = auth.audit().list(since).await?;
            let successes = entries.iter().filter(|entry| entry.success).count();
            LogsResponse {
                kind,
                days,
                total: entries.len(),
                successes: Some(successes),
                failures: Some(entries.len() - successes),
                events: None,
                logs: LogEntries::Audit(entries),
            }
        }
        LogKind::Analytics => {
            let entries = stores.logs.list_activity(since, ANALYTICS_LIMIT).await?;
            let mut events = BTreeMap::new();
            for entry in &entries {
                *events.entry(entry.event_type.clone()).or_insert(0) += 1;
            }
            LogsResponse {
                kind,
                days,
                total: entries.len(),
                successes: None,
                failures: None,
                events: Some(events),
                logs: LogEntries::Analytics(entries),
            }
        }
    };

    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/admin/logs",
    request_body = EventRequest,
    responses(
        (status = 200, description = "Event recorded", body = OkResponse),
        (status = 400, description = "Event type not accepted", body = ErrorBody)
    ),
    tag = "logs"
)]
pub async fn record_event(
    auth: Extension<Arc<AuthService>>,
    stores: Extension<Stores>,
    Json(request): Json<EventRequest>,
) -> Result<Json<OkResponse>, AuthError> {
    if !PUBLIC_EVENT_TYPES.contains(&request.event_type.as_str()) {
        return Err(AuthError::Validation("Invalid event_type".to_string()));
    }

    stores
        .logs
        .insert_activity(NewActivity {
            event_type: request.event_type,
            event_data: request.event_data,
            error_message: request.error_message,
            created_at: auth.clock().now(),
        })
        .await?;

    Ok(Json(OkResponse::ok()))
}
