//! Postgres-backed store.
//!
//! Each call is an independent statement; there is no transaction spanning a
//! session write and its audit entry.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    ActivityEntry, AdminSettings, AuditAction, AuditEntry, HealthCheck, LogStore, NewActivity,
    NewAuditEntry, NewSession, Session, SessionStore, SettingsStore,
};

/// Idempotent DDL for every table the store touches.
pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create any missing tables and indexes.
    /// # Errors
    /// Returns an error if a DDL statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "CREATE"
        );
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("Failed to apply schema")?;
        Ok(())
    }
}

fn session_from_row(row: &PgRow) -> Session {
    Session {
        id: row.get("id"),
        token_hash: row.get("token_hash"),
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        last_activity: row.get("last_activity"),
        client_ip: row.get("client_ip"),
        user_agent: row.get("user_agent"),
        is_active: row.get("is_active"),
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: NewSession) -> Result<Session> {
        let query = r"
            INSERT INTO admin_sessions
                (token_hash, issued_at, expires_at, last_activity, client_ip, user_agent, is_active)
            VALUES ($1, $2, $3, $2, $4, $5, TRUE)
            RETURNING id, token_hash, issued_at, expires_at, last_activity, client_ip, user_agent, is_active
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&session.token_hash)
            .bind(session.issued_at)
            .bind(session.expires_at)
            .bind(&session.client_ip)
            .bind(&session.user_agent)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert admin session")?;
        Ok(session_from_row(&row))
    }

    async fn find_session(&self, token_hash: &[u8]) -> Result<Option<Session>> {
        let query = r"
            SELECT id, token_hash, issued_at, expires_at, last_activity, client_ip, user_agent, is_active
            FROM admin_sessions
            WHERE token_hash = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup admin session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn touch_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let query = "UPDATE admin_sessions SET last_activity = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update session activity")?;
        Ok(())
    }

    async fn deactivate_session(&self, id: Uuid) -> Result<bool> {
        let query = "UPDATE admin_sessions SET is_active = FALSE WHERE id = $1 AND is_active";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to deactivate admin session")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl LogStore for PgStore {
    async fn insert_audit(&self, entry: NewAuditEntry) -> Result<()> {
        let query = r"
            INSERT INTO audit_logs (action, success, reason, details, ip, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(entry.action.as_str())
            .bind(entry.success)
            .bind(entry.reason.map(|reason| reason.as_str()))
            .bind(&entry.details)
            .bind(&entry.ip)
            .bind(entry.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert audit entry")?;
        Ok(())
    }

    async fn list_audit(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<AuditEntry>> {
        let query = r"
            SELECT id, action, success, reason, details, ip, created_at
            FROM audit_logs
            WHERE created_at >= $1
            ORDER BY created_at DESC
            LIMIT $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list audit entries")?;

        rows.iter()
            .map(|row| {
                let action: String = row.get("action");
                Ok(AuditEntry {
                    id: row.get("id"),
                    action: AuditAction::parse(&action)
                        .with_context(|| format!("unknown audit action: {action}"))?,
                    success: row.get("success"),
                    reason: row.get("reason"),
                    details: row.get("details"),
                    ip: row.get("ip"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn insert_activity(&self, entry: NewActivity) -> Result<()> {
        let query = r"
            INSERT INTO activity_logs (user_id, event_type, event_data, error_message, created_at)
            VALUES (NULL, $1, $2, $3, $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&entry.event_type)
            .bind(&entry.event_data)
            .bind(&entry.error_message)
            .bind(entry.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert activity entry")?;
        Ok(())
    }

    async fn list_activity(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<ActivityEntry>> {
        let query = r"
            SELECT id, event_type, event_data, error_message, created_at
            FROM activity_logs
            WHERE user_id IS NULL AND created_at >= $1
            ORDER BY created_at DESC
            LIMIT $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list activity entries")?;

        Ok(rows
            .iter()
            .map(|row| ActivityEntry {
                id: row.get("id"),
                event_type: row.get("event_type"),
                event_data: row.get("event_data"),
                error_message: row.get("error_message"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn load_settings(&self) -> Result<AdminSettings> {
        let query = r"
            SELECT github_username, repo_filter, max_repos, bio_override, updated_at
            FROM admin_settings
            WHERE id = 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load admin settings")?;

        Ok(row.map_or_else(AdminSettings::default, |row| AdminSettings {
            github_username: row.get("github_username"),
            repo_filter: row.get("repo_filter"),
            max_repos: row.get("max_repos"),
            bio_override: row.get("bio_override"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn save_settings(&self, settings: AdminSettings) -> Result<AdminSettings> {
        let query = r"
            INSERT INTO admin_settings (id, github_username, repo_filter, max_repos, bio_override, updated_at)
            VALUES (1, $1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                github_username = EXCLUDED.github_username,
                repo_filter = EXCLUDED.repo_filter,
                max_repos = EXCLUDED.max_repos,
                bio_override = EXCLUDED.bio_override,
                updated_at = EXCLUDED.updated_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&settings.github_username)
            .bind(&settings.repo_filter)
            .bind(settings.max_repos)
            .bind(&settings.bio_override)
            .bind(settings.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to upsert admin settings")?;
        Ok(settings)
    }
}

#[async_trait]
impl HealthCheck for PgStore {
    async fn ping(&self) -> Result<()> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;

        let ping_span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}

#[cfg(test)]
mod tests {
    use super::PgStore;
    use crate::store::{
        AuditAction, AuditReason, LogStore, NewAuditEntry, NewSession, SessionStore,
        SettingsStore,
    };
    use anyhow::{Context, Result};
    use chrono::{Duration, Utc};
    use sqlx::postgres::PgPoolOptions;

    /// Connects to `FOLIO_TEST_DSN`, or returns `None` so the test is skipped.
    async fn test_store() -> Result<Option<PgStore>> {
        let Ok(dsn) = std::env::var("FOLIO_TEST_DSN") else {
            eprintln!("Skipping Postgres test: FOLIO_TEST_DSN not set");
            return Ok(None);
        };
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&dsn)
            .await
            .context("failed to connect test pool")?;
        let store = PgStore::new(pool);
        store.apply_schema().await?;
        Ok(Some(store))
    }

    #[tokio::test]
    async fn schema_can_be_applied_again() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        // Existing tables and indexes are left in place.
        store.apply_schema().await?;
        store.load_settings().await?;
        Ok(())
    }

    #[tokio::test]
    async fn session_round_trip_and_deactivate() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let now = Utc::now();
        let hash = uuid::Uuid::new_v4().as_bytes().to_vec();
        let session = store
            .insert_session(NewSession {
                token_hash: hash.clone(),
                issued_at: now,
                expires_at: now + Duration::minutes(15),
                client_ip: Some("10.0.0.1".to_string()),
                user_agent: Some("test".to_string()),
            })
            .await?;
        assert!(session.is_active);

        assert!(store.deactivate_session(session.id).await?);
        assert!(!store.deactivate_session(session.id).await?);
        let found = store.find_session(&hash).await?;
        assert!(found.is_some_and(|s| !s.is_active));
        Ok(())
    }

    #[tokio::test]
    async fn audit_entries_are_listed() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let now = Utc::now();
        store
            .insert_audit(NewAuditEntry {
                action: AuditAction::Login,
                success: false,
                reason: Some(AuditReason::WrongPassword),
                details: serde_json::json!({ "source": "pg-test" }),
                ip: Some("10.0.0.2".to_string()),
                created_at: now,
            })
            .await?;
        let entries = store.list_audit(now - Duration::seconds(1), 100).await?;
        assert!(entries
            .iter()
            .any(|e| e.reason.as_deref() == Some("wrong_password")));

        let settings = store.load_settings().await?;
        let saved = store.save_settings(settings.clone()).await?;
        assert_eq!(saved, settings);
        Ok(())
    }
}
