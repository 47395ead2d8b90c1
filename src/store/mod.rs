//! Record store for sessions, logs and admin settings.
//!
//! The service talks to its relational backend through the traits in this
//! module. `PgStore` is the production implementation (Postgres, the engine
//! behind Supabase); `MemoryStore` keeps everything in process memory and is
//! used for local development and tests.
//!
//! Rows are never physically deleted: sessions are deactivated, audit and
//! activity entries are append-only.

mod memory;
mod models;
mod postgres;

pub use memory::MemoryStore;
pub use models::{
    ActivityEntry, AdminSettings, AuditAction, AuditEntry, AuditReason, NewActivity,
    NewAuditEntry, NewSession, Session,
};
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: NewSession) -> Result<Session>;

    /// Look up a session by token hash, active or not.
    async fn find_session(&self, token_hash: &[u8]) -> Result<Option<Session>>;

    async fn touch_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Mark a session inactive. Returns `true` when the row was active before.
    async fn deactivate_session(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn insert_audit(&self, entry: NewAuditEntry) -> Result<()>;

    /// Audit entries created at or after `since`, newest first.
    async fn list_audit(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<AuditEntry>>;

    async fn insert_activity(&self, entry: NewActivity) -> Result<()>;

    /// Activity entries created at or after `since`, newest first.
    async fn list_activity(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<ActivityEntry>>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_settings(&self) -> Result<AdminSettings>;

    async fn save_settings(&self, settings: AdminSettings) -> Result<AdminSettings>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// Handles to every store concern, usually backed by the same value.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub logs: Arc<dyn LogStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub health: Arc<dyn HealthCheck>,
}

impl Stores {
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: SessionStore + LogStore + SettingsStore + HealthCheck + 'static,
    {
        Self {
            sessions: backend.clone(),
            logs: backend.clone(),
            settings: backend.clone(),
            health: backend,
        }
    }

    #[must_use]
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
