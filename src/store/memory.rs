//! In-process store used for local development and tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{
    ActivityEntry, AdminSettings, AuditEntry, HealthCheck, LogStore, NewActivity, NewAuditEntry,
    NewSession, Session, SessionStore, SettingsStore,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<Vec<Session>>,
    audit: Mutex<Vec<AuditEntry>>,
    activity: Mutex<Vec<ActivityEntry>>,
    settings: Mutex<AdminSettings>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored session rows, active or not.
    #[must_use]
    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn newest_since<T: Clone>(
    rows: &[T],
    since: DateTime<Utc>,
    limit: i64,
    created_at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let limit = usize::try_from(limit).unwrap_or(0);
    rows.iter()
        .rev()
        .filter(|row| created_at(row) >= since)
        .take(limit)
        .cloned()
        .collect()
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: NewSession) -> Result<Session> {
        let record = Session {
            id: Uuid::new_v4(),
            token_hash: session.token_hash,
            issued_at: session.issued_at,
            expires_at: session.expires_at,
            last_activity: session.issued_at,
            client_ip: session.client_ip,
            user_agent: session.user_agent,
            is_active: true,
        };
        lock(&self.sessions).push(record.clone());
        Ok(record)
    }

    async fn find_session(&self, token_hash: &[u8]) -> Result<Option<Session>> {
        Ok(lock(&self.sessions)
            .iter()
            .find(|session| session.token_hash == token_hash)
            .cloned())
    }

    async fn touch_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(session) = lock(&self.sessions).iter_mut().find(|s| s.id == id) {
            session.last_activity = at;
        }
        Ok(())
    }

    async fn deactivate_session(&self, id: Uuid) -> Result<bool> {
        let mut sessions = lock(&self.sessions);
        let Some(session) = sessions.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        let was_active = session.is_active;
        session.is_active = false;
        Ok(was_active)
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn insert_audit(&self, entry: NewAuditEntry) -> Result<()> {
        lock(&self.audit).push(AuditEntry {
            id: Uuid::new_v4(),
            action: entry.action,
            success: entry.success,
            reason: entry.reason.map(|reason| reason.as_str().to_string()),
            details: entry.details,
            ip: entry.ip,
            created_at: entry.created_at,
        });
        Ok(())
    }

    async fn list_audit(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<AuditEntry>> {
        Ok(newest_since(&lock(&self.audit), since, limit, |e| e.created_at))
    }

    async fn insert_activity(&self, entry: NewActivity) -> Result<()> {
        lock(&self.activity).push(ActivityEntry {
            id: Uuid::new_v4(),
            event_type: entry.event_type,
            event_data: entry.event_data,
            error_message: entry.error_message,
            created_at: entry.created_at,
        });
        Ok(())
    }

    async fn list_activity(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<ActivityEntry>> {
        Ok(newest_since(&lock(&self.activity), since, limit, |e| e.created_at))
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load_settings(&self) -> Result<AdminSettings> {
        Ok(lock(&self.settings).clone())
    }

    async fn save_settings(&self, settings: AdminSettings) -> Result<AdminSettings> {
        let mut current = lock(&self.settings);
        *current = settings;
        Ok(current.clone())
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
