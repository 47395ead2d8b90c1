//! Append-only audit trail for admin security events.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

use crate::{
    clock::Clock,
    store::{AuditAction, AuditEntry, AuditReason, LogStore, NewAuditEntry},
};

/// Upper bound on rows returned by a single listing.
const LIST_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct AuditLog {
    logs: Arc<dyn LogStore>,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    #[must_use]
    pub fn new(logs: Arc<dyn LogStore>, clock: Arc<dyn Clock>) -> Self {
        Self { logs, clock }
    }

    /// Record an event. Write failures are logged and never reach the caller.
    pub async fn record(
        &self,
        action: AuditAction,
        success: bool,
        reason: Option<AuditReason>,
        details: Value,
        ip: Option<&str>,
    ) {
        let entry = NewAuditEntry {
            action,
            success,
            reason,
            details,
            ip: ip.map(str::to_string),
            created_at: self.clock.now(),
        };
        if let Err(err) = self.logs.insert_audit(entry).await {
            error!(
                action = action.as_str(),
                success, "Failed to write audit entry: {err:#}"
            );
        }
    }

    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn list(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<AuditEntry>> {
        self.logs.list_audit(since, LIST_LIMIT).await
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        store::{ActivityEntry, MemoryStore, NewActivity},
    };
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Duration;

    struct BrokenLogStore;

    #[async_trait]
    impl LogStore for BrokenLogStore {
        async fn insert_audit(&self, _entry: NewAuditEntry) -> Result<()> {
            Err(anyhow!("store offline"))
        }

        async fn list_audit(&self, _since: DateTime<Utc>, _limit: i64) -> Result<Vec<AuditEntry>> {
            Err(anyhow!("store offline"))
        }

        async fn insert_activity(&self, _entry: NewActivity) -> Result<()> {
            Err(anyhow!("store offline"))
        }

        async fn list_activity(
            &self,
            _since: DateTime<Utc>,
            _limit: i64,
        ) -> Result<Vec<ActivityEntry>> {
            Err(anyhow!("store offline"))
        }
    }

    #[tokio::test]
    async fn record_stamps_entry_from_clock() -> Result<()> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new());
        let audit = AuditLog::new(store.clone(), clock.clone());

        audit
            .record(
                AuditAction::Login,
                false,
                Some(AuditReason::InvalidCaptcha),
                serde_json::json!({}),
                Some("10.0.0.1"),
            )
            .await;

        let entries = audit.list(clock.now() - Duration::days(1)).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].created_at, clock.now());
        assert_eq!(entries[0].reason.as_deref(), Some("invalid_captcha"));
        assert_eq!(entries[0].ip.as_deref(), Some("10.0.0.1"));
        Ok(())
    }

    #[tokio::test]
    async fn write_failures_are_swallowed() {
        let audit = AuditLog::new(
            Arc::new(BrokenLogStore),
            Arc::new(ManualClock::new(Utc::now())),
        );
        audit
            .record(
                AuditAction::Logout,
                true,
                None,
                serde_json::Value::Null,
                None,
            )
            .await;
        assert!(audit.list(Utc::now()).await.is_err());
    }
}
