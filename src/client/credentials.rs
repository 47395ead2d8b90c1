//! Client-side persistence for the current session token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use super::ClientError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredCredentials {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub trait CredentialStore: Send + Sync {
    /// # Errors
    /// Returns `ClientError::Storage` if stored data cannot be read.
    fn load(&self) -> Result<Option<StoredCredentials>, ClientError>;

    /// # Errors
    /// Returns `ClientError::Storage` if the credentials cannot be written.
    fn save(&self, credentials: &StoredCredentials) -> Result<(), ClientError>;

    /// # Errors
    /// Returns `ClientError::Storage` if the credentials cannot be removed.
    fn clear(&self) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    current: Mutex<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_credentials(credentials: StoredCredentials) -> Self {
        Self {
            current: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>, ClientError> {
        Ok(self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), ClientError> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Stores credentials as a small JSON file.
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>, ClientError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ClientError::Storage(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| ClientError::Storage(format!("invalid credentials file: {err}")))
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), ClientError> {
        let raw = serde_json::to_vec_pretty(credentials)
            .map_err(|err| ClientError::Storage(err.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|err| {
            ClientError::Storage(format!("failed to write {}: {err}", self.path.display()))
        })
    }

    fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ClientError::Storage(format!(
                "failed to remove {}: {err}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> StoredCredentials {
        StoredCredentials {
            token: "tok".to_string(),
            expires_at: Utc::now() + Duration::minutes(15),
        }
    }

    #[test]
    fn expiry_is_exclusive_of_the_instant() {
        let creds = sample();
        assert!(!creds.is_expired_at(creds.expires_at - Duration::seconds(1)));
        assert!(creds.is_expired_at(creds.expires_at));
    }

    #[test]
    fn memory_store_round_trip() -> Result<(), ClientError> {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.load()?, None);
        store.save(&sample())?;
        assert!(store.load()?.is_some());
        store.clear()?;
        assert_eq!(store.load()?, None);
        Ok(())
    }

    #[test]
    fn file_store_missing_file_is_empty() -> Result<(), ClientError> {
        let path = std::env::temp_dir().join(format!("folio-creds-{}.json", uuid::Uuid::new_v4()));
        let store = FileCredentialStore::new(path.clone());
        assert_eq!(store.load()?, None);

        let creds = sample();
        store.save(&creds)?;
        assert_eq!(store.load()?, Some(creds));

        store.clear()?;
        store.clear()?;
        assert!(!path.exists());
        Ok(())
    }
}
