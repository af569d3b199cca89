//! Operator-side key administration.
//!
//! Works on the key store directly and never goes through the verification
//! path. Who may call it is decided by the deployment (the HTTP surface
//! gates it behind an operator token).

use crate::engine::sweep_expired;
use crate::error::{LicenseError, LicenseResult};
use keybind_storage::{CreateOutcome, DeleteOutcome, KeyStore};
use keybind_types::{ActivationRecord, DurationTable, LicenseKey, LicenseType, Timestamp};
use std::sync::Arc;
use tracing::{debug, info};

/// Issues, revokes and lists license keys.
pub struct AdminRegistry {
    store: Arc<dyn KeyStore>,
    durations: Arc<DurationTable>,
}

impl AdminRegistry {
    pub fn new(store: Arc<dyn KeyStore>, durations: Arc<DurationTable>) -> Self {
        Self { store, durations }
    }

    /// Creates an unbound record for `key`.
    ///
    /// # Errors
    ///
    /// [`LicenseError::UnknownLicenseType`] if the type has no duration, and
    /// [`LicenseError::AlreadyExists`] if the key is already present.
    pub async fn issue(&self, key: &LicenseKey, license_type: &LicenseType) -> LicenseResult<()> {
        if !self.durations.contains(license_type) {
            return Err(LicenseError::UnknownLicenseType(license_type.to_string()));
        }
        match self.store.create(key, license_type).await? {
            CreateOutcome::Created => {
                info!(key = %key, license_type = %license_type, "issued key");
                Ok(())
            }
            CreateOutcome::AlreadyExists => Err(LicenseError::AlreadyExists(key.to_string())),
        }
    }

    /// Deletes the record for `key`, bound or not.
    ///
    /// [`LicenseError::NotFound`] is soft: callers may treat it as success.
    pub async fn revoke(&self, key: &LicenseKey) -> LicenseResult<()> {
        match self.store.delete(key).await? {
            DeleteOutcome::Deleted => {
                info!(key = %key, "revoked key");
                Ok(())
            }
            DeleteOutcome::NotFound => {
                debug!(key = %key, "revoke: no such key");
                Err(LicenseError::NotFound(key.to_string()))
            }
        }
    }

    /// Returns all current records after purging those expired at `now`.
    pub async fn list(&self, now: Timestamp) -> LicenseResult<Vec<ActivationRecord>> {
        sweep_expired(self.store.as_ref(), now).await?;
        Ok(self.store.list_all().await?)
    }
}
