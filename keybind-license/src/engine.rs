//! The activation state machine.
//!
//! Per key, the engine observes one of four states through the store:
//!
//! | state          | record                               |
//! |----------------|--------------------------------------|
//! | Unknown        | none                                 |
//! | Issued-Unbound | present, no binding                  |
//! | Bound-Active   | bound, `now <= expires_at`           |
//! | Bound-Expired  | bound, `now > expires_at`            |
//!
//! `verify` is the only transition on the hot path. It never writes more
//! than once, and the write it does make is either a conditional bind or a
//! delete, each atomic in the store.

use crate::error::{LicenseError, LicenseResult};
use keybind_storage::{BindOutcome, DeleteOutcome, KeyStore, StorageError};
use keybind_types::{Binding, DeviceId, DurationTable, LicenseKey, Timestamp};
use std::sync::Arc;
use tracing::{debug, info};

/// Domain outcome of a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Bound to the caller and not past expiry.
    Valid { expires_at: Timestamp },
    /// No such key.
    Invalid,
    /// Bound to another device.
    InvalidDevice,
    /// Bound to the caller but past expiry. The record has been removed.
    ///
    /// Reported at most once per key: only the call whose delete removed
    /// the record sees it. If that delete lands but its result is lost (a
    /// storage timeout, say), the caller gets an error and every later
    /// call sees [`Verdict::Invalid`].
    Expired,
}

/// Decides verification outcomes and applies the resulting transitions.
pub struct ActivationEngine {
    store: Arc<dyn KeyStore>,
    durations: Arc<DurationTable>,
}

impl ActivationEngine {
    pub fn new(store: Arc<dyn KeyStore>, durations: Arc<DurationTable>) -> Self {
        Self { store, durations }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.store
    }

    #[must_use]
    pub fn durations(&self) -> &DurationTable {
        &self.durations
    }

    /// Verifies `key` for `device` at time `now`.
    ///
    /// A storage failure at any step aborts with [`LicenseError::Storage`]
    /// and leaves the record exactly as it was before that step.
    pub async fn verify(
        &self,
        key: &LicenseKey,
        device: &DeviceId,
        now: Timestamp,
    ) -> LicenseResult<Verdict> {
        let Some(record) = self.store.get(key).await? else {
            debug!(key = %key, "verify: unknown key");
            return Ok(Verdict::Invalid);
        };

        let binding = match record.binding {
            Some(binding) => binding,
            None => {
                let span = self.durations.get(&record.license_type).ok_or_else(|| {
                    LicenseError::UnknownLicenseType(record.license_type.to_string())
                })?;
                let proposed = Binding {
                    device_id: device.clone(),
                    activated_at: now,
                    expires_at: now.saturating_add(span),
                };

                match self.store.bind_and_activate(key, &proposed).await? {
                    BindOutcome::Bound(bound) => {
                        let expires_at = bound.expires_at().unwrap_or(proposed.expires_at);
                        info!(
                            key = %key,
                            device = %device,
                            license_type = %record.license_type,
                            "activated, expires at {expires_at}"
                        );
                        return Ok(Verdict::Valid { expires_at });
                    }
                    // Someone else activated between our read and our write;
                    // judge the caller against the binding that won.
                    BindOutcome::Conflict(current) => {
                        debug!(key = %key, "lost first-activation race");
                        current.binding.ok_or_else(|| {
                            StorageError::Corrupt(format!("bind conflict on unbound key {key}"))
                        })?
                    }
                    // Revoked between our read and our write.
                    BindOutcome::Missing => return Ok(Verdict::Invalid),
                }
            }
        };

        self.judge_bound(key, &binding, device, now).await
    }

    /// Judges a caller against an existing binding. Device mismatch is
    /// decided first so a foreign device never learns whether the key has
    /// expired.
    async fn judge_bound(
        &self,
        key: &LicenseKey,
        binding: &Binding,
        device: &DeviceId,
        now: Timestamp,
    ) -> LicenseResult<Verdict> {
        if binding.device_id != *device {
            debug!(key = %key, device = %device, "verify: bound to another device");
            return Ok(Verdict::InvalidDevice);
        }

        if now > binding.expires_at {
            return Ok(match self.store.delete(key).await? {
                DeleteOutcome::Deleted => {
                    info!(key = %key, "expired binding removed");
                    Verdict::Expired
                }
                // A concurrent caller already reported the expiry.
                DeleteOutcome::NotFound => Verdict::Invalid,
            });
        }

        debug!(key = %key, "verify: re-verified active binding");
        Ok(Verdict::Valid {
            expires_at: binding.expires_at,
        })
    }

    /// Deletes every binding that is past expiry at `now`.
    pub async fn sweep(&self, now: Timestamp) -> LicenseResult<usize> {
        sweep_expired(self.store.as_ref(), now).await
    }
}

/// Removes all expired records from `store`, returning how many were
/// deleted. Records deleted concurrently by someone else are not counted.
pub async fn sweep_expired(store: &dyn KeyStore, now: Timestamp) -> LicenseResult<usize> {
    let mut removed = 0;
    for record in store.list_all().await? {
        if record.binding.as_ref().is_some_and(|b| now > b.expires_at)
            && store.delete(&record.key).await? == DeleteOutcome::Deleted
        {
            removed += 1;
        }
    }
    if removed > 0 {
        info!(removed, backend = store.backend_name(), "swept expired keys");
    }
    Ok(removed)
}
