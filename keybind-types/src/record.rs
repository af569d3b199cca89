//! Activation records.
//!
//! A record is created unbound at issuance and bound exactly once, at its
//! first successful verification. The three activation fields (device,
//! activation time, expiry) only ever exist together, so they live in a
//! single optional [`Binding`].

use crate::{DeviceId, LicenseKey, LicenseType, Timestamp};
use serde::{Deserialize, Serialize};

/// The (device, activation time, expiry) triple fixed at activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub device_id: DeviceId,
    pub activated_at: Timestamp,
    pub expires_at: Timestamp,
}

/// One issued license key and its activation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub key: LicenseKey,
    pub license_type: LicenseType,
    pub binding: Option<Binding>,
}

/// State of a record as observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Issued, never verified.
    Unbound,
    /// Bound and `now <= expires_at`.
    Active,
    /// Bound and `now > expires_at`.
    Expired,
}

impl ActivationRecord {
    /// Creates a freshly issued, unbound record.
    #[must_use]
    pub fn issued(key: LicenseKey, license_type: LicenseType) -> Self {
        Self {
            key,
            license_type,
            binding: None,
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Classifies the record at `now`. Expiry is exclusive: a record whose
    /// `expires_at` equals `now` is still active.
    #[must_use]
    pub fn state(&self, now: Timestamp) -> RecordState {
        match &self.binding {
            None => RecordState::Unbound,
            Some(b) if now > b.expires_at => RecordState::Expired,
            Some(_) => RecordState::Active,
        }
    }

    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.state(now) == RecordState::Active
    }

    #[must_use]
    pub fn device_id(&self) -> Option<&DeviceId> {
        self.binding.as_ref().map(|b| &b.device_id)
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.binding.as_ref().map(|b| b.expires_at)
    }
}
