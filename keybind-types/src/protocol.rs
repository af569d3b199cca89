//! JSON wire protocol shared by the authority and its clients.
//!
//! Field names are camelCase on the wire (`deviceId`, `expiresAt`) and
//! timestamps are epoch milliseconds. Request fields are optional at the
//! serde level so that a missing field reaches the service as a malformed
//! request instead of a deserialisation failure.

use crate::{ActivationRecord, Timestamp};
use serde::{Deserialize, Serialize};

/// Body of `POST /verify`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl VerifyRequest {
    pub fn new(key: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            device_id: Some(device_id.into()),
        }
    }
}

/// Outcome kind reported by `POST /verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Valid,
    Invalid,
    InvalidDevice,
    Expired,
    /// Malformed request or server failure; the HTTP status tells which.
    Error,
}

/// Body returned by `POST /verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub status: VerifyStatus,
    /// Present only when `status` is `valid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResponse {
    #[must_use]
    pub fn valid(expires_at: Timestamp) -> Self {
        Self {
            status: VerifyStatus::Valid,
            expires_at: Some(expires_at.as_millis()),
            error: None,
        }
    }

    /// A domain outcome without an expiry (`invalid`, `invalid_device`,
    /// `expired`).
    #[must_use]
    pub fn outcome(status: VerifyStatus) -> Self {
        Self {
            status,
            expires_at: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: VerifyStatus::Error,
            expires_at: None,
            error: Some(message.into()),
        }
    }
}

/// Body of `POST /admin/add-key`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddKeyRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, rename = "type")]
    pub license_type: Option<String>,
}

/// Body of `POST /admin/revoke-key`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeKeyRequest {
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminStatus {
    Added,
    Revoked,
    Error,
}

/// Body returned by the mutating admin endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminResponse {
    pub status: AdminStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AdminResponse {
    pub fn added(key: impl Into<String>) -> Self {
        Self {
            status: AdminStatus::Added,
            key: Some(key.into()),
            error: None,
        }
    }

    pub fn revoked(key: impl Into<String>) -> Self {
        Self {
            status: AdminStatus::Revoked,
            key: Some(key.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AdminStatus::Error,
            key: None,
            error: Some(message.into()),
        }
    }
}

/// One entry of `GET /admin/keys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyListing {
    pub key: String,
    #[serde(rename = "type")]
    pub license_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl From<&ActivationRecord> for KeyListing {
    fn from(record: &ActivationRecord) -> Self {
        let binding = record.binding.as_ref();
        Self {
            key: record.key.as_str().to_string(),
            license_type: record.license_type.as_str().to_string(),
            activated_at: binding.map(|b| b.activated_at.as_millis()),
            expires_at: binding.map(|b| b.expires_at.as_millis()),
            device_id: binding.map(|b| b.device_id.as_str().to_string()),
        }
    }
}
