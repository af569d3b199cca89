//! Error types for the licensing module.

use keybind_storage::StorageError;
use thiserror::Error;

/// Licensing-specific errors.
///
/// Domain outcomes (`invalid`, `invalid_device`, `expired`) are not errors;
/// they are [`Verdict`](crate::Verdict)s. This enum covers what stops an
/// operation from producing a verdict at all.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Backend failure; safe to retry.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input rejected before touching the store.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// License type is missing from the duration table.
    #[error("unknown license type: {0}")]
    UnknownLicenseType(String),

    /// Issuance of a key that is already present.
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// Revocation of a key that is not present.
    #[error("key not found: {0}")]
    NotFound(String),
}

impl LicenseError {
    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<keybind_types::Error> for LicenseError {
    fn from(e: keybind_types::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
