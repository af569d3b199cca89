//! Core type definitions for keybind.
//!
//! This crate defines the types shared by the authority and its clients:
//! - License key and device identifiers
//! - Millisecond wall-clock timestamps and an injectable clock
//! - Activation records and the license-type duration table
//! - The JSON wire protocol for verification and administration
//!
//! Everything here is plain data. Persistence lives in `keybind-storage`,
//! the activation state machine in `keybind-license`.

mod durations;
mod ids;
pub mod protocol;
mod record;
mod timestamp;

pub use durations::DurationTable;
pub use ids::{DeviceId, LicenseKey, LicenseType};
pub use record::{ActivationRecord, Binding, RecordState};
pub use timestamp::{Clock, ManualClock, SystemClock, Timestamp};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("invalid duration table: {0}")]
    InvalidDurations(String),
}
