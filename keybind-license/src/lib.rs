//! Activation and key administration for keybind.
//!
//! This crate handles:
//! - The per-key activation state machine ([`ActivationEngine`])
//! - Operator issuance, revocation and listing ([`AdminRegistry`])
//! - Request validation and outcome mapping ([`VerificationService`])
//!
//! # Design Principles
//!
//! - **Single-device binding**: the first successful verification binds a
//!   key to the calling device; every other device gets `invalid_device`
//! - **Fixed expiry**: `expires_at` is computed once, at activation, from
//!   the process-wide duration table, and never moves
//! - **Terminal deletion**: expired and revoked keys are deleted, never
//!   resurrected
//! - **Storage failures are not verdicts**: a backend hiccup surfaces as a
//!   transient server error, never as `invalid` or `expired`

mod admin;
mod engine;
mod error;
mod service;

pub use admin::AdminRegistry;
pub use engine::{sweep_expired, ActivationEngine, Verdict};
pub use error::{LicenseError, LicenseResult};
pub use service::{VerificationService, VerifyOutcome};
