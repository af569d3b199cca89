//! Transport-agnostic verification handler.
//!
//! Validates raw request fields, asks the engine for a verdict and folds
//! every possible result into a [`VerifyOutcome`]. The HTTP layer only has
//! to pick a status code.

use crate::engine::{ActivationEngine, Verdict};
use crate::error::LicenseError;
use keybind_types::protocol::{VerifyRequest, VerifyResponse, VerifyStatus};
use keybind_types::{Clock, DeviceId, LicenseKey, Timestamp};
use std::sync::Arc;
use tracing::{error, warn};

/// Everything a verification call can end in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid { expires_at: Timestamp },
    Invalid,
    InvalidDevice,
    Expired,
    /// Missing or empty input; the store was not touched.
    MalformedRequest(String),
    /// Transient backend failure or misconfiguration. Never a statement
    /// about the key itself.
    ServerError,
}

impl VerifyOutcome {
    /// Returns true for the three outcomes that lock a client out.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::InvalidDevice | Self::Expired)
    }

    /// Wire representation.
    #[must_use]
    pub fn to_response(&self) -> VerifyResponse {
        match self {
            Self::Valid { expires_at } => VerifyResponse::valid(*expires_at),
            Self::Invalid => VerifyResponse::outcome(VerifyStatus::Invalid),
            Self::InvalidDevice => VerifyResponse::outcome(VerifyStatus::InvalidDevice),
            Self::Expired => VerifyResponse::outcome(VerifyStatus::Expired),
            Self::MalformedRequest(reason) => VerifyResponse::error(reason.clone()),
            Self::ServerError => VerifyResponse::error("server error"),
        }
    }
}

impl From<Verdict> for VerifyOutcome {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Valid { expires_at } => Self::Valid { expires_at },
            Verdict::Invalid => Self::Invalid,
            Verdict::InvalidDevice => Self::InvalidDevice,
            Verdict::Expired => Self::Expired,
        }
    }
}

/// The single externally reachable verification operation.
pub struct VerificationService {
    engine: Arc<ActivationEngine>,
    clock: Arc<dyn Clock>,
}

impl VerificationService {
    pub fn new(engine: Arc<ActivationEngine>, clock: Arc<dyn Clock>) -> Self {
        Self { engine, clock }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<ActivationEngine> {
        &self.engine
    }

    /// Handles one `(key, deviceId)` request.
    pub async fn verify(&self, request: &VerifyRequest) -> VerifyOutcome {
        let (key, device) = match parse_request(request) {
            Ok(parsed) => parsed,
            Err(reason) => return VerifyOutcome::MalformedRequest(reason),
        };

        match self.engine.verify(&key, &device, self.clock.now()).await {
            Ok(verdict) => verdict.into(),
            Err(e @ LicenseError::Storage(_)) => {
                warn!(key = %key, "verification aborted: {e}");
                VerifyOutcome::ServerError
            }
            Err(e) => {
                error!(key = %key, "verification failed: {e}");
                VerifyOutcome::ServerError
            }
        }
    }
}

fn parse_request(request: &VerifyRequest) -> Result<(LicenseKey, DeviceId), String> {
    let key = request
        .key
        .as_deref()
        .and_then(|k| LicenseKey::parse(k).ok())
        .ok_or_else(|| "key is required".to_string())?;
    let device = request
        .device_id
        .as_deref()
        .and_then(|d| DeviceId::parse(d).ok())
        .ok_or_else(|| "deviceId is required".to_string())?;
    Ok((key, device))
}
