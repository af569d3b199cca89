//! Talking to the verification authority.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use keybind_types::protocol::{VerifyRequest, VerifyResponse, VerifyStatus};
use keybind_types::{DeviceId, LicenseKey, Timestamp};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// What the authority said about one `(key, device)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyReply {
    Valid { expires_at: Timestamp },
    Invalid,
    InvalidDevice,
    Expired,
    /// The authority rejected the request itself.
    MalformedRequest(String),
    /// The authority could not reach a verdict.
    ServerError,
}

impl VerifyReply {
    /// True for the outcomes that end the license on this device.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::InvalidDevice | Self::Expired)
    }
}

/// Something that can answer verification requests.
///
/// [`HttpVerifier`] is the production implementation; tests script their
/// own.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, key: &LicenseKey, device: &DeviceId) -> ClientResult<VerifyReply>;
}

/// [`Verifier`] speaking the JSON protocol over HTTP.
pub struct HttpVerifier {
    client: Client,
    endpoint: String,
}

impl HttpVerifier {
    /// Creates a verifier for the authority at `server_url` (scheme, host
    /// and optional path prefix; `/verify` is appended).
    pub fn new(server_url: &str, request_timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/verify", server_url.trim_end_matches('/')),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Verifier for HttpVerifier {
    async fn verify(&self, key: &LicenseKey, device: &DeviceId) -> ClientResult<VerifyReply> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&VerifyRequest::new(key.as_str(), device.as_str()))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        debug!(%status, "verify response received");
        decode_reply(status, &body)
    }
}

fn decode_reply(status: StatusCode, body: &[u8]) -> ClientResult<VerifyReply> {
    if status.is_server_error() {
        return Ok(VerifyReply::ServerError);
    }
    if status == StatusCode::BAD_REQUEST {
        let reason = serde_json::from_slice::<VerifyResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| "bad request".to_string());
        return Ok(VerifyReply::MalformedRequest(reason));
    }
    if status != StatusCode::OK {
        return Err(ClientError::Protocol(format!("unexpected HTTP status {status}")));
    }

    let parsed: VerifyResponse = serde_json::from_slice(body)?;
    match parsed.status {
        VerifyStatus::Valid => parsed
            .expires_at
            .map(|ms| VerifyReply::Valid {
                expires_at: Timestamp::from_millis(ms),
            })
            .ok_or_else(|| ClientError::Protocol("valid response without expiresAt".into())),
        VerifyStatus::Invalid => Ok(VerifyReply::Invalid),
        VerifyStatus::InvalidDevice => Ok(VerifyReply::InvalidDevice),
        VerifyStatus::Expired => Ok(VerifyReply::Expired),
        VerifyStatus::Error => Err(ClientError::Protocol(
            "error status on a successful response".into(),
        )),
    }
}
