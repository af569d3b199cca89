//! HTTP surface of the keybind verification authority.
//!
//! Routes:
//!
//! | method | path                | body / response                               |
//! |--------|---------------------|-----------------------------------------------|
//! | POST   | `/verify`           | `{key, deviceId}` → `{status, expiresAt?}`    |
//! | POST   | `/admin/add-key`    | `{key, type}` → `{status: "added", key}`      |
//! | POST   | `/admin/revoke-key` | `{key}` → `{status: "revoked", key}`          |
//! | GET    | `/admin/keys`       | list of key listings                          |
//! | GET    | `/health`           | `{status: "ok"}`                              |
//!
//! `/admin` routes require `Authorization: Bearer <token>` when an operator
//! token is configured.

pub mod auth;
pub mod config;
pub mod error;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use keybind_license::{
    ActivationEngine, AdminRegistry, LicenseError, VerificationService, VerifyOutcome,
};
use keybind_storage::KeyStore;
use keybind_types::protocol::{
    AddKeyRequest, AdminResponse, KeyListing, RevokeKeyRequest, VerifyRequest, VerifyResponse,
};
use keybind_types::{Clock, DurationTable, LicenseKey, LicenseType};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use config::{ServerConfig, StoreConfig, StoreKind};
pub use error::{ApiError, ApiResult};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub verification: Arc<VerificationService>,
    pub admin: Arc<AdminRegistry>,
    pub clock: Arc<dyn Clock>,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: Arc<dyn KeyStore>, durations: DurationTable, clock: Arc<dyn Clock>) -> Self {
        let durations = Arc::new(durations);
        let engine = Arc::new(ActivationEngine::new(
            Arc::clone(&store),
            Arc::clone(&durations),
        ));
        Self {
            verification: Arc::new(VerificationService::new(engine, Arc::clone(&clock))),
            admin: Arc::new(AdminRegistry::new(store, durations)),
            clock,
            admin_token: None,
        }
    }

    #[must_use]
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|t| !t.is_empty()).map(Arc::from);
        self
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<ActivationEngine> {
        self.verification.engine()
    }
}

async fn verify_handler(
    State(state): State<AppState>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("rejected verify body: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                Json(VerifyResponse::error(rejection.body_text())),
            )
                .into_response();
        }
    };

    let outcome = state.verification.verify(&request).await;
    let status = match &outcome {
        VerifyOutcome::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        VerifyOutcome::ServerError => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(outcome.to_response())).into_response()
}

/// Parses a required body field, treating blank values as missing.
fn required<T>(
    field: Option<String>,
    name: &str,
    parse: fn(&str) -> keybind_types::Result<T>,
) -> ApiResult<T> {
    field
        .as_deref()
        .and_then(|raw| parse(raw).ok())
        .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))
}

async fn add_key_handler(
    State(state): State<AppState>,
    body: Result<Json<AddKeyRequest>, JsonRejection>,
) -> ApiResult<Json<AdminResponse>> {
    let Json(request) = body.map_err(|r| ApiError::BadRequest(r.body_text()))?;
    let key = required(request.key, "key", LicenseKey::parse)?;
    let license_type = required(request.license_type, "type", LicenseType::parse)?;

    state.admin.issue(&key, &license_type).await?;
    Ok(Json(AdminResponse::added(key.as_str())))
}

async fn revoke_key_handler(
    State(state): State<AppState>,
    body: Result<Json<RevokeKeyRequest>, JsonRejection>,
) -> ApiResult<Json<AdminResponse>> {
    let Json(request) = body.map_err(|r| ApiError::BadRequest(r.body_text()))?;
    let key = required(request.key, "key", LicenseKey::parse)?;

    match state.admin.revoke(&key).await {
        Ok(()) | Err(LicenseError::NotFound(_)) => Ok(Json(AdminResponse::revoked(key.as_str()))),
        Err(e) => Err(e.into()),
    }
}

async fn list_keys_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<KeyListing>>> {
    let records = state.admin.list(state.clock.now()).await?;
    Ok(Json(records.iter().map(KeyListing::from).collect()))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Builds the HTTP router over `state`.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/add-key", post(add_key_handler))
        .route("/revoke-key", post(revoke_key_handler))
        .route("/keys", get(list_keys_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_operator,
        ));

    Router::new()
        .route("/verify", post(verify_handler))
        .route("/health", get(health_handler))
        .nest("/admin", admin)
        .with_state(state)
}

/// Periodically deletes expired bindings so abandoned keys do not linger
/// until someone happens to verify or list them.
pub fn spawn_sweeper(
    engine: Arc<ActivationEngine>,
    clock: Arc<dyn Clock>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match engine.sweep(clock.now()).await {
                Ok(removed) => debug!(removed, "sweep finished"),
                Err(e) => warn!("sweep failed, will retry: {e}"),
            }
        }
    })
}
