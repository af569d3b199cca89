//! Time-bounded key store decorator.

use crate::error::{StorageError, StorageResult};
use crate::store::{BindOutcome, CreateOutcome, DeleteOutcome, KeyStore};
use async_trait::async_trait;
use keybind_types::{ActivationRecord, Binding, LicenseKey, LicenseType};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Wraps a backend so no call can hang a request.
///
/// A call that exceeds the limit fails with [`StorageError::Timeout`]. The
/// backend may still complete the operation afterwards; since every
/// mutation is atomic the record is then either fully applied or untouched,
/// and a retried verification observes whichever it is.
pub struct TimedKeyStore {
    inner: Arc<dyn KeyStore>,
    limit: Duration,
}

impl TimedKeyStore {
    pub fn new(inner: Arc<dyn KeyStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    /// The per-call time limit.
    #[must_use]
    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    backend = self.inner.backend_name(),
                    op,
                    "storage call exceeded {:?}",
                    self.limit
                );
                Err(StorageError::Timeout(self.limit))
            }
        }
    }
}

#[async_trait]
impl KeyStore for TimedKeyStore {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn get(&self, key: &LicenseKey) -> StorageResult<Option<ActivationRecord>> {
        self.bounded("get", self.inner.get(key)).await
    }

    async fn create(
        &self,
        key: &LicenseKey,
        license_type: &LicenseType,
    ) -> StorageResult<CreateOutcome> {
        self.bounded("create", self.inner.create(key, license_type))
            .await
    }

    async fn bind_and_activate(
        &self,
        key: &LicenseKey,
        binding: &Binding,
    ) -> StorageResult<BindOutcome> {
        self.bounded("bind_and_activate", self.inner.bind_and_activate(key, binding))
            .await
    }

    async fn delete(&self, key: &LicenseKey) -> StorageResult<DeleteOutcome> {
        self.bounded("delete", self.inner.delete(key)).await
    }

    async fn list_all(&self) -> StorageResult<Vec<ActivationRecord>> {
        self.bounded("list_all", self.inner.list_all()).await
    }
}
