//! The key store abstraction.
//!
//! Defines the narrow interface every persistence backend implements. The
//! activation engine only ever talks to `dyn KeyStore`, so backends can be
//! swapped without touching verification logic.

use crate::error::StorageResult;
use async_trait::async_trait;
use keybind_types::{ActivationRecord, Binding, LicenseKey, LicenseType};

/// Result of [`KeyStore::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Result of [`KeyStore::bind_and_activate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The record was unbound and now carries the given binding.
    Bound(ActivationRecord),
    /// The record was already bound; the stored record is returned unchanged.
    Conflict(ActivationRecord),
    /// No record exists for the key.
    Missing,
}

/// Result of [`KeyStore::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Durable mapping from license key to activation record.
///
/// Every mutating call is atomic with respect to other calls on the same
/// key. In particular `bind_and_activate` is a single conditional write
/// ("bind only if still unbound"), never a read followed by a write.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Short name of the backend, for logs.
    fn backend_name(&self) -> &'static str;

    /// Fetches the record for a key.
    async fn get(&self, key: &LicenseKey) -> StorageResult<Option<ActivationRecord>>;

    /// Inserts an unbound record unless the key already exists.
    async fn create(
        &self,
        key: &LicenseKey,
        license_type: &LicenseType,
    ) -> StorageResult<CreateOutcome>;

    /// Attaches `binding` to the record if, and only if, it is still unbound.
    async fn bind_and_activate(
        &self,
        key: &LicenseKey,
        binding: &Binding,
    ) -> StorageResult<BindOutcome>;

    /// Removes the record for a key, bound or not.
    async fn delete(&self, key: &LicenseKey) -> StorageResult<DeleteOutcome>;

    /// Returns every record, ordered by key.
    async fn list_all(&self) -> StorageResult<Vec<ActivationRecord>>;
}

/// Runs a blocking backend call on the blocking thread pool.
pub(crate) async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StorageResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
