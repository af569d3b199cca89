//! Shared test helpers for license tests.

#![allow(dead_code)]

use async_trait::async_trait;
use keybind_license::{ActivationEngine, AdminRegistry};
use keybind_storage::{
    BindOutcome, CreateOutcome, DeleteOutcome, KeyStore, MemoryKeyStore, StorageError,
    StorageResult,
};
use keybind_types::{
    ActivationRecord, Binding, DeviceId, DurationTable, LicenseKey, LicenseType, Timestamp,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DAY_MS: u64 = 86_400_000;
pub const T0: u64 = 1_700_000_000_000;

pub fn key(s: &str) -> LicenseKey {
    LicenseKey::parse(s).unwrap()
}

pub fn device(s: &str) -> DeviceId {
    DeviceId::parse(s).unwrap()
}

pub fn license_type(s: &str) -> LicenseType {
    LicenseType::parse(s).unwrap()
}

pub fn at(ms: u64) -> Timestamp {
    Timestamp::from_millis(ms)
}

/// Engine and registry sharing one store and the default duration table.
pub struct Fixture {
    pub store: Arc<dyn KeyStore>,
    pub engine: ActivationEngine,
    pub admin: AdminRegistry,
}

impl Fixture {
    pub fn with_store(store: Arc<dyn KeyStore>) -> Self {
        let durations = Arc::new(DurationTable::default());
        Self {
            engine: ActivationEngine::new(Arc::clone(&store), Arc::clone(&durations)),
            admin: AdminRegistry::new(Arc::clone(&store), durations),
            store,
        }
    }

    pub fn memory() -> Self {
        Self::with_store(Arc::new(MemoryKeyStore::new()))
    }

    pub async fn issue(&self, k: &str, t: &str) {
        self.admin.issue(&key(k), &license_type(t)).await.unwrap();
    }
}

/// A memory store whose individual operations can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryKeyStore,
    pub fail_get: AtomicBool,
    pub fail_bind: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Deletes the record but reports a failure, like a timed-out call
    /// that still completed.
    pub lose_delete_reply: AtomicBool,
    pub fail_list: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool) -> StorageResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyStore for FlakyStore {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, key: &LicenseKey) -> StorageResult<Option<ActivationRecord>> {
        Self::check(&self.fail_get)?;
        self.inner.get(key).await
    }

    async fn create(&self, key: &LicenseKey, t: &LicenseType) -> StorageResult<CreateOutcome> {
        self.inner.create(key, t).await
    }

    async fn bind_and_activate(
        &self,
        key: &LicenseKey,
        binding: &Binding,
    ) -> StorageResult<BindOutcome> {
        Self::check(&self.fail_bind)?;
        self.inner.bind_and_activate(key, binding).await
    }

    async fn delete(&self, key: &LicenseKey) -> StorageResult<DeleteOutcome> {
        Self::check(&self.fail_delete)?;
        let outcome = self.inner.delete(key).await?;
        Self::check(&self.lose_delete_reply)?;
        Ok(outcome)
    }

    async fn list_all(&self) -> StorageResult<Vec<ActivationRecord>> {
        Self::check(&self.fail_list)?;
        self.inner.list_all().await
    }
}
