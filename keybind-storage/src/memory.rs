//! In-memory key store, for tests and throwaway deployments.

use crate::error::{StorageError, StorageResult};
use crate::store::{BindOutcome, CreateOutcome, DeleteOutcome, KeyStore};
use async_trait::async_trait;
use keybind_types::{ActivationRecord, Binding, LicenseKey, LicenseType};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Key store holding all records in a locked map.
///
/// The lock is held for the whole of each operation, which makes every
/// mutation trivially atomic.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: Mutex<BTreeMap<LicenseKey, ActivationRecord>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> StorageResult<MutexGuard<'_, BTreeMap<LicenseKey, ActivationRecord>>> {
        self.records
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &LicenseKey) -> StorageResult<Option<ActivationRecord>> {
        Ok(self.records()?.get(key).cloned())
    }

    async fn create(
        &self,
        key: &LicenseKey,
        license_type: &LicenseType,
    ) -> StorageResult<CreateOutcome> {
        let mut records = self.records()?;
        if records.contains_key(key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        records.insert(
            key.clone(),
            ActivationRecord::issued(key.clone(), license_type.clone()),
        );
        Ok(CreateOutcome::Created)
    }

    async fn bind_and_activate(
        &self,
        key: &LicenseKey,
        binding: &Binding,
    ) -> StorageResult<BindOutcome> {
        let mut records = self.records()?;
        let Some(record) = records.get_mut(key) else {
            return Ok(BindOutcome::Missing);
        };
        if record.is_bound() {
            return Ok(BindOutcome::Conflict(record.clone()));
        }
        record.binding = Some(binding.clone());
        Ok(BindOutcome::Bound(record.clone()))
    }

    async fn delete(&self, key: &LicenseKey) -> StorageResult<DeleteOutcome> {
        Ok(match self.records()?.remove(key) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn list_all(&self) -> StorageResult<Vec<ActivationRecord>> {
        Ok(self.records()?.values().cloned().collect())
    }
}
