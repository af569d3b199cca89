//! Flat-document key store.
//!
//! All records live in one JSON document on disk. Each mutation builds the
//! next document in memory, writes and syncs it to a sibling temp file, and
//! renames it over the original; the in-memory copy is only replaced once the rename
//! succeeded. A failed write therefore leaves both the file and the cache
//! at the previous state.

use crate::error::{StorageError, StorageResult};
use crate::store::{blocking, BindOutcome, CreateOutcome, DeleteOutcome, KeyStore};
use async_trait::async_trait;
use keybind_types::{ActivationRecord, Binding, LicenseKey, LicenseType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: u32,
    records: Vec<ActivationRecord>,
}

struct Inner {
    path: PathBuf,
    records: BTreeMap<LicenseKey, ActivationRecord>,
}

impl Inner {
    /// Persists `next` and adopts it as the current state.
    fn commit(&mut self, next: BTreeMap<LicenseKey, ActivationRecord>) -> StorageResult<()> {
        let doc = Document {
            version: DOCUMENT_VERSION,
            records: next.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;

        let tmp = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;

        self.records = next;
        Ok(())
    }
}

/// Key store persisted as a single JSON document.
#[derive(Clone)]
pub struct JsonFileKeyStore {
    inner: Arc<Mutex<Inner>>,
}

impl JsonFileKeyStore {
    /// Opens the document at `path`, creating an empty one if absent.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut inner = Inner {
            path: path.to_path_buf(),
            records: BTreeMap::new(),
        };

        if path.exists() {
            inner.records = load(path)?;
            debug!("loaded {} records from {}", inner.records.len(), path.display());
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            inner.commit(BTreeMap::new())?;
            info!("created key document at {}", path.display());
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    async fn with_inner<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Inner) -> StorageResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let mut guard = lock(&inner)?;
            f(&mut guard)
        })
        .await
    }
}

fn load(path: &Path) -> StorageResult<BTreeMap<LicenseKey, ActivationRecord>> {
    let bytes = fs::read(path)?;
    let doc: Document = serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))?;
    if doc.version != DOCUMENT_VERSION {
        return Err(StorageError::Corrupt(format!(
            "unsupported document version {}",
            doc.version
        )));
    }
    Ok(doc.records.into_iter().map(|r| (r.key.clone(), r)).collect())
}

fn lock(inner: &Mutex<Inner>) -> StorageResult<MutexGuard<'_, Inner>> {
    inner
        .lock()
        .map_err(|_| StorageError::Unavailable("document lock poisoned".into()))
}

#[async_trait]
impl KeyStore for JsonFileKeyStore {
    fn backend_name(&self) -> &'static str {
        "json-file"
    }

    async fn get(&self, key: &LicenseKey) -> StorageResult<Option<ActivationRecord>> {
        let key = key.clone();
        self.with_inner(move |inner| Ok(inner.records.get(&key).cloned()))
            .await
    }

    async fn create(
        &self,
        key: &LicenseKey,
        license_type: &LicenseType,
    ) -> StorageResult<CreateOutcome> {
        let record = ActivationRecord::issued(key.clone(), license_type.clone());
        self.with_inner(move |inner| {
            if inner.records.contains_key(&record.key) {
                return Ok(CreateOutcome::AlreadyExists);
            }
            let mut next = inner.records.clone();
            next.insert(record.key.clone(), record);
            inner.commit(next)?;
            Ok(CreateOutcome::Created)
        })
        .await
    }

    async fn bind_and_activate(
        &self,
        key: &LicenseKey,
        binding: &Binding,
    ) -> StorageResult<BindOutcome> {
        let key = key.clone();
        let binding = binding.clone();
        self.with_inner(move |inner| {
            let Some(current) = inner.records.get(&key) else {
                return Ok(BindOutcome::Missing);
            };
            if current.is_bound() {
                return Ok(BindOutcome::Conflict(current.clone()));
            }
            let mut bound = current.clone();
            bound.binding = Some(binding);

            let mut next = inner.records.clone();
            next.insert(key, bound.clone());
            inner.commit(next)?;
            Ok(BindOutcome::Bound(bound))
        })
        .await
    }

    async fn delete(&self, key: &LicenseKey) -> StorageResult<DeleteOutcome> {
        let key = key.clone();
        self.with_inner(move |inner| {
            if !inner.records.contains_key(&key) {
                return Ok(DeleteOutcome::NotFound);
            }
            let mut next = inner.records.clone();
            next.remove(&key);
            inner.commit(next)?;
            Ok(DeleteOutcome::Deleted)
        })
        .await
    }

    async fn list_all(&self) -> StorageResult<Vec<ActivationRecord>> {
        self.with_inner(|inner| Ok(inner.records.values().cloned().collect()))
            .await
    }
}
