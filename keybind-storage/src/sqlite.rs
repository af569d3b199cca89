//! Relational key store backed by SQLite.
//!
//! One row per key. Activation is a conditional `UPDATE ... WHERE device_id
//! IS NULL`, so two racing first activations cannot both succeed even when
//! several processes share the database file.

use crate::error::{StorageError, StorageResult};
use crate::store::{blocking, BindOutcome, CreateOutcome, DeleteOutcome, KeyStore};
use async_trait::async_trait;
use keybind_types::{ActivationRecord, Binding, DeviceId, LicenseKey, LicenseType, Timestamp};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS keys (
        key_text TEXT PRIMARY KEY,
        type TEXT NOT NULL,
        device_id TEXT,
        activated_at INTEGER,
        expires_at INTEGER,
        CHECK (
            (device_id IS NULL AND activated_at IS NULL AND expires_at IS NULL)
            OR (device_id IS NOT NULL AND activated_at IS NOT NULL AND expires_at IS NOT NULL)
        )
    );
";

/// Raw column values of one `keys` row.
type Row = (String, String, Option<String>, Option<i64>, Option<i64>);

/// Key store backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyStore {
    /// Opens (or creates) a key store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            StorageError::Unavailable(format!("failed to open {}: {e}", path.display()))
        })?;
        debug!("opened sqlite key store at {}", path.display());
        Self::with_connection(conn)
    }

    /// Opens an in-memory key store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the locked connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        blocking(move || {
            let guard = lock(&conn)?;
            f(&guard)
        })
        .await
    }
}

fn lock(conn: &Mutex<Connection>) -> StorageResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".into()))
}

fn millis_to_sql(ts: Timestamp) -> StorageResult<i64> {
    i64::try_from(ts.as_millis())
        .map_err(|_| StorageError::Corrupt(format!("timestamp out of range: {ts}")))
}

fn millis_from_sql(v: i64) -> StorageResult<Timestamp> {
    u64::try_from(v)
        .map(Timestamp::from_millis)
        .map_err(|_| StorageError::Corrupt(format!("negative timestamp: {v}")))
}

fn decode(row: Row) -> StorageResult<ActivationRecord> {
    let (key_text, type_text, device_id, activated_at, expires_at) = row;
    let key = LicenseKey::parse(&key_text).map_err(|e| StorageError::Corrupt(e.to_string()))?;
    let license_type =
        LicenseType::parse(&type_text).map_err(|e| StorageError::Corrupt(e.to_string()))?;

    let binding = match (device_id, activated_at, expires_at) {
        (None, None, None) => None,
        (Some(device), Some(activated), Some(expires)) => Some(Binding {
            device_id: DeviceId::parse(&device)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?,
            activated_at: millis_from_sql(activated)?,
            expires_at: millis_from_sql(expires)?,
        }),
        _ => {
            return Err(StorageError::Corrupt(format!(
                "partially bound record for key {key_text}"
            )));
        }
    };

    Ok(ActivationRecord {
        key,
        license_type,
        binding,
    })
}

fn select_one(conn: &Connection, key: &str) -> StorageResult<Option<ActivationRecord>> {
    let row: Option<Row> = conn
        .query_row(
            "SELECT key_text, type, device_id, activated_at, expires_at FROM keys WHERE key_text = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;
    row.map(decode).transpose()
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &LicenseKey) -> StorageResult<Option<ActivationRecord>> {
        let key = key.as_str().to_string();
        self.with_conn(move |conn| select_one(conn, &key)).await
    }

    async fn create(
        &self,
        key: &LicenseKey,
        license_type: &LicenseType,
    ) -> StorageResult<CreateOutcome> {
        let key = key.as_str().to_string();
        let license_type = license_type.as_str().to_string();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO keys (key_text, type) VALUES (?1, ?2) ON CONFLICT (key_text) DO NOTHING",
                params![key, license_type],
            )?;
            Ok(if inserted == 0 {
                CreateOutcome::AlreadyExists
            } else {
                CreateOutcome::Created
            })
        })
        .await
    }

    async fn bind_and_activate(
        &self,
        key: &LicenseKey,
        binding: &Binding,
    ) -> StorageResult<BindOutcome> {
        let key = key.as_str().to_string();
        let device = binding.device_id.as_str().to_string();
        let activated_at = millis_to_sql(binding.activated_at)?;
        let expires_at = millis_to_sql(binding.expires_at)?;
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE keys SET device_id = ?2, activated_at = ?3, expires_at = ?4
                 WHERE key_text = ?1 AND device_id IS NULL",
                params![key, device, activated_at, expires_at],
            )?;
            // The connection lock is still held, so this read observes
            // exactly the state the update left behind.
            let current = select_one(conn, &key)?;
            Ok(match (updated, current) {
                (_, None) => BindOutcome::Missing,
                (0, Some(record)) => BindOutcome::Conflict(record),
                (_, Some(record)) => BindOutcome::Bound(record),
            })
        })
        .await
    }

    async fn delete(&self, key: &LicenseKey) -> StorageResult<DeleteOutcome> {
        let key = key.as_str().to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM keys WHERE key_text = ?1", params![key])?;
            Ok(if removed == 0 {
                DeleteOutcome::NotFound
            } else {
                DeleteOutcome::Deleted
            })
        })
        .await
    }

    async fn list_all(&self) -> StorageResult<Vec<ActivationRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key_text, type, device_id, activated_at, expires_at FROM keys ORDER BY key_text",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?;

            let mut records = Vec::new();
            for row in rows {
                records.push(decode(row?)?);
            }
            Ok(records)
        })
        .await
    }
}
