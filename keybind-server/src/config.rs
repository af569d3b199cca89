//! Server configuration.
//!
//! Read once at startup from an optional JSON file, then adjusted by
//! command-line flags and environment variables. Every field has a
//! default, so an empty file (or none at all) yields a working
//! in-memory server on `127.0.0.1:3000`.

use keybind_storage::{
    JsonFileKeyStore, KeyStore, MemoryKeyStore, SqliteKeyStore, StorageResult, TimedKeyStore,
};
use keybind_types::DurationTable;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no persistent key store configured; pass --database or a config file")]
    EphemeralStore,
}

/// Which key store backend to run on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    Sqlite { path: PathBuf },
    Json { path: PathBuf },
}

/// Backend selector for command-line overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    Memory,
    Sqlite,
    Json,
}

impl StoreConfig {
    /// Applies a backend and/or path given on the command line.
    ///
    /// A path alone keeps the configured file backend, or selects SQLite
    /// when the configured backend is in-memory.
    #[must_use]
    pub fn overridden(self, kind: Option<StoreKind>, path: Option<PathBuf>) -> Self {
        let current_path = match &self {
            Self::Memory => None,
            Self::Sqlite { path } | Self::Json { path } => Some(path.clone()),
        };
        let kind = kind.unwrap_or(match (&self, &path) {
            (Self::Json { .. }, _) => StoreKind::Json,
            (Self::Sqlite { .. }, _) | (Self::Memory, Some(_)) => StoreKind::Sqlite,
            (Self::Memory, None) => StoreKind::Memory,
        });
        let path = path.or(current_path);

        match kind {
            StoreKind::Memory => Self::Memory,
            StoreKind::Sqlite => Self::Sqlite {
                path: path.unwrap_or_else(|| PathBuf::from("keybind.db")),
            },
            StoreKind::Json => Self::Json {
                path: path.unwrap_or_else(|| PathBuf::from("keybind-keys.json")),
            },
        }
    }

    /// Whether keys outlive the process.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::Memory)
    }

    /// Opens the configured backend.
    pub fn open(&self) -> StorageResult<Arc<dyn KeyStore>> {
        Ok(match self {
            Self::Memory => Arc::new(MemoryKeyStore::new()),
            Self::Sqlite { path } => Arc::new(SqliteKeyStore::open(path)?),
            Self::Json { path } => Arc::new(JsonFileKeyStore::open(path)?),
        })
    }
}

/// Everything the server reads at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind: String,
    pub store: StoreConfig,
    /// License type → span in seconds.
    pub durations: DurationTable,
    /// Upper bound for a single storage call, in milliseconds.
    pub storage_timeout_ms: u64,
    /// Seconds between background sweeps of expired keys; 0 disables them.
    pub sweep_interval_secs: u64,
    /// Bearer token required on `/admin` routes, if set.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            store: StoreConfig::default(),
            durations: DurationTable::default(),
            storage_timeout_ms: 5_000,
            sweep_interval_secs: 300,
            admin_token: None,
        }
    }
}

impl ServerConfig {
    /// Parses a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    #[must_use]
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Operator commands run once and exit, so an in-memory store would
    /// silently drop whatever they change.
    pub fn require_persistent_store(&self) -> Result<(), ConfigError> {
        if self.store.is_persistent() {
            Ok(())
        } else {
            Err(ConfigError::EphemeralStore)
        }
    }

    /// Opens the configured store behind the per-call timeout.
    pub fn open_store(&self) -> StorageResult<Arc<dyn KeyStore>> {
        let backend = self.store.open()?;
        info!(
            backend = backend.backend_name(),
            timeout_ms = self.storage_timeout_ms,
            "key store ready"
        );
        Ok(Arc::new(TimedKeyStore::new(backend, self.storage_timeout())))
    }
}
