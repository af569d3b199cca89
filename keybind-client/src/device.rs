//! Per-installation device identity.
//!
//! The authority binds a key to whatever identifier the client sends, so
//! the identifier must survive restarts. It is generated once (UUID v4)
//! and kept in a small text file under the platform data directory.

use crate::error::{ClientError, ClientResult};
use keybind_types::DeviceId;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_DIR: &str = "keybind";
const FILE_NAME: &str = "device-id";

/// A device identifier together with where it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    id: DeviceId,
    path: PathBuf,
}

impl DeviceIdentity {
    /// Default location: `<data dir>/keybind/device-id`.
    ///
    /// Returns `None` on platforms without a data directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR).join(FILE_NAME))
    }

    /// Reads the identifier at `path`, generating and persisting a fresh
    /// one if the file does not exist yet.
    ///
    /// An existing but empty or unreadable file is an error rather than a
    /// reason to mint a new identity: a silently changed identifier would
    /// lock the installation out of its own key.
    pub fn load_or_create(path: &Path) -> ClientResult<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)?;
            let id = DeviceId::parse(&raw).map_err(|e| {
                ClientError::Identity(format!("{}: {e}", path.display()))
            })?;
            debug!("loaded device id from {}", path.display());
            return Ok(Self {
                id,
                path: path.to_path_buf(),
            });
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let id = DeviceId::generate();
        fs::write(path, format!("{id}\n"))?;
        info!(device = %id, "generated device id at {}", path.display());

        Ok(Self {
            id,
            path: path.to_path_buf(),
        })
    }

    /// [`load_or_create`](Self::load_or_create) at [`default_path`](Self::default_path).
    pub fn load_default() -> ClientResult<Self> {
        let path = Self::default_path()
            .ok_or_else(|| ClientError::Identity("no platform data directory".into()))?;
        Self::load_or_create(&path)
    }

    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn into_id(self) -> DeviceId {
        self.id
    }
}
