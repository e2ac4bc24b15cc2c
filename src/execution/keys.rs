//! Filesystem key store.
//!
//! Each key lives in `<directory>/<name>.json`. Only public metadata is ever
//! read back out; files readable by group or others are refused unless the
//! permission policy allows them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::KeysConfig;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("key store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key file {path} has insecure permissions {mode:o}")]
    BadPermissions { path: PathBuf, mode: u32 },
    #[error("invalid key name {0:?}")]
    InvalidName(String),
    #[error("malformed key file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Public metadata of a stored key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    #[serde(default)]
    pub name: String,
    pub address: String,
    pub curve: String,
    #[serde(default)]
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub struct KeyStore {
    directory: PathBuf,
    allow_bad_file_permissions: bool,
}

impl KeyStore {
    pub fn new(directory: impl Into<PathBuf>, allow_bad_file_permissions: bool) -> Self {
        Self {
            directory: directory.into(),
            allow_bad_file_permissions,
        }
    }

    pub fn from_config(config: &KeysConfig) -> Self {
        Self::new(&config.directory, config.allow_bad_file_permissions)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// List every key in the store, sorted by name. A missing directory is an
    /// empty store.
    pub fn list(&self) -> Result<Vec<KeyInfo>, KeyStoreError> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            keys.push(self.read_key(&path)?);
        }
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keys)
    }

    /// Look up a key by name. Names are plain file stems; anything that
    /// could leave the key directory is rejected.
    pub fn get(&self, name: &str) -> Result<Option<KeyInfo>, KeyStoreError> {
        if !is_valid_key_name(name) {
            return Err(KeyStoreError::InvalidName(name.to_string()));
        }
        let path = self.directory.join(format!("{name}.json"));
        if !path.exists() {
            return Ok(None);
        }
        self.read_key(&path).map(Some)
    }

    fn read_key(&self, path: &Path) -> Result<KeyInfo, KeyStoreError> {
        self.check_permissions(path)?;
        let content = fs::read_to_string(path)?;
        let mut info: KeyInfo = serde_json::from_str(&content).map_err(|source| KeyStoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        if info.name.is_empty() {
            info.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        Ok(info)
    }

    #[cfg(unix)]
    fn check_permissions(&self, path: &Path) -> Result<(), KeyStoreError> {
        use std::os::unix::fs::PermissionsExt;

        let mode = fs::metadata(path)?.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            if self.allow_bad_file_permissions {
                tracing::warn!(path = %path.display(), mode = format!("{mode:o}"), "Key file has insecure permissions");
            } else {
                return Err(KeyStoreError::BadPermissions {
                    path: path.to_path_buf(),
                    mode,
                });
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(&self, _path: &Path) -> Result<(), KeyStoreError> {
        Ok(())
    }
}

/// ASCII letters, digits, `_`, `-` and `.`, not starting with a dot.
fn is_valid_key_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}
