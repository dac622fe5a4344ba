//! Filesystem-based grant store.
//!
//! Each key is stored as `<key>.json` under the base directory, holding a
//! bare JSON array of granted permissions.
//!
//! # Security
//!
//! - **Path traversal**: keys are validated to prevent directory escape
//! - **File size limits**: oversized files are rejected before reading
//! - **Atomic writes**: values are written to a temporary file and renamed,
//!   so a crash never leaves a half-written grant list behind

use crate::models::GrantedPermissionSet;
use crate::storage::traits::GrantStore;
use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maximum file size for grant files (256 KiB).
const MAX_FILE_SIZE: u64 = 256 * 1024;

/// Stores grants as JSON files in a directory.
#[derive(Debug, Clone)]
pub struct FilesystemGrantStore {
    base_path: PathBuf,
}

impl FilesystemGrantStore {
    /// Creates a store rooted at `base_path`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)
            .map_err(|e| Error::operation("create_storage_dir", e))?;
        Ok(Self { base_path })
    }

    /// Returns the base path.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        if !Self::is_safe_key(key) {
            return Err(Error::InvalidInput(format!(
                "Storage key contains invalid characters: {key}"
            )));
        }
        Ok(self.base_path.join(format!("{key}.json")))
    }

    // Alphanumeric, dash and underscore only; rejects `..`, separators and NUL.
    fn is_safe_key(key: &str) -> bool {
        !key.is_empty()
            && key.len() <= 128
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl GrantStore for FilesystemGrantStore {
    fn load(&self, key: &str) -> Result<Option<GrantedPermissionSet>> {
        let path = self.key_path(key)?;
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::operation("read_grant_metadata", e)),
        };

        if metadata.len() > MAX_FILE_SIZE {
            return Err(Error::InvalidInput(format!(
                "Grant file exceeds maximum size of {MAX_FILE_SIZE} bytes: {}",
                path.display()
            )));
        }

        let json = fs::read_to_string(&path).map_err(|e| Error::operation("read_grant_file", e))?;
        let grants = serde_json::from_str(&json)
            .map_err(|e| Error::operation("deserialize_grants", e))?;
        Ok(Some(grants))
    }

    fn save(&self, key: &str, grants: &GrantedPermissionSet) -> Result<()> {
        let path = self.key_path(key)?;
        let json =
            serde_json::to_vec(grants).map_err(|e| Error::operation("serialize_grants", e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.base_path)
            .map_err(|e| Error::operation("create_grant_tempfile", e))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| Error::operation("write_grant_file", e))?;
        tmp.persist(&path)
            .map_err(|e| Error::operation("persist_grant_file", e.error))?;

        tracing::debug!(key, count = grants.len(), "Persisted grants");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::operation("delete_grant_file", e)),
        }
    }
}
