//! Persistence of the activated license key.

use crate::error::{LicenseError, LicenseResult};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Default license file name inside the data directory.
pub const LICENSE_FILE_NAME: &str = "license.key";

/// The license file: one license key string.
#[derive(Debug, Clone)]
pub struct LicenseStore {
    path: PathBuf,
}

impl LicenseStore {
    /// Uses `path` as the license file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `license.key` inside `data_dir`.
    #[must_use]
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(LICENSE_FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored key text, or `None` if no license file exists.
    pub fn load(&self) -> LicenseResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(None),
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LicenseError::Storage(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Replaces the stored key atomically (temp file, fsync, rename).
    pub fn save(&self, key: &str) -> LicenseResult<()> {
        let storage = |e: std::io::Error| {
            LicenseError::Storage(format!("failed to write {}: {e}", self.path.display()))
        };
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(storage)?;

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(storage)?;
        temp.write_all(key.as_bytes()).map_err(storage)?;
        temp.write_all(b"\n").map_err(storage)?;
        temp.as_file().sync_all().map_err(storage)?;
        temp.persist(&self.path).map_err(|e| storage(e.error))?;
        Ok(())
    }
}
