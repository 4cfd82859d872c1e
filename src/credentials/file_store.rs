use super::{AccessToken, CredentialStore};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Token persisted as a JSON file. A missing file means "not authenticated".
pub struct FileCredentialStore {
    path: PathBuf,
    // Serializes writes so a refresh and a CLI save can't interleave.
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get_cached_token(&self) -> Result<Option<AccessToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read token file {:?}", self.path))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let token: AccessToken = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse token file {:?}", self.path))?;
        Ok(Some(token))
    }

    fn save_token(&self, token: &AccessToken) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let json = serde_json::to_string_pretty(token)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write token file {:?}", tmp_path))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to move token file into {:?}", self.path))?;
        Ok(())
    }
}
