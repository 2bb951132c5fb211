//! Local file-based state storage backend.
//!
//! Each instance gets `<dir>/<key>.json` for its state and `<dir>/<key>.lock`
//! for its lock. Suitable for local development and single-machine use.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{HalldyllError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo};
use super::store::StateStore;
use super::types::ProvisioningState;

/// Default state directory name.
pub const STATE_DIR: &str = ".halldyll";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Base directory for state files.
    base_dir: PathBuf,
}

impl LocalStateStore {
    /// Creates a new local state store under the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| HalldyllError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a new local state store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn state_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.json"))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.lock"))
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await.map_err(|e| {
                StateError::local(format!("Failed to create state directory: {e}"))
            })?;
        }
        Ok(())
    }

    /// Writes a file through a temporary sibling and an atomic rename.
    async fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        self.ensure_dir().await?;

        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::local(format!("Failed to create {}: {e}", temp_path.display())))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::local(format!("Failed to write {}: {e}", temp_path.display())))?;

        file.sync_all()
            .await
            .map_err(|e| StateError::local(format!("Failed to sync {}: {e}", temp_path.display())))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| StateError::local(format!("Failed to rename {}: {e}", path.display())))?;

        Ok(())
    }

    /// Reads a file if it exists.
    async fn read_optional(path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| StateError::Corrupted {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;

        Ok(Some(content))
    }

    /// Removes a file if it exists.
    async fn remove_optional(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)
                .await
                .map_err(|e| StateError::local(format!("Failed to delete {}: {e}", path.display())))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self, key: &str) -> Result<Option<ProvisioningState>> {
        let path = self.state_path(key);

        let Some(content) = Self::read_optional(&path).await? else {
            debug!("State file does not exist: {}", path.display());
            return Ok(None);
        };

        info!("Loading state from: {}", path.display());
        ProvisioningState::from_json(&content).map(Some)
    }

    async fn save(&self, key: &str, state: &ProvisioningState) -> Result<()> {
        let path = self.state_path(key);
        debug!("Saving state to: {}", path.display());

        let content = state.to_json()?;
        self.write_atomic(&path, &content).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.state_path(key);
        info!("Deleting state file: {}", path.display());

        Self::remove_optional(&path).await?;
        Self::remove_optional(&self.lock_path(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.state_path(key).exists())
    }

    async fn acquire_lock(&self, key: &str, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.get_lock_info(key).await? {
            existing.ensure_expired()?;
            debug!("Expired lock found for {key}, taking over");
        }

        let lock_info = LockInfo::new(holder);
        self.write_atomic(&self.lock_path(key), &lock_info.to_json()?)
            .await
            .map_err(|e| StateError::LockFailed {
                message: e.to_string(),
            })?;

        info!(
            "Acquired state lock for {key}: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, key: &str, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.get_lock_info(key).await? {
            if existing.lock_id == lock_id {
                Self::remove_optional(&self.lock_path(key)).await?;
                info!("Released state lock for {key}: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn get_lock_info(&self, key: &str) -> Result<Option<LockInfo>> {
        Self::read_optional(&self.lock_path(key))
            .await?
            .map(|content| LockInfo::from_json(&content))
            .transpose()
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
