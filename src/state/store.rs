//! State store trait definition.
//!
//! This module defines the common interface for state storage backends.
//! Every operation is keyed by the resource instance it belongs to.

use async_trait::async_trait;

use crate::error::Result;
use super::lock::LockInfo;
use super::types::ProvisioningState;

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the provisioning state of an instance.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self, key: &str) -> Result<Option<ProvisioningState>>;

    /// Saves the provisioning state of an instance.
    async fn save(&self, key: &str, state: &ProvisioningState) -> Result<()>;

    /// Deletes the state of an instance.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Checks if state exists for an instance.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Acquires the lock of an instance.
    ///
    /// Returns lock information if successful.
    async fn acquire_lock(&self, key: &str, holder: &str) -> Result<LockInfo>;

    /// Releases the lock of an instance.
    async fn release_lock(&self, key: &str, lock_id: &str) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self, key: &str) -> Result<Option<LockInfo>>;

    /// Checks if the instance is locked.
    async fn is_locked(&self, key: &str) -> Result<bool> {
        Ok(self
            .get_lock_info(key)
            .await?
            .is_some_and(|lock| !lock.is_expired()))
    }

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
