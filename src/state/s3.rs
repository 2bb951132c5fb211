//! S3-based state storage backend.
//!
//! Remote state on AWS S3 (or compatible services) for shared deployments.
//! Each instance gets `<prefix><key>/state.json` and `<prefix><key>/state.lock`.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{HalldyllError, Result, StateError};
use crate::provider::load_sdk_config;

use super::lock::{LOCK_EXPIRY_SECS, LockInfo};
use super::store::StateStore;
use super::types::ProvisioningState;

/// State file key suffix.
const STATE_KEY: &str = "state.json";

/// Lock file key suffix.
const LOCK_KEY: &str = "state.lock";

/// Normalizes a key prefix to either empty or `segment/`.
fn normalize_prefix(prefix: Option<&str>) -> String {
    prefix
        .map(|p| {
            let p = p.trim_matches('/');
            if p.is_empty() {
                String::new()
            } else {
                format!("{p}/")
            }
        })
        .unwrap_or_default()
}

/// S3-based state store.
#[derive(Debug)]
pub struct S3StateStore {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix.
    prefix: String,
}

impl S3StateStore {
    /// Creates a new S3 state store, loading AWS configuration for the region.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Self {
        let config = load_sdk_config(region).await;
        Self::with_client(Client::new(&config), bucket, prefix)
    }

    /// Creates a new S3 state store with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
        }
    }

    /// Gets the full S3 key of a file belonging to an instance.
    fn object_key(&self, key: &str, file: &str) -> String {
        format!("{}{key}/{file}", self.prefix)
    }

    /// Gets an object from S3.
    async fn get_object(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response.body.collect().await.map_err(|e| {
                    HalldyllError::State(StateError::s3(format!("Failed to read S3 object: {e}")))
                })?;

                let content = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    HalldyllError::State(StateError::Corrupted {
                        message: format!("Invalid UTF-8 in S3 object: {e}"),
                    })
                })?;

                Ok(Some(content))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(HalldyllError::State(StateError::s3(format!(
                        "S3 get error: {service_err}"
                    ))))
                }
            }
        }
    }

    /// Puts an object to S3.
    async fn put_object(&self, key: &str, content: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.as_bytes().to_vec().into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| {
                HalldyllError::State(StateError::s3(format!("S3 put error: {e}")))
            })?;

        Ok(())
    }

    /// Deletes an object from S3.
    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                HalldyllError::State(StateError::s3(format!("S3 delete error: {e}")))
            })?;

        Ok(())
    }

    /// Checks if an object exists in S3.
    async fn object_exists(&self, key: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(HalldyllError::State(StateError::s3(format!(
                        "S3 head error: {service_err}"
                    ))))
                }
            }
        }
    }
}

#[async_trait]
impl StateStore for S3StateStore {
    async fn load(&self, key: &str) -> Result<Option<ProvisioningState>> {
        let object_key = self.object_key(key, STATE_KEY);
        debug!("Loading state from s3://{}/{object_key}", self.bucket);

        let Some(json) = self.get_object(&object_key).await? else {
            debug!("No state found in S3 for {key}");
            return Ok(None);
        };

        let state = ProvisioningState::from_json(&json)?;
        info!("Loaded state for instance: {}", state.instance);
        Ok(Some(state))
    }

    async fn save(&self, key: &str, state: &ProvisioningState) -> Result<()> {
        let object_key = self.object_key(key, STATE_KEY);
        debug!("Saving state to s3://{}/{object_key}", self.bucket);

        self.put_object(&object_key, &state.to_json()?).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let state_key = self.object_key(key, STATE_KEY);
        info!("Deleting state from s3://{}/{state_key}", self.bucket);

        self.delete_object(&state_key).await?;
        self.delete_object(&self.object_key(key, LOCK_KEY)).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.object_exists(&self.object_key(key, STATE_KEY)).await
    }

    async fn acquire_lock(&self, key: &str, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.get_lock_info(key).await? {
            existing.ensure_expired()?;
            debug!("Expired lock found for {key}, taking over");
        }

        let lock_info = LockInfo::new(holder);
        self.put_object(&self.object_key(key, LOCK_KEY), &lock_info.to_json()?)
            .await?;

        info!(
            "Acquired state lock for {key}: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, key: &str, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.get_lock_info(key).await? {
            if existing.lock_id == lock_id {
                self.delete_object(&self.object_key(key, LOCK_KEY)).await?;
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
        self.get_object(&self.object_key(key, LOCK_KEY))
            .await?
            .map(|content| LockInfo::from_json(&content))
            .transpose()
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}
