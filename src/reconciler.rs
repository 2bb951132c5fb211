//! Attribute reconciliation.
//!
//! This module computes the set/unset delta between a requested attribute
//! map and the one persisted by the previous deploy, and applies it through
//! an [`AttributeSink`]. Service tags are the attributes reconciled today.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::provider::ProviderClient;

/// A single attribute change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    /// Attribute key.
    pub key: String,
    /// New value, or `None` to unset the key.
    pub value: Option<String>,
}

/// Destination that attribute changes are applied to.
#[async_trait]
pub trait AttributeSink: Send + Sync {
    /// Sets an attribute.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Unsets an attribute.
    async fn unset(&self, key: &str) -> Result<()>;
}

/// Reconciles requested attributes against previously applied ones.
#[derive(Debug, Default)]
pub struct AttributeReconciler;

/// Tags a single provider resource.
pub struct ResourceTagger<'a> {
    /// Provider client.
    client: &'a dyn ProviderClient,
    /// ARN of the tagged resource.
    resource_arn: &'a str,
}

impl AttributeChange {
    /// Creates a set change.
    #[must_use]
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Creates an unset change.
    #[must_use]
    pub fn unset(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

impl AttributeReconciler {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the changes that turn `previous` into `requested`.
    ///
    /// Requested keys come first, in key order, followed by unsets for
    /// previous keys the request dropped. Keys whose value is already
    /// applied produce no change.
    #[must_use]
    pub fn diff(
        &self,
        requested: &BTreeMap<String, String>,
        previous: &BTreeMap<String, String>,
    ) -> Vec<AttributeChange> {
        let sets = requested
            .iter()
            .filter(|(key, value)| previous.get(*key) != Some(*value))
            .map(|(key, value)| AttributeChange::set(key.as_str(), value.as_str()));

        let unsets = previous
            .keys()
            .filter(|key| !requested.contains_key(*key))
            .map(|key| AttributeChange::unset(key.as_str()));

        sets.chain(unsets).collect()
    }

    /// Applies changes concurrently and waits for all of them.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the sink.
    pub async fn apply(&self, changes: &[AttributeChange], sink: &dyn AttributeSink) -> Result<()> {
        if changes.is_empty() {
            debug!("No attribute changes to apply");
            return Ok(());
        }

        try_join_all(changes.iter().map(|change| async move {
            match &change.value {
                Some(value) => sink.set(&change.key, value).await,
                None => sink.unset(&change.key).await,
            }
        }))
        .await?;

        info!("Applied {} attribute changes", changes.len());
        Ok(())
    }
}

impl<'a> ResourceTagger<'a> {
    /// Creates a tagger for a resource.
    #[must_use]
    pub const fn new(client: &'a dyn ProviderClient, resource_arn: &'a str) -> Self {
        Self {
            client,
            resource_arn,
        }
    }
}

#[async_trait]
impl AttributeSink for ResourceTagger<'_> {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.client.tag_resource(self.resource_arn, key, value).await
    }

    async fn unset(&self, key: &str) -> Result<()> {
        self.client.untag_resource(self.resource_arn, key).await
    }
}

impl std::fmt::Debug for ResourceTagger<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTagger")
            .field("backend", &self.client.backend_type())
            .field("resource_arn", &self.resource_arn)
            .finish()
    }
}
