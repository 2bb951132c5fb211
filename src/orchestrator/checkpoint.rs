//! Incremental state persistence.

use tracing::debug;

use crate::error::Result;
use crate::state::{ProvisioningState, StateStore};

/// Persists a state after every successful transition.
pub struct Checkpointer<'a> {
    /// Backing store.
    store: &'a dyn StateStore,
    /// Instance key the state is stored under.
    key: &'a str,
}

impl<'a> Checkpointer<'a> {
    /// Creates a checkpointer for one instance key.
    #[must_use]
    pub const fn new(store: &'a dyn StateStore, key: &'a str) -> Self {
        Self { store, key }
    }

    /// Stamps and saves the state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn save(&self, state: &mut ProvisioningState) -> Result<()> {
        state.touch();
        self.store.save(self.key, state).await?;
        debug!("Checkpointed state for {}", self.key);
        Ok(())
    }
}

impl std::fmt::Debug for Checkpointer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpointer")
            .field("backend", &self.store.backend_type())
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStateStore;

    #[tokio::test]
    async fn test_save_writes_through() {
        let store = MemoryStateStore::new();
        let checkpoint = Checkpointer::new(&store, "web");
        let mut state = ProvisioningState::new("web");
        state.network.network_id = Some(String::from("vpc-1"));

        checkpoint.save(&mut state).await.expect("save succeeds");

        assert_eq!(store.saves(), 1);
        let saved = store.snapshot("web").expect("state saved");
        assert_eq!(saved.network.network_id.as_deref(), Some("vpc-1"));
    }
}
