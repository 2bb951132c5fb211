//! Service lifecycle orchestration.
//!
//! [`ServiceOrchestrator`] is the entry point: every operation loads the
//! instance's state from the store, drives the relevant component and
//! records the outcome in the operation history.
//!
//! - [`NetworkProvisioner`]: the private-network stack
//! - [`ComputeOrchestrator`]: task definition, service and tags
//! - [`ConvergencePoller`]: task polling and metadata aggregation
//! - [`TeardownSequencer`]: reverse-order removal

mod checkpoint;
mod compute;
mod network;
mod plan;
mod poller;
mod teardown;

pub use checkpoint::Checkpointer;
pub use compute::{ComputeOrchestrator, ServiceOutputs};
pub use network::{NetworkProvisioner, NetworkRefs};
pub use plan::{ActionType, DeploymentPlan, PlannedAction};
pub use poller::{ConvergencePoller, ConvergenceReport, TaskMetadata};
pub use teardown::TeardownSequencer;

use tracing::{info, warn};

use crate::components::ComponentRegistry;
use crate::config::{ConfigHasher, DeployConfig};
use crate::error::Result;
use crate::provider::ProviderClient;
use crate::state::{Operation, OperationHistoryEntry, ProvisioningState, StateStore};

/// Runs deploy, refresh, plan and remove for a configured service.
pub struct ServiceOrchestrator<'a> {
    /// State store.
    store: &'a dyn StateStore,
    /// Provider client.
    client: &'a dyn ProviderClient,
    /// Sub-resource component registry.
    registry: &'a ComponentRegistry,
}

impl<'a> ServiceOrchestrator<'a> {
    /// Creates an orchestrator.
    #[must_use]
    pub const fn new(
        store: &'a dyn StateStore,
        client: &'a dyn ProviderClient,
        registry: &'a ComponentRegistry,
    ) -> Self {
        Self {
            store,
            client,
            registry,
        }
    }

    /// Loads the recorded state of a configured service.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn load_state(&self, config: &DeployConfig) -> Result<ProvisioningState> {
        let key = config.service.state_key();
        Ok(self
            .store
            .load(key)
            .await?
            .unwrap_or_else(|| ProvisioningState::new(key)))
    }

    /// Creates or updates the service.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The failure is recorded in the
    /// operation history on a best-effort basis.
    pub async fn deploy(&self, config: &DeployConfig) -> Result<ServiceOutputs> {
        let key = config.service.state_key();
        let checkpoint = Checkpointer::new(self.store, key);
        let mut state = self.load_state(config).await?;
        let config_hash = ConfigHasher::new().hash_config(config);

        let result = ComputeOrchestrator::new(self.client, self.registry, config.timing)
            .deploy(&config.service, &mut state, &checkpoint)
            .await;

        if result.is_ok() {
            state.config_hash.clone_from(&config_hash);
        }
        self.record(Operation::Deploy, &config_hash, &result, &mut state, &checkpoint)
            .await?;
        result
    }

    /// Refreshes the observed tasks of the service.
    ///
    /// Returns `None` if the service is not deployed.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails.
    pub async fn get(&self, config: &DeployConfig) -> Result<Option<ServiceOutputs>> {
        let key = config.service.state_key();
        let checkpoint = Checkpointer::new(self.store, key);
        let mut state = self.load_state(config).await?;
        if state.service.is_none() {
            info!("Service {} is not deployed", config.service.name);
            return Ok(None);
        }

        let result = ComputeOrchestrator::new(self.client, self.registry, config.timing)
            .get(&config.service, &mut state, &checkpoint)
            .await;

        let config_hash = state.config_hash.clone();
        self.record(Operation::Refresh, &config_hash, &result, &mut state, &checkpoint)
            .await?;
        result
    }

    /// Computes the steps a deploy would perform.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn plan(&self, config: &DeployConfig) -> Result<DeploymentPlan> {
        let state = self.load_state(config).await?;
        let config_hash = ConfigHasher::new().hash_config(config);
        Ok(DeploymentPlan::build(&config.service, &state, &config_hash))
    }

    /// Tears the service and its network down.
    ///
    /// # Errors
    ///
    /// Returns an error if a removal fails. Completed steps stay recorded.
    pub async fn remove(&self, config: &DeployConfig) -> Result<()> {
        let key = config.service.state_key();
        let checkpoint = Checkpointer::new(self.store, key);
        let mut state = self.load_state(config).await?;
        if state.is_empty() {
            info!("Nothing recorded for {}; nothing to remove", config.service.name);
            return Ok(());
        }

        let config_hash = state.config_hash.clone();
        let result = TeardownSequencer::new(self.client, self.registry, config.timing)
            .remove(&config.service, &mut state, &checkpoint)
            .await;

        self.record(Operation::Remove, &config_hash, &result, &mut state, &checkpoint)
            .await?;
        result
    }

    /// Appends the outcome to the history and saves it.
    ///
    /// A failed save is only logged when the operation itself failed, so the
    /// original error is the one returned.
    async fn record<T>(
        &self,
        operation: Operation,
        config_hash: &str,
        result: &Result<T>,
        state: &mut ProvisioningState,
        checkpoint: &Checkpointer<'_>,
    ) -> Result<()> {
        let entry = match result {
            Ok(_) => OperationHistoryEntry::new(operation, config_hash),
            Err(e) => OperationHistoryEntry::failed(operation, config_hash, &e.to_string()),
        };
        state.add_history(entry);

        match checkpoint.save(state).await {
            Err(e) if result.is_err() => {
                warn!("Failed to record {operation} failure: {e}");
                Ok(())
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for ServiceOrchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceOrchestrator")
            .field("store", &self.store.backend_type())
            .field("backend", &self.client.backend_type())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeComponents, FakeProvider, MemoryStateStore, sample_config};

    struct Harness {
        provider: FakeProvider,
        registry: ComponentRegistry,
        store: MemoryStateStore,
    }

    impl Harness {
        fn new() -> Self {
            let provider = FakeProvider::new();
            provider.with_tasks(&[("t1", 0)]);
            Self {
                provider,
                registry: FakeComponents::new().registry(),
                store: MemoryStateStore::new(),
            }
        }

        fn orchestrator(&self) -> ServiceOrchestrator<'_> {
            ServiceOrchestrator::new(&self.store, &self.provider, &self.registry)
        }
    }

    #[tokio::test]
    async fn test_deploy_records_history() {
        let harness = Harness::new();
        let config = sample_config("web");

        harness
            .orchestrator()
            .deploy(&config)
            .await
            .expect("deploy succeeds");

        let state = harness.store.snapshot("web").expect("state saved");
        assert_eq!(state.config_hash, ConfigHasher::new().hash_config(&config));
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].operation, Operation::Deploy);
        assert!(state.history[0].success);
    }

    #[tokio::test]
    async fn test_failed_deploy_records_failure() {
        let harness = Harness::new();
        harness.provider.fail_on("CreateSubnet");
        let config = sample_config("web");

        let result = harness.orchestrator().deploy(&config).await;
        assert!(result.is_err());

        let state = harness.store.snapshot("web").expect("state saved");
        assert!(state.config_hash.is_empty());
        assert!(state.network.route_table_id.is_some());
        let entry = state.history.last().expect("history entry");
        assert!(!entry.success);
        assert!(entry.error.as_deref().is_some_and(|e| e.contains("CreateSubnet")));
    }

    #[tokio::test]
    async fn test_state_is_reloaded_per_operation() {
        let harness = Harness::new();
        let config = sample_config("web");
        let orchestrator = harness.orchestrator();

        orchestrator.deploy(&config).await.expect("deploy succeeds");
        let plan = orchestrator.plan(&config).await.expect("plan succeeds");
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].action_type, ActionType::Update);

        let outputs = orchestrator
            .get(&config)
            .await
            .expect("get succeeds")
            .expect("service deployed");
        assert_eq!(outputs.service_name, "web");

        orchestrator.remove(&config).await.expect("remove succeeds");
        let state = harness.store.snapshot("web").expect("state saved");
        assert!(state.is_empty());
        let operations: Vec<Operation> = state.history.iter().map(|e| e.operation).collect();
        assert_eq!(
            operations,
            vec![Operation::Deploy, Operation::Refresh, Operation::Remove]
        );

        assert!(orchestrator.get(&config).await.expect("get succeeds").is_none());
        orchestrator.remove(&config).await.expect("second remove is a no-op");
    }
}
