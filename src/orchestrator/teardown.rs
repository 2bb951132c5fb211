//! Reverse-order teardown.
//!
//! Resources are removed in the exact reverse of their creation order. Every
//! step is gated on its recorded id and checkpointed once done, so an
//! interrupted teardown resumes where it stopped.

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::components::{
    ComponentOutput, ComponentParams, ComponentRegistry, ServiceParams, TaskDefinitionParams,
};
use crate::config::{ServiceInstance, TimingConfig};
use crate::error::Result;
use crate::provider::ProviderClient;
use crate::state::{ProvisioningState, ResourceRole};

use super::poller::ConvergencePoller;
use super::Checkpointer;

/// Removes everything recorded for an instance.
pub struct TeardownSequencer<'a> {
    /// Provider client.
    client: &'a dyn ProviderClient,
    /// Sub-resource component registry.
    registry: &'a ComponentRegistry,
    /// Wait and retry tuning.
    timing: TimingConfig,
}

impl<'a> TeardownSequencer<'a> {
    /// Creates a teardown sequencer.
    #[must_use]
    pub const fn new(
        client: &'a dyn ProviderClient,
        registry: &'a ComponentRegistry,
        timing: TimingConfig,
    ) -> Self {
        Self {
            client,
            registry,
            timing,
        }
    }

    /// Tears down the service, its task definition and the network stack.
    ///
    /// # Errors
    ///
    /// Returns an error if a removal or a checkpoint fails. Steps completed
    /// before the failure stay cleared in state.
    pub async fn remove(
        &self,
        instance: &ServiceInstance,
        state: &mut ProvisioningState,
        checkpoint: &Checkpointer<'_>,
    ) -> Result<()> {
        info!("Tearing down service {}", instance.name);

        let cluster = state.service.as_ref().and_then(|s| s.cluster.clone());
        let task_arns = match &state.service {
            Some(service) => {
                self.client
                    .list_tasks(cluster.as_deref(), &service.service_name)
                    .await?
            }
            None => Vec::new(),
        };

        if let Some(service) = state.service.clone() {
            let component = self
                .registry
                .load(ComponentParams::Service(ServiceParams::for_removal(instance)))?;
            component.remove(&ComponentOutput::Service(service)).await?;
            state.service = None;
            state.tags.clear();
            checkpoint.save(state).await?;
        }

        if !task_arns.is_empty() {
            let report = ConvergencePoller::new(
                self.client,
                cluster.as_deref(),
                self.timing.poll_interval(),
            )
            .await_convergence(&task_arns, self.timing.teardown_attempts)
            .await?;
            if !report.converged {
                warn!("{} tasks still draining; continuing teardown", task_arns.len());
            }
        }

        if let Some(td) = state.task_definition.clone() {
            let component = self.registry.load(ComponentParams::TaskDefinition(
                TaskDefinitionParams::for_instance(instance),
            ))?;
            component.remove(&ComponentOutput::TaskDefinition(td)).await?;
            state.task_definition = None;
            state.task_definition_hash = None;
            checkpoint.save(state).await?;
        }

        for role in ResourceRole::teardown_order() {
            let Some(id) = state.network.get(role).map(String::from) else {
                continue;
            };
            self.delete(role, &id, state).await?;
            state.network.clear(role);
            checkpoint.save(state).await?;
            info!("Deleted {role} {id}");
        }

        state.clear();
        checkpoint.save(state).await
    }

    async fn delete(&self, role: ResourceRole, id: &str, state: &ProvisioningState) -> Result<()> {
        let client = self.client;
        match role {
            ResourceRole::Association => client.disassociate_route_table(id).await,
            ResourceRole::Subnet => client.delete_subnet(id).await,
            ResourceRole::RouteTable => {
                let routes = client.describe_route_table(id).await?;
                let removable: Vec<_> = routes.iter().filter(|r| !r.is_local()).collect();
                debug!("Deleting {} routes from {id}", removable.len());
                try_join_all(
                    removable
                        .iter()
                        .map(|route| client.delete_route(id, &route.destination)),
                )
                .await?;
                client.delete_route_table(id).await
            }
            ResourceRole::Acl => {
                let entries = client.describe_acl(id).await?;
                let removable: Vec<_> = entries.iter().filter(|e| e.is_removable()).collect();
                debug!("Deleting {} entries from {id}", removable.len());
                try_join_all(removable.iter().map(|entry| client.delete_acl_entry(id, entry)))
                    .await?;
                client.delete_acl(id).await
            }
            ResourceRole::SecurityPolicy => client.delete_security_policy(id).await,
            ResourceRole::Gateway => {
                if let Some(network_id) = state.network.get(ResourceRole::Network) {
                    client.detach_gateway(id, network_id).await?;
                }
                client.delete_gateway(id).await
            }
            ResourceRole::Network => client.delete_network(id).await,
        }
    }
}

impl std::fmt::Debug for TeardownSequencer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownSequencer")
            .field("backend", &self.client.backend_type())
            .field("registry", &self.registry)
            .field("timing", &self.timing)
            .finish()
    }
}
