//! Private-network provisioning.
//!
//! The stack is built one role at a time in [`ResourceRole::CREATION_ORDER`].
//! A role whose id is already recorded is not created again, and a
//! follow-up [`NetworkStep`] already marked done is not repeated, so a retry
//! after a failure resumes right after the last checkpointed step.

use tracing::{debug, info};

use crate::config::{NETWORK_CIDR, NetworkConfig, SUBNET_CIDR, ServiceInstance};
use crate::error::{OrchestrationError, Result};
use crate::provider::{ProviderClient, RouteDestination, SecurityRule};
use crate::state::{NetworkStep, ProvisioningState, ResourceRole};

use super::Checkpointer;

/// IPv4 default route.
const DEFAULT_ROUTE_V4: &str = "0.0.0.0/0";

/// IPv6 default route.
const DEFAULT_ROUTE_V6: &str = "::/0";

/// Network references a service is launched into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkRefs {
    /// Security group ids.
    pub security_groups: Vec<String>,
    /// Subnet ids.
    pub subnets: Vec<String>,
}

impl From<&NetworkConfig> for NetworkRefs {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            security_groups: config.security_groups.clone(),
            subnets: config.subnets.clone(),
        }
    }
}

/// Builds the seven-role network stack for a service.
pub struct NetworkProvisioner<'a> {
    /// Provider client.
    client: &'a dyn ProviderClient,
}

/// Gets the recorded id for a role a step depends on.
fn prerequisite(state: &ProvisioningState, role: ResourceRole, needed_by: &str) -> Result<String> {
    state
        .network
        .get(role)
        .map(String::from)
        .ok_or_else(|| OrchestrationError::missing(role, needed_by).into())
}

impl<'a> NetworkProvisioner<'a> {
    /// Creates a provisioner.
    #[must_use]
    pub const fn new(client: &'a dyn ProviderClient) -> Self {
        Self { client }
    }

    /// Ensures the network the service runs in exists.
    ///
    /// Explicit network configuration is used verbatim and nothing is
    /// created. Otherwise every missing role is created in order and every
    /// unfinished follow-up step of a recorded role is run.
    ///
    /// # Errors
    ///
    /// Returns an error if a call or a checkpoint fails. Steps
    /// checkpointed before the failure stay recorded.
    pub async fn ensure_network(
        &self,
        instance: &ServiceInstance,
        state: &mut ProvisioningState,
        checkpoint: &Checkpointer<'_>,
    ) -> Result<NetworkRefs> {
        if let Some(network) = &instance.network {
            debug!("Using explicit network configuration for {}", instance.name);
            return Ok(NetworkRefs::from(network));
        }

        for role in ResourceRole::CREATION_ORDER {
            self.provision(role, instance, state, checkpoint).await?;
        }

        Ok(NetworkRefs {
            security_groups: vec![prerequisite(
                state,
                ResourceRole::SecurityPolicy,
                "launch the service",
            )?],
            subnets: vec![prerequisite(
                state,
                ResourceRole::Subnet,
                "launch the service",
            )?],
        })
    }

    /// Creates a role if it is not recorded, then runs its unfinished
    /// follow-up steps.
    ///
    /// The id is checkpointed right after creation and every follow-up step
    /// right after it succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if a prerequisite id is missing or a call fails.
    pub async fn provision(
        &self,
        role: ResourceRole,
        instance: &ServiceInstance,
        state: &mut ProvisioningState,
        checkpoint: &Checkpointer<'_>,
    ) -> Result<()> {
        if let Some(id) = state.network.get(role) {
            debug!("Skipping {role}: already provisioned as {id}");
        } else {
            let id = self.create(role, instance, state).await?;
            state.network.set(role, &id);
            checkpoint.save(state).await?;
            info!("Created {role} {id}");
        }

        for &step in NetworkStep::for_role(role) {
            if state.network.is_done(step) {
                continue;
            }
            self.complete(step, state).await?;
            state.network.mark_done(step);
            checkpoint.save(state).await?;
            debug!("Completed {step} on {role}");
        }

        Ok(())
    }

    async fn create(
        &self,
        role: ResourceRole,
        instance: &ServiceInstance,
        state: &ProvisioningState,
    ) -> Result<String> {
        let client = self.client;
        match role {
            ResourceRole::Network => client.create_network(NETWORK_CIDR).await,
            ResourceRole::Gateway => {
                prerequisite(state, ResourceRole::Network, "attach the gateway")?;
                client.create_gateway().await
            }
            ResourceRole::SecurityPolicy => {
                let network_id =
                    prerequisite(state, ResourceRole::Network, "create the security policy")?;
                client
                    .create_security_policy(
                        &instance.security_group_name(),
                        &instance.security_group_description(),
                        &network_id,
                    )
                    .await
            }
            ResourceRole::Acl => {
                let network_id = prerequisite(state, ResourceRole::Network, "create the ACL")?;
                client.create_acl(&network_id).await
            }
            ResourceRole::RouteTable => {
                let network_id =
                    prerequisite(state, ResourceRole::Network, "create the route table")?;
                prerequisite(state, ResourceRole::Gateway, "create the default routes")?;
                client.create_route_table(&network_id).await
            }
            ResourceRole::Subnet => {
                let network_id = prerequisite(state, ResourceRole::Network, "create the subnet")?;
                client.create_subnet(&network_id, SUBNET_CIDR).await
            }
            ResourceRole::Association => {
                let route_table_id = prerequisite(
                    state,
                    ResourceRole::RouteTable,
                    "associate the route table",
                )?;
                let subnet_id =
                    prerequisite(state, ResourceRole::Subnet, "associate the route table")?;
                client
                    .associate_route_table(&route_table_id, &subnet_id)
                    .await
            }
        }
    }

    async fn complete(&self, step: NetworkStep, state: &ProvisioningState) -> Result<()> {
        let client = self.client;
        let needed_by = step.as_str();
        match step {
            NetworkStep::AttachGateway => {
                let network_id = prerequisite(state, ResourceRole::Network, needed_by)?;
                let gateway_id = prerequisite(state, ResourceRole::Gateway, needed_by)?;
                client.attach_gateway(&gateway_id, &network_id).await
            }
            NetworkStep::AuthorizeIngress | NetworkStep::AuthorizeEgress => {
                let policy_id = prerequisite(state, ResourceRole::SecurityPolicy, needed_by)?;
                let rule = if step == NetworkStep::AuthorizeIngress {
                    SecurityRule::allow_all_ingress()
                } else {
                    SecurityRule::allow_all_egress()
                };
                client.authorize_security_rule(&policy_id, &rule).await
            }
            NetworkStep::DefaultRouteV4 | NetworkStep::DefaultRouteV6 => {
                let route_table_id = prerequisite(state, ResourceRole::RouteTable, needed_by)?;
                let gateway_id = prerequisite(state, ResourceRole::Gateway, needed_by)?;
                let destination = if step == NetworkStep::DefaultRouteV4 {
                    RouteDestination::Ipv4(String::from(DEFAULT_ROUTE_V4))
                } else {
                    RouteDestination::Ipv6(String::from(DEFAULT_ROUTE_V6))
                };
                client
                    .create_route(&route_table_id, &destination, &gateway_id)
                    .await
            }
        }
    }
}

impl std::fmt::Debug for NetworkProvisioner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkProvisioner")
            .field("backend", &self.client.backend_type())
            .finish()
    }
}
