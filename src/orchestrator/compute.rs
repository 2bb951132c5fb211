//! Compute orchestration.
//!
//! A deploy registers the task definition, makes sure the network exists,
//! creates or updates the service, reconciles its tags and finally polls the
//! service's tasks. Every completed step is checkpointed before the next one
//! starts.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::components::{
    ComponentOutput, ComponentParams, ComponentRegistry, ServiceParams, TaskDefinitionParams,
};
use crate::config::{ConfigHasher, ServiceInstance, TimingConfig};
use crate::error::Result;
use crate::provider::{Attachment, Container, NetworkInterface, ProviderClient};
use crate::reconciler::{AttributeReconciler, ResourceTagger};
use crate::state::{ProvisioningState, ServiceRef, TaskDefinitionRef};

use super::network::NetworkProvisioner;
use super::poller::{ConvergencePoller, ConvergenceReport};
use super::Checkpointer;

/// What a deploy or refresh reports about the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceOutputs {
    /// Service name.
    pub service_name: String,
    /// Service ARN.
    pub service_arn: String,
    /// Task definition the service runs, as `family:revision`.
    pub task_definition: Option<String>,
    /// Containers observed in the service's tasks.
    pub containers: Vec<Container>,
    /// Task attachments.
    pub attachments: Vec<Attachment>,
    /// Network interfaces of the tasks.
    pub network_interfaces: Vec<NetworkInterface>,
    /// Whether every task reached its desired status.
    pub converged: bool,
}

/// Drives the task definition and service of one instance.
pub struct ComputeOrchestrator<'a> {
    /// Provider client.
    client: &'a dyn ProviderClient,
    /// Sub-resource component registry.
    registry: &'a ComponentRegistry,
    /// Wait and retry tuning.
    timing: TimingConfig,
}

impl<'a> ComputeOrchestrator<'a> {
    /// Creates a compute orchestrator.
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

    /// Deploys the instance and waits for its tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if any provider call, component call or checkpoint
    /// fails. Convergence running out of attempts is not an error.
    pub async fn deploy(
        &self,
        instance: &ServiceInstance,
        state: &mut ProvisioningState,
        checkpoint: &Checkpointer<'_>,
    ) -> Result<ServiceOutputs> {
        info!("Deploying service {}", instance.name);

        let task_definition = self
            .ensure_task_definition(instance, state, checkpoint)
            .await?;

        let refs = NetworkProvisioner::new(self.client)
            .ensure_network(instance, state, checkpoint)
            .await?;

        let params = ServiceParams::for_instance(
            instance,
            &task_definition,
            refs.security_groups,
            refs.subnets,
        );
        let component = self.registry.load(ComponentParams::Service(params))?;
        let prev = state.service.clone().map(ComponentOutput::Service);
        let service = component.deploy(prev.as_ref()).await?.into_service()?;
        state.service = Some(service.clone());
        checkpoint.save(state).await?;

        self.reconcile_tags(instance, &service, state, checkpoint)
            .await?;

        if !self.timing.settle().is_zero() {
            debug!("Waiting {:?} for tasks to launch", self.timing.settle());
            tokio::time::sleep(self.timing.settle()).await;
        }

        let report = self
            .poll(instance, &service, self.timing.deploy_attempts)
            .await?;
        let converged = self.merge(report, state, checkpoint).await?;

        Ok(Self::outputs(&service, state, converged))
    }

    /// Refreshes the observed tasks of a deployed instance.
    ///
    /// Returns `None` when no service is recorded. A recorded service that
    /// no longer exists is cleared from state.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider call or checkpoint fails.
    pub async fn get(
        &self,
        instance: &ServiceInstance,
        state: &mut ProvisioningState,
        checkpoint: &Checkpointer<'_>,
    ) -> Result<Option<ServiceOutputs>> {
        let Some(recorded) = state.service.clone() else {
            debug!("No service recorded for {}", instance.name);
            return Ok(None);
        };

        let component = self
            .registry
            .load(ComponentParams::Service(ServiceParams::for_removal(instance)))?;
        let Some(live) = component
            .get(&ComponentOutput::Service(recorded.clone()))
            .await?
        else {
            warn!("Service {} no longer exists", recorded.service_name);
            state.service = None;
            checkpoint.save(state).await?;
            return Ok(None);
        };
        let service = live.into_service()?;

        if !self.timing.refresh_settle().is_zero() {
            debug!("Waiting {:?} before refreshing", self.timing.refresh_settle());
            tokio::time::sleep(self.timing.refresh_settle()).await;
        }

        let report = self
            .poll(instance, &service, self.timing.deploy_attempts)
            .await?;
        let converged = self.merge(report, state, checkpoint).await?;

        Ok(Some(Self::outputs(&recorded, state, converged)))
    }

    /// Registers the task definition unless an identical one is recorded.
    async fn ensure_task_definition(
        &self,
        instance: &ServiceInstance,
        state: &mut ProvisioningState,
        checkpoint: &Checkpointer<'_>,
    ) -> Result<TaskDefinitionRef> {
        let fingerprint = ConfigHasher::new().hash_task_definition(instance);

        if let Some(td) = &state.task_definition
            && state.task_definition_hash.as_deref() == Some(fingerprint.as_str())
        {
            debug!("Task definition {} is up to date", td.family_revision());
            return Ok(td.clone());
        }

        let component = self.registry.load(ComponentParams::TaskDefinition(
            TaskDefinitionParams::for_instance(instance),
        ))?;
        let prev = state
            .task_definition
            .clone()
            .map(ComponentOutput::TaskDefinition);
        let td = component.deploy(prev.as_ref()).await?.into_task_definition()?;

        state.task_definition = Some(td.clone());
        state.task_definition_hash = Some(fingerprint);
        checkpoint.save(state).await?;
        Ok(td)
    }

    async fn reconcile_tags(
        &self,
        instance: &ServiceInstance,
        service: &ServiceRef,
        state: &mut ProvisioningState,
        checkpoint: &Checkpointer<'_>,
    ) -> Result<()> {
        let reconciler = AttributeReconciler::new();
        let changes = reconciler.diff(&instance.tags, &state.tags);
        if changes.is_empty() {
            return Ok(());
        }

        let tagger = ResourceTagger::new(self.client, &service.service_arn);
        reconciler.apply(&changes, &tagger).await?;
        state.tags.clone_from(&instance.tags);
        checkpoint.save(state).await
    }

    async fn poll(
        &self,
        instance: &ServiceInstance,
        service: &ServiceRef,
        max_attempts: u32,
    ) -> Result<ConvergenceReport> {
        let cluster = service.cluster.as_deref();
        let task_arns = self
            .client
            .list_tasks(cluster, &service.service_name)
            .await?;
        debug!("Service {} has {} tasks", instance.name, task_arns.len());

        ConvergencePoller::new(self.client, cluster, self.timing.poll_interval())
            .await_convergence(&task_arns, max_attempts)
            .await
    }

    /// Records the observed task metadata and returns whether it converged.
    async fn merge(
        &self,
        report: ConvergenceReport,
        state: &mut ProvisioningState,
        checkpoint: &Checkpointer<'_>,
    ) -> Result<bool> {
        let cluster = state.service.as_ref().and_then(|s| s.cluster.clone());
        let metadata = ConvergencePoller::new(
            self.client,
            cluster.as_deref(),
            self.timing.poll_interval(),
        )
        .aggregate(&report.tasks)
        .await?;

        state.containers = metadata.containers;
        state.attachments = metadata.attachments;
        state.network_interfaces = metadata.network_interfaces;
        checkpoint.save(state).await?;

        if !report.converged {
            warn!("Tasks have not converged; recorded the latest observation");
        }
        Ok(report.converged)
    }

    fn outputs(service: &ServiceRef, state: &ProvisioningState, converged: bool) -> ServiceOutputs {
        ServiceOutputs {
            service_name: service.service_name.clone(),
            service_arn: service.service_arn.clone(),
            task_definition: state
                .task_definition
                .as_ref()
                .map(TaskDefinitionRef::family_revision),
            containers: state.containers.clone(),
            attachments: state.attachments.clone(),
            network_interfaces: state.network_interfaces.clone(),
            converged,
        }
    }
}

impl std::fmt::Debug for ComputeOrchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeOrchestrator")
            .field("backend", &self.client.backend_type())
            .field("registry", &self.registry)
            .field("timing", &self.timing)
            .finish()
    }
}
