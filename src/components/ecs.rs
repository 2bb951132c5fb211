//! ECS-backed components.

use async_trait::async_trait;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, Compatibility, ContainerDefinition, KeyValuePair,
    LaunchType, NetworkConfiguration, NetworkMode, PortMapping, TransportProtocol,
};
use tracing::{debug, info};

use crate::config::{ContainerSpec, PortProtocol};
use crate::error::{HalldyllError, ProviderError, Result};
use crate::provider::{call_failed, required};
use crate::state::{ServiceRef, TaskDefinitionRef};

use super::{Component, ComponentKind, ComponentOutput, ServiceParams, TaskDefinitionParams};

/// Status ECS reports for a deleted service.
const SERVICE_INACTIVE: &str = "INACTIVE";

/// Converts a configured quantity into the API's integer type.
fn to_i32(value: u32, field: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| HalldyllError::internal(format!("{field} value {value} is out of range")))
}

/// A task definition family managed through ECS.
#[derive(Debug)]
pub struct EcsTaskDefinition {
    /// ECS client.
    client: aws_sdk_ecs::Client,
    /// Task definition parameters.
    params: TaskDefinitionParams,
}

impl EcsTaskDefinition {
    /// Creates a task definition handle.
    #[must_use]
    pub const fn new(client: aws_sdk_ecs::Client, params: TaskDefinitionParams) -> Self {
        Self { client, params }
    }

    fn container_definition(container: &ContainerSpec) -> Result<ContainerDefinition> {
        let port_mappings = container
            .ports
            .iter()
            .map(|port| {
                let protocol = match port.protocol {
                    PortProtocol::Tcp => TransportProtocol::Tcp,
                    PortProtocol::Udp => TransportProtocol::Udp,
                };
                PortMapping::builder()
                    .container_port(i32::from(port.port))
                    .protocol(protocol)
                    .build()
            })
            .collect::<Vec<_>>();

        let environment = container
            .environment
            .iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect::<Vec<_>>();

        Ok(ContainerDefinition::builder()
            .name(&container.name)
            .image(&container.image)
            .set_cpu(container.cpu.map(|cpu| to_i32(cpu, "cpu")).transpose()?)
            .set_memory(container.memory.map(|m| to_i32(m, "memory")).transpose()?)
            .essential(container.essential)
            .set_port_mappings(Some(port_mappings))
            .set_environment(Some(environment))
            .set_command(container.command.clone())
            .build())
    }

    fn prev_ref(prev: &ComponentOutput) -> Result<TaskDefinitionRef> {
        prev.clone().into_task_definition()
    }

    async fn deregister(&self, td: &TaskDefinitionRef) -> Result<()> {
        self.client
            .deregister_task_definition()
            .task_definition(td.family_revision())
            .send()
            .await
            .map_err(call_failed("DeregisterTaskDefinition"))?;

        info!("Task definition {} deregistered", td.family_revision());
        Ok(())
    }
}

#[async_trait]
impl Component for EcsTaskDefinition {
    fn kind(&self) -> ComponentKind {
        ComponentKind::TaskDefinition
    }

    async fn deploy(&self, prev: Option<&ComponentOutput>) -> Result<ComponentOutput> {
        let params = &self.params;
        let containers = params
            .containers
            .iter()
            .map(Self::container_definition)
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .register_task_definition()
            .family(&params.family)
            .network_mode(NetworkMode::Awsvpc)
            .requires_compatibilities(Compatibility::Fargate)
            .cpu(params.cpu.to_string())
            .memory(params.memory.to_string())
            .set_container_definitions(Some(containers))
            .send()
            .await
            .map_err(call_failed("RegisterTaskDefinition"))?;

        let td = output
            .task_definition()
            .ok_or_else(|| ProviderError::missing("RegisterTaskDefinition", "taskDefinition"))?;

        let registered = TaskDefinitionRef {
            family: required("RegisterTaskDefinition", "family", td.family())?,
            revision: td.revision(),
            arn: required(
                "RegisterTaskDefinition",
                "taskDefinitionArn",
                td.task_definition_arn(),
            )?,
        };
        info!("Task definition {} registered", registered.family_revision());

        if let Some(prev) = prev {
            let previous = Self::prev_ref(prev)?;
            if previous.arn != registered.arn {
                self.deregister(&previous).await?;
            }
        }

        Ok(ComponentOutput::TaskDefinition(registered))
    }

    async fn remove(&self, prev: &ComponentOutput) -> Result<()> {
        self.deregister(&Self::prev_ref(prev)?).await
    }

    async fn get(&self, prev: &ComponentOutput) -> Result<Option<ComponentOutput>> {
        let previous = Self::prev_ref(prev)?;

        let output = self
            .client
            .describe_task_definition()
            .task_definition(&previous.arn)
            .send()
            .await
            .map_err(call_failed("DescribeTaskDefinition"))?;

        let active = output
            .task_definition()
            .and_then(|td| td.status())
            .is_some_and(|status| status.as_str() == "ACTIVE");

        debug!("Task definition {} active: {active}", previous.family_revision());
        Ok(active.then_some(ComponentOutput::TaskDefinition(previous)))
    }
}

/// A Fargate service managed through ECS.
#[derive(Debug)]
pub struct EcsService {
    /// ECS client.
    client: aws_sdk_ecs::Client,
    /// Service parameters.
    params: ServiceParams,
}

impl EcsService {
    /// Creates a service handle.
    #[must_use]
    pub const fn new(client: aws_sdk_ecs::Client, params: ServiceParams) -> Self {
        Self { client, params }
    }

    fn network_configuration(&self) -> Result<NetworkConfiguration> {
        let assign_public_ip = if self.params.assign_public_ip {
            AssignPublicIp::Enabled
        } else {
            AssignPublicIp::Disabled
        };

        let vpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(self.params.subnets.clone()))
            .set_security_groups(Some(self.params.security_groups.clone()))
            .assign_public_ip(assign_public_ip)
            .build()
            .map_err(|e| HalldyllError::internal(format!("Invalid network configuration: {e}")))?;

        Ok(NetworkConfiguration::builder().awsvpc_configuration(vpc).build())
    }

    fn service_ref(
        &self,
        operation: &str,
        service: Option<&aws_sdk_ecs::types::Service>,
    ) -> Result<ServiceRef> {
        let service = service.ok_or_else(|| ProviderError::missing(operation, "service"))?;

        Ok(ServiceRef {
            service_name: required(operation, "serviceName", service.service_name())?,
            service_arn: required(operation, "serviceArn", service.service_arn())?,
            cluster: self.params.cluster.clone(),
        })
    }
}

#[async_trait]
impl Component for EcsService {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Service
    }

    async fn deploy(&self, prev: Option<&ComponentOutput>) -> Result<ComponentOutput> {
        let desired_count = to_i32(self.params.desired_count, "desired_count")?;
        let network = self.network_configuration()?;

        let service = if let Some(prev) = prev {
            let previous = prev.clone().into_service()?;
            let output = self
                .client
                .update_service()
                .service(&previous.service_name)
                .set_cluster(self.params.cluster.clone())
                .desired_count(desired_count)
                .task_definition(&self.params.task_definition)
                .network_configuration(network)
                .send()
                .await
                .map_err(call_failed("UpdateService"))?;

            info!("Service {} updated", previous.service_name);
            self.service_ref("UpdateService", output.service())?
        } else {
            let output = self
                .client
                .create_service()
                .service_name(&self.params.service_name)
                .set_cluster(self.params.cluster.clone())
                .launch_type(LaunchType::Fargate)
                .desired_count(desired_count)
                .task_definition(&self.params.task_definition)
                .network_configuration(network)
                .send()
                .await
                .map_err(call_failed("CreateService"))?;

            info!("Service {} created", self.params.service_name);
            self.service_ref("CreateService", output.service())?
        };

        Ok(ComponentOutput::Service(service))
    }

    async fn remove(&self, prev: &ComponentOutput) -> Result<()> {
        let previous = prev.clone().into_service()?;

        self.client
            .delete_service()
            .service(&previous.service_name)
            .set_cluster(previous.cluster.clone())
            .force(true)
            .send()
            .await
            .map_err(call_failed("DeleteService"))?;

        info!("Service {} deleted", previous.service_name);
        Ok(())
    }

    async fn get(&self, prev: &ComponentOutput) -> Result<Option<ComponentOutput>> {
        let previous = prev.clone().into_service()?;

        let output = self
            .client
            .describe_services()
            .services(&previous.service_name)
            .set_cluster(previous.cluster.clone())
            .send()
            .await
            .map_err(call_failed("DescribeServices"))?;

        let live = output
            .services()
            .iter()
            .find(|s| s.status() != Some(SERVICE_INACTIVE));

        live.map(|service| {
            self.service_ref("DescribeServices", Some(service))
                .map(ComponentOutput::Service)
        })
        .transpose()
    }
}
