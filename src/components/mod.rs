//! Sub-resource components.
//!
//! The task definition and the service are managed as components: handles
//! built by a [`ComponentRegistry`] from typed parameters, each exposing
//! `deploy`, `remove` and `get` against the ref recorded in state.

mod ecs;
mod registry;

pub use ecs::{EcsService, EcsTaskDefinition};
pub use registry::{ComponentConstructor, ComponentRegistry};

use async_trait::async_trait;

use crate::config::{ContainerSpec, ServiceInstance};
use crate::error::{ComponentError, Result};
use crate::state::{ServiceRef, TaskDefinitionRef};

/// Kind tag of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Task definition revision.
    TaskDefinition,
    /// Service running the task definition.
    Service,
}

/// Parameters of a task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinitionParams {
    /// Task definition family.
    pub family: String,
    /// Task CPU units.
    pub cpu: u32,
    /// Task memory in MiB.
    pub memory: u32,
    /// Container definitions.
    pub containers: Vec<ContainerSpec>,
}

/// Parameters of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceParams {
    /// Service name.
    pub service_name: String,
    /// Cluster (default cluster when absent).
    pub cluster: Option<String>,
    /// Number of tasks to keep running.
    pub desired_count: u32,
    /// `family:revision` of the task definition to run.
    pub task_definition: String,
    /// Whether tasks get a public IP.
    pub assign_public_ip: bool,
    /// Security group ids.
    pub security_groups: Vec<String>,
    /// Subnet ids.
    pub subnets: Vec<String>,
}

/// Parameters a component is constructed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentParams {
    /// Task definition parameters.
    TaskDefinition(TaskDefinitionParams),
    /// Service parameters.
    Service(ServiceParams),
}

/// What a component reports after deploying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentOutput {
    /// A registered task definition.
    TaskDefinition(TaskDefinitionRef),
    /// A created or updated service.
    Service(ServiceRef),
}

/// A polymorphic sub-resource handle.
#[async_trait]
pub trait Component: Send + Sync {
    /// Gets the kind of this component.
    fn kind(&self) -> ComponentKind;

    /// Creates the sub-resource, or updates it when `prev` is recorded.
    async fn deploy(&self, prev: Option<&ComponentOutput>) -> Result<ComponentOutput>;

    /// Removes the sub-resource recorded in `prev`.
    async fn remove(&self, prev: &ComponentOutput) -> Result<()>;

    /// Describes the sub-resource recorded in `prev`.
    ///
    /// Returns `None` if it no longer exists.
    async fn get(&self, prev: &ComponentOutput) -> Result<Option<ComponentOutput>>;
}

impl ComponentKind {
    /// Returns the kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskDefinition => "task-definition",
            Self::Service => "service",
        }
    }
}

impl TaskDefinitionParams {
    /// Builds task definition parameters for a service instance.
    #[must_use]
    pub fn for_instance(instance: &ServiceInstance) -> Self {
        Self {
            family: instance.task_family(),
            cpu: instance.cpu,
            memory: instance.memory,
            containers: instance.containers.clone(),
        }
    }
}

impl ServiceParams {
    /// Builds service parameters for a service instance.
    #[must_use]
    pub fn for_instance(
        instance: &ServiceInstance,
        task_definition: &TaskDefinitionRef,
        security_groups: Vec<String>,
        subnets: Vec<String>,
    ) -> Self {
        Self {
            service_name: instance.name.clone(),
            cluster: instance.cluster.clone(),
            desired_count: instance.desired_count,
            task_definition: task_definition.family_revision(),
            assign_public_ip: instance.expose_publicly,
            security_groups,
            subnets,
        }
    }

    /// Builds the parameters needed to look up or remove a recorded service.
    #[must_use]
    pub fn for_removal(instance: &ServiceInstance) -> Self {
        Self {
            service_name: instance.name.clone(),
            cluster: instance.cluster.clone(),
            desired_count: 0,
            task_definition: String::new(),
            assign_public_ip: false,
            security_groups: Vec::new(),
            subnets: Vec::new(),
        }
    }
}

impl ComponentParams {
    /// Gets the kind of component these parameters construct.
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        match self {
            Self::TaskDefinition(_) => ComponentKind::TaskDefinition,
            Self::Service(_) => ComponentKind::Service,
        }
    }
}

impl ComponentOutput {
    /// Gets the kind of component that produced this output.
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        match self {
            Self::TaskDefinition(_) => ComponentKind::TaskDefinition,
            Self::Service(_) => ComponentKind::Service,
        }
    }

    /// Unwraps a task definition ref.
    ///
    /// # Errors
    ///
    /// Returns an error if the output is of another kind.
    pub fn into_task_definition(self) -> Result<TaskDefinitionRef> {
        match self {
            Self::TaskDefinition(td) => Ok(td),
            other => Err(other.unexpected(ComponentKind::TaskDefinition)),
        }
    }

    /// Unwraps a service ref.
    ///
    /// # Errors
    ///
    /// Returns an error if the output is of another kind.
    pub fn into_service(self) -> Result<ServiceRef> {
        match self {
            Self::Service(service) => Ok(service),
            other => Err(other.unexpected(ComponentKind::Service)),
        }
    }

    fn unexpected(&self, expected: ComponentKind) -> crate::error::HalldyllError {
        ComponentError::UnexpectedOutput {
            kind: expected.to_string(),
            output: format!("{} output", self.kind()),
        }
        .into()
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_config;

    #[test]
    fn test_params_from_instance() {
        let config = sample_config("web");
        let td = TaskDefinitionParams::for_instance(&config.service);
        assert_eq!(td.family, "web-family");
        assert_eq!(td.containers.len(), 1);

        let td_ref = TaskDefinitionRef {
            family: td.family,
            revision: 2,
            arn: String::from("arn:td/web-family:2"),
        };
        let service = ServiceParams::for_instance(
            &config.service,
            &td_ref,
            vec![String::from("sg-1")],
            vec![String::from("subnet-1")],
        );
        assert_eq!(service.task_definition, "web-family:2");
        assert_eq!(ComponentParams::Service(service).kind(), ComponentKind::Service);
    }

    #[test]
    fn test_output_kind_mismatch() {
        let output = ComponentOutput::Service(ServiceRef {
            service_name: String::from("web"),
            service_arn: String::from("arn:service/web"),
            cluster: None,
        });

        assert!(output.clone().into_service().is_ok());
        let err = output.into_task_definition().expect_err("kind mismatch");
        assert!(err.to_string().contains("unexpected output"));
    }
}
