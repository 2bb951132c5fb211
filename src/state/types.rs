//! State types for tracking provisioned resources.
//!
//! A [`ProvisioningState`] is the only durable record of what exists on the
//! provider side. A network role id is present if and only if the resource
//! exists, so presence alone decides whether a creation step must run.
//! Follow-up calls on an existing role are tracked as [`NetworkStep`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, StateError};
use crate::provider::{Attachment, Container, NetworkInterface};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept in state.
const MAX_HISTORY: usize = 100;

/// A role in the private-network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRole {
    /// Virtual network.
    Network,
    /// Internet gateway, attached to the network.
    Gateway,
    /// Security policy (security group).
    SecurityPolicy,
    /// Network ACL.
    Acl,
    /// Route table with default routes through the gateway.
    RouteTable,
    /// Subnet.
    Subnet,
    /// Association of the route table with the subnet.
    Association,
}

impl ResourceRole {
    /// Order in which roles are created. Teardown walks it backwards.
    pub const CREATION_ORDER: [Self; 7] = [
        Self::Network,
        Self::Gateway,
        Self::SecurityPolicy,
        Self::Acl,
        Self::RouteTable,
        Self::Subnet,
        Self::Association,
    ];

    /// Returns the roles in teardown order.
    pub fn teardown_order() -> impl Iterator<Item = Self> {
        Self::CREATION_ORDER.into_iter().rev()
    }

    /// Returns the role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Gateway => "gateway",
            Self::SecurityPolicy => "security policy",
            Self::Acl => "acl",
            Self::RouteTable => "route table",
            Self::Subnet => "subnet",
            Self::Association => "association",
        }
    }
}

/// A follow-up call made on a role after it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStep {
    /// Gateway attached to the network.
    AttachGateway,
    /// Allow-all ingress rule on the security policy.
    AuthorizeIngress,
    /// Allow-all egress rule on the security policy.
    AuthorizeEgress,
    /// IPv4 default route through the gateway.
    DefaultRouteV4,
    /// IPv6 default route through the gateway.
    DefaultRouteV6,
}

impl NetworkStep {
    /// Returns the follow-up steps of a role, in execution order.
    #[must_use]
    pub const fn for_role(role: ResourceRole) -> &'static [Self] {
        match role {
            ResourceRole::Gateway => &[Self::AttachGateway],
            ResourceRole::SecurityPolicy => &[Self::AuthorizeIngress, Self::AuthorizeEgress],
            ResourceRole::RouteTable => &[Self::DefaultRouteV4, Self::DefaultRouteV6],
            ResourceRole::Network
            | ResourceRole::Acl
            | ResourceRole::Subnet
            | ResourceRole::Association => &[],
        }
    }

    /// Returns the role the step belongs to.
    #[must_use]
    pub const fn role(self) -> ResourceRole {
        match self {
            Self::AttachGateway => ResourceRole::Gateway,
            Self::AuthorizeIngress | Self::AuthorizeEgress => ResourceRole::SecurityPolicy,
            Self::DefaultRouteV4 | Self::DefaultRouteV6 => ResourceRole::RouteTable,
        }
    }

    /// Returns the step name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AttachGateway => "attach gateway",
            Self::AuthorizeIngress => "authorize ingress",
            Self::AuthorizeEgress => "authorize egress",
            Self::DefaultRouteV4 => "ipv4 default route",
            Self::DefaultRouteV6 => "ipv6 default route",
        }
    }
}

/// Recorded identifiers of the private-network stack, one slot per role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIds {
    /// Network id.
    #[serde(default)]
    pub network_id: Option<String>,
    /// Gateway id.
    #[serde(default)]
    pub gateway_id: Option<String>,
    /// Security policy id.
    #[serde(default)]
    pub security_policy_id: Option<String>,
    /// ACL id.
    #[serde(default)]
    pub acl_id: Option<String>,
    /// Route table id.
    #[serde(default)]
    pub route_table_id: Option<String>,
    /// Subnet id.
    #[serde(default)]
    pub subnet_id: Option<String>,
    /// Route table association id.
    #[serde(default)]
    pub association_id: Option<String>,
    /// Follow-up steps completed on recorded roles.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub completed: BTreeSet<NetworkStep>,
}

impl NetworkIds {
    const fn slot(&self, role: ResourceRole) -> &Option<String> {
        match role {
            ResourceRole::Network => &self.network_id,
            ResourceRole::Gateway => &self.gateway_id,
            ResourceRole::SecurityPolicy => &self.security_policy_id,
            ResourceRole::Acl => &self.acl_id,
            ResourceRole::RouteTable => &self.route_table_id,
            ResourceRole::Subnet => &self.subnet_id,
            ResourceRole::Association => &self.association_id,
        }
    }

    const fn slot_mut(&mut self, role: ResourceRole) -> &mut Option<String> {
        match role {
            ResourceRole::Network => &mut self.network_id,
            ResourceRole::Gateway => &mut self.gateway_id,
            ResourceRole::SecurityPolicy => &mut self.security_policy_id,
            ResourceRole::Acl => &mut self.acl_id,
            ResourceRole::RouteTable => &mut self.route_table_id,
            ResourceRole::Subnet => &mut self.subnet_id,
            ResourceRole::Association => &mut self.association_id,
        }
    }

    /// Gets the recorded id for a role.
    #[must_use]
    pub fn get(&self, role: ResourceRole) -> Option<&str> {
        self.slot(role).as_deref()
    }

    /// Records the id for a role.
    pub fn set(&mut self, role: ResourceRole, id: impl Into<String>) {
        *self.slot_mut(role) = Some(id.into());
    }

    /// Clears the id for a role and its completed steps, returning the
    /// previous id.
    pub fn clear(&mut self, role: ResourceRole) -> Option<String> {
        self.completed.retain(|step| step.role() != role);
        self.slot_mut(role).take()
    }

    /// Returns true if a follow-up step has completed.
    #[must_use]
    pub fn is_done(&self, step: NetworkStep) -> bool {
        self.completed.contains(&step)
    }

    /// Marks a follow-up step as completed.
    pub fn mark_done(&mut self, step: NetworkStep) {
        self.completed.insert(step);
    }

    /// Returns the follow-up steps of recorded roles that have not completed.
    pub fn pending_steps(&self) -> impl Iterator<Item = NetworkStep> + '_ {
        self.present()
            .flat_map(|(role, _)| NetworkStep::for_role(role).iter().copied())
            .filter(move |step| !self.is_done(*step))
    }

    /// Returns true if no role is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        ResourceRole::CREATION_ORDER
            .iter()
            .all(|role| self.get(*role).is_none())
    }

    /// Returns the recorded roles in creation order.
    pub fn present(&self) -> impl Iterator<Item = (ResourceRole, &str)> {
        ResourceRole::CREATION_ORDER
            .into_iter()
            .filter_map(|role| self.get(role).map(|id| (role, id)))
    }
}

/// Reference to a registered task definition revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinitionRef {
    /// Task definition family.
    pub family: String,
    /// Revision number.
    pub revision: i32,
    /// Task definition ARN.
    pub arn: String,
}

impl TaskDefinitionRef {
    /// Returns the `family:revision` identifier services are created from.
    #[must_use]
    pub fn family_revision(&self) -> String {
        format!("{}:{}", self.family, self.revision)
    }
}

/// Reference to a running service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    /// Service name.
    pub service_name: String,
    /// Service ARN.
    pub service_arn: String,
    /// Cluster the service runs in (default cluster when absent).
    #[serde(default)]
    pub cluster: Option<String>,
}

/// The complete provisioning state of one service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningState {
    /// State format version.
    pub version: String,
    /// Instance key (the service name).
    pub instance: String,
    /// Hash of the last applied configuration.
    #[serde(default)]
    pub config_hash: String,
    /// Fingerprint of the registered task definition inputs.
    #[serde(default)]
    pub task_definition_hash: Option<String>,
    /// Private-network stack ids.
    #[serde(default)]
    pub network: NetworkIds,
    /// Registered task definition.
    #[serde(default)]
    pub task_definition: Option<TaskDefinitionRef>,
    /// Created service.
    #[serde(default)]
    pub service: Option<ServiceRef>,
    /// Containers observed on the last poll.
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Task attachments observed on the last poll.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Network interfaces resolved on the last poll.
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    /// Tags applied to the service.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Operation history (recent entries).
    #[serde(default)]
    pub history: Vec<OperationHistoryEntry>,
}

/// Types of lifecycle operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create or update.
    Deploy,
    /// Refresh of the observed tasks.
    Refresh,
    /// Teardown.
    Remove,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationHistoryEntry {
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: Operation,
    /// Configuration hash at the time of the operation.
    pub config_hash: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

impl ProvisioningState {
    /// Creates an empty state for an instance.
    #[must_use]
    pub fn new(instance: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            instance: instance.to_string(),
            config_hash: String::new(),
            task_definition_hash: None,
            network: NetworkIds::default(),
            task_definition: None,
            service: None,
            containers: Vec::new(),
            attachments: Vec::new(),
            network_interfaces: Vec::new(),
            tags: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Checks that the state was written by a compatible version.
    ///
    /// # Errors
    ///
    /// Returns an error if the format version differs.
    pub fn check_version(&self) -> Result<()> {
        if self.version == STATE_VERSION {
            Ok(())
        } else {
            Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: self.version.clone(),
            }
            .into())
        }
    }

    /// Parses a serialized state and checks its version.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a valid state.
    pub fn from_json(content: &str) -> Result<Self> {
        let state: Self = serde_json::from_str(content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse state: {e}"),
        })?;
        state.check_version()?;
        Ok(state)
    }

    /// Serializes the state.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")).into())
    }

    /// Marks the state as modified.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Returns true if nothing is provisioned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.network.is_empty() && self.task_definition.is_none() && self.service.is_none()
    }

    /// Resets every resource record, keeping identity and history.
    pub fn clear(&mut self) {
        self.config_hash.clear();
        self.task_definition_hash = None;
        self.network = NetworkIds::default();
        self.task_definition = None;
        self.service = None;
        self.containers.clear();
        self.attachments.clear();
        self.network_interfaces.clear();
        self.tags.clear();
        self.touch();
    }

    /// Adds a history entry, dropping the oldest beyond the cap.
    pub fn add_history(&mut self, entry: OperationHistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }
}

impl OperationHistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: Operation, config_hash: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: Operation, config_hash: &str, error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            success: false,
            ..Self::new(operation, config_hash)
        }
    }
}

impl std::fmt::Display for ResourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Display for NetworkStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Deploy => "deploy",
            Self::Refresh => "refresh",
            Self::Remove => "remove",
        };
        write!(f, "{op}")
    }
}
