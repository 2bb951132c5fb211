//! Provider-side resource shapes.
//!
//! These types are the provider-neutral view of what the network and compute
//! APIs return. They are persisted inside the provisioning state, so every
//! type here is serializable.

use serde::{Deserialize, Serialize};

/// Implicit gateway id of the route every route table carries.
pub const LOCAL_GATEWAY: &str = "local";

/// Attachment detail name carrying an elastic network interface id.
pub const NETWORK_INTERFACE_DETAIL: &str = "networkInterfaceId";

/// Lowest reserved ACL rule number.
pub const ACL_RULE_FLOOR: i32 = 1;

/// Highest reserved ACL rule number (the implicit default rule).
pub const ACL_RULE_CEILING: i32 = 32767;

/// An asynchronous compute task belonging to a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task ARN.
    pub task_arn: String,
    /// Status the scheduler is driving the task to.
    #[serde(default)]
    pub desired_status: Option<String>,
    /// Last observed status.
    #[serde(default)]
    pub last_status: Option<String>,
    /// Containers running in the task.
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Attachments (network interfaces, ...).
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A container running inside a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Container name.
    pub name: String,
    /// Container ARN.
    #[serde(default)]
    pub container_arn: Option<String>,
    /// ARN of the owning task.
    #[serde(default)]
    pub task_arn: Option<String>,
    /// Image the container runs.
    #[serde(default)]
    pub image: Option<String>,
    /// Last observed status.
    #[serde(default)]
    pub last_status: Option<String>,
}

/// A task attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment id.
    pub id: String,
    /// Attachment type (e.g. `ElasticNetworkInterface`).
    #[serde(default)]
    pub attachment_type: Option<String>,
    /// Attachment status.
    #[serde(default)]
    pub status: Option<String>,
    /// Name/value details.
    #[serde(default)]
    pub details: Vec<AttachmentDetail>,
}

/// A single name/value detail of an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDetail {
    /// Detail name.
    pub name: String,
    /// Detail value.
    pub value: String,
}

/// A resolved network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Interface id.
    pub network_interface_id: String,
    /// Subnet the interface lives in.
    #[serde(default)]
    pub subnet_id: Option<String>,
    /// Private IPv4 address.
    #[serde(default)]
    pub private_ip_address: Option<String>,
    /// Public IPv4 address, when one is associated.
    #[serde(default)]
    pub public_ip: Option<String>,
    /// MAC address.
    #[serde(default)]
    pub mac_address: Option<String>,
}

/// Destination of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDestination {
    /// IPv4 CIDR block.
    Ipv4(String),
    /// IPv6 CIDR block.
    Ipv6(String),
}

/// A route of a route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Where the route sends traffic.
    pub destination: RouteDestination,
    /// Gateway the route points at (`local` for the implicit route).
    pub gateway_id: Option<String>,
}

/// An entry of a network ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    /// Rule number.
    pub rule_number: i32,
    /// Whether the entry applies to outbound traffic.
    pub egress: bool,
}

/// Direction of a security rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    /// Inbound traffic.
    Ingress,
    /// Outbound traffic.
    Egress,
}

/// An all-protocol, all-port security rule over a set of CIDR ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    /// Direction the rule applies to.
    pub direction: RuleDirection,
    /// IPv4 ranges.
    pub ipv4_ranges: Vec<String>,
    /// IPv6 ranges.
    pub ipv6_ranges: Vec<String>,
}

impl Task {
    /// Returns true once the observed status matches the desired one.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.desired_status == self.last_status
    }
}

impl Attachment {
    /// Returns the network interface ids carried by this attachment.
    pub fn network_interface_ids(&self) -> impl Iterator<Item = &str> {
        self.details
            .iter()
            .filter(|d| d.name == NETWORK_INTERFACE_DETAIL)
            .map(|d| d.value.as_str())
    }
}

impl Route {
    /// Returns true for the implicit `local` route, which cannot be deleted.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.gateway_id.as_deref() == Some(LOCAL_GATEWAY)
    }
}

impl AclEntry {
    /// Returns true if the entry lies strictly between the reserved bounds.
    #[must_use]
    pub const fn is_removable(&self) -> bool {
        self.rule_number > ACL_RULE_FLOOR && self.rule_number < ACL_RULE_CEILING
    }
}

impl SecurityRule {
    /// Allow all inbound traffic from anywhere.
    #[must_use]
    pub fn allow_all_ingress() -> Self {
        Self {
            direction: RuleDirection::Ingress,
            ipv4_ranges: vec![String::from("0.0.0.0/0")],
            ipv6_ranges: vec![String::from("::/0")],
        }
    }

    /// Allow all outbound IPv6 traffic; IPv4 egress is open by default.
    #[must_use]
    pub fn allow_all_egress() -> Self {
        Self {
            direction: RuleDirection::Egress,
            ipv4_ranges: vec![],
            ipv6_ranges: vec![String::from("::/0")],
        }
    }
}

impl std::fmt::Display for RouteDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ipv4(cidr) | Self::Ipv6(cidr) => write!(f, "{cidr}"),
        }
    }
}
