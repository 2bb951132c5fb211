//! Configuration specification types for the deployment system.
//!
//! This module defines all the structs that map to the `halldyll.fargate.yaml`
//! file. They describe the desired service declaratively; the orchestrator
//! converges the provider towards them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// CIDR block of the provisioned network.
pub const NETWORK_CIDR: &str = "10.0.0.0/16";

/// CIDR block of the provisioned subnet (spans the whole network).
pub const SUBNET_CIDR: &str = "10.0.0.0/16";

/// The root configuration structure for a Halldyll Fargate deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// The service to run.
    pub service: ServiceInstance,
    /// Wait and retry tuning.
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// AWS region for the service (AWS default chain if not specified).
    #[serde(default)]
    pub region: Option<String>,
}

/// State backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Backend type (local or s3).
    #[serde(default)]
    pub backend: StateBackend,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
    /// Local state directory (for local backend).
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based state storage.
    #[default]
    Local,
    /// AWS S3-based state storage.
    S3,
}

/// A Fargate service and the containers it runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInstance {
    /// Service name; also the state key of the instance.
    pub name: String,
    /// Cluster to run in (default cluster if not specified).
    #[serde(default)]
    pub cluster: Option<String>,
    /// Task CPU units (256 = 0.25 vCPU).
    pub cpu: u32,
    /// Task memory in MiB.
    pub memory: u32,
    /// Containers of the task definition.
    pub containers: Vec<ContainerSpec>,
    /// Number of tasks to keep running.
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,
    /// Whether tasks get a public IP.
    #[serde(default)]
    pub expose_publicly: bool,
    /// Existing network to run in. A private network is provisioned if absent.
    #[serde(default)]
    pub network: Option<NetworkConfig>,
    /// Tags applied to the service.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A container of the task definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Container image.
    pub image: String,
    /// CPU units reserved for the container.
    #[serde(default)]
    pub cpu: Option<u32>,
    /// Hard memory limit in MiB.
    #[serde(default)]
    pub memory: Option<u32>,
    /// Whether the task stops when this container stops.
    #[serde(default = "default_essential")]
    pub essential: bool,
    /// Port mappings, written as `PORT/PROTOCOL`.
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    /// Environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Optional command override.
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

/// Port mapping of a container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct PortConfig {
    /// Container port.
    pub port: u16,
    /// Transport protocol.
    pub protocol: PortProtocol,
}

/// Port protocol types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    /// TCP protocol.
    #[default]
    Tcp,
    /// UDP protocol.
    Udp,
}

/// Caller-supplied network placement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Security group ids.
    pub security_groups: Vec<String>,
    /// Subnet ids.
    pub subnets: Vec<String>,
}

/// Wait intervals and attempt budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingConfig {
    /// Seconds to wait after the service is created before polling tasks.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Seconds to wait before polling tasks on refresh.
    #[serde(default = "default_refresh_settle_secs")]
    pub refresh_settle_secs: u64,
    /// Seconds between two poll rounds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Poll rounds allowed after a deploy.
    #[serde(default = "default_deploy_attempts")]
    pub deploy_attempts: u32,
    /// Poll rounds allowed while tasks drain on teardown.
    #[serde(default = "default_teardown_attempts")]
    pub teardown_attempts: u32,
}

// Default value functions

const fn default_desired_count() -> u32 {
    1
}

const fn default_essential() -> bool {
    true
}

const fn default_settle_secs() -> u64 {
    15
}

const fn default_refresh_settle_secs() -> u64 {
    40
}

const fn default_poll_interval_secs() -> u64 {
    10
}

const fn default_deploy_attempts() -> u32 {
    10
}

const fn default_teardown_attempts() -> u32 {
    5
}

fn default_environment() -> String {
    String::from("dev")
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_secs: default_settle_secs(),
            refresh_settle_secs: default_refresh_settle_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            deploy_attempts: default_deploy_attempts(),
            teardown_attempts: default_teardown_attempts(),
        }
    }
}

impl TimingConfig {
    /// Timing with no waits, for driving the orchestrator in tests.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            settle_secs: 0,
            refresh_settle_secs: 0,
            poll_interval_secs: 0,
            deploy_attempts: default_deploy_attempts(),
            teardown_attempts: default_teardown_attempts(),
        }
    }

    /// Settle interval after a deploy.
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    /// Settle interval before a refresh.
    #[must_use]
    pub const fn refresh_settle(&self) -> Duration {
        Duration::from_secs(self.refresh_settle_secs)
    }

    /// Interval between poll rounds.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// Port config string conversion

impl TryFrom<String> for PortConfig {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PortConfig> for String {
    fn from(port: PortConfig) -> Self {
        format!("{}/{}", port.port, port.protocol)
    }
}

impl PortConfig {
    /// Parses a port mapping from a string like `8080/tcp`.
    ///
    /// A bare port number defaults to TCP.
    ///
    /// # Errors
    ///
    /// Returns an error if the port format is invalid.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (port, protocol) = s.split_once('/').unwrap_or((s, "tcp"));

        let port = port
            .parse::<u16>()
            .map_err(|_| format!("Invalid port number: {port}"))?;

        let protocol = match protocol.to_lowercase().as_str() {
            "tcp" => PortProtocol::Tcp,
            "udp" => PortProtocol::Udp,
            other => return Err(format!("Invalid protocol: {other}. Expected: tcp or udp")),
        };

        Ok(Self { port, protocol })
    }

    /// Creates a new port mapping.
    #[must_use]
    pub const fn new(port: u16, protocol: PortProtocol) -> Self {
        Self { port, protocol }
    }
}

impl std::fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

impl DeployConfig {
    /// Returns the fully qualified project name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }
}

impl ServiceInstance {
    /// Returns the key the instance's state is stored under.
    #[must_use]
    pub fn state_key(&self) -> &str {
        &self.name
    }

    /// Returns the task definition family.
    #[must_use]
    pub fn task_family(&self) -> String {
        format!("{}-family", self.name)
    }

    /// Returns the name of the provisioned security group.
    #[must_use]
    pub fn security_group_name(&self) -> String {
        format!("{}-security-group", self.name)
    }

    /// Returns the description of the provisioned security group.
    #[must_use]
    pub fn security_group_description(&self) -> String {
        format!("{} security group", self.name)
    }

    /// Returns true if the caller supplied the network placement.
    #[must_use]
    pub const fn has_explicit_network(&self) -> bool {
        self.network.is_some()
    }
}
