//! Configuration module for the Halldyll Fargate deployment system.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `halldyll.fargate.yaml`
//! - Validation of configuration values
//! - Computing configuration hashes for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{
    ContainerSpec, DeployConfig, NETWORK_CIDR, NetworkConfig, PortConfig, PortProtocol,
    ProjectConfig, SUBNET_CIDR, ServiceInstance, StateBackend, StateConfig, TimingConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
