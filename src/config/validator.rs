//! Configuration validation for deployment specs.
//!
//! This module validates deployment configurations before anything touches
//! the provider: names, Fargate task sizes, containers, network placement,
//! tags and timing.

use crate::error::{ConfigError, HalldyllError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{
    ContainerSpec, DeployConfig, NetworkConfig, ProjectConfig, ServiceInstance, StateBackend,
    StateConfig, TimingConfig,
};

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

/// Tag key prefix reserved by AWS.
const RESERVED_TAG_PREFIX: &str = "aws:";

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_state(&config.state, &mut result);
        Self::validate_service(&config.service, &mut result);
        Self::validate_timing(&config.timing, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(HalldyllError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates project configuration.
    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.error("project.name", "Project name cannot be empty");
        } else if !is_valid_name(&project.name) {
            result.error(
                "project.name",
                format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            );
        }

        if project.environment.is_empty() {
            result.error("project.environment", "Environment cannot be empty");
        }
    }

    /// Validates state configuration.
    fn validate_state(state: &StateConfig, result: &mut ValidationResult) {
        if state.backend == StateBackend::S3 && state.bucket.as_deref().is_none_or(str::is_empty) {
            result.error(
                "state.bucket",
                "S3 bucket name is required when using S3 backend",
            );
        }
    }

    /// Validates the service definition.
    fn validate_service(service: &ServiceInstance, result: &mut ValidationResult) {
        if !is_valid_name(&service.name) {
            result.error(
                "service.name",
                format!(
                    "Service name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    service.name
                ),
            );
        }

        if !is_valid_fargate_size(service.cpu, service.memory) {
            result.error(
                "service.memory",
                format!(
                    "{} MiB of memory is not a valid Fargate size for {} CPU units",
                    service.memory, service.cpu
                ),
            );
        }

        if service.desired_count == 0 {
            result
                .warnings
                .push(String::from("service.desired_count: 0 tasks will be started"));
        }

        Self::validate_containers(service, result);

        if let Some(network) = &service.network {
            Self::validate_network(network, result);
        }

        for key in service.tags.keys() {
            if key.is_empty() {
                result.error("service.tags", "Tag keys cannot be empty");
            } else if key.starts_with(RESERVED_TAG_PREFIX) {
                result.error(
                    format!("service.tags.{key}"),
                    format!("Tag keys starting with '{RESERVED_TAG_PREFIX}' are reserved"),
                );
            }
        }
    }

    /// Validates the containers of the task definition.
    fn validate_containers(service: &ServiceInstance, result: &mut ValidationResult) {
        if service.containers.is_empty() {
            result.error("service.containers", "At least one container is required");
            return;
        }

        if !service.containers.iter().any(|c| c.essential) {
            result.error(
                "service.containers",
                "At least one container must be essential",
            );
        }

        let mut seen_names = HashSet::new();
        for (i, container) in service.containers.iter().enumerate() {
            let prefix = format!("service.containers[{i}]");

            if !seen_names.insert(container.name.as_str()) {
                result.error(
                    format!("{prefix}.name"),
                    format!("Duplicate container name: {}", container.name),
                );
            }

            Self::validate_container(container, &prefix, result);
        }

        let total_cpu: u32 = service.containers.iter().filter_map(|c| c.cpu).sum();
        if total_cpu > service.cpu {
            result.error(
                "service.containers",
                format!(
                    "Containers reserve {total_cpu} CPU units but the task has {}",
                    service.cpu
                ),
            );
        }

        let total_memory: u32 = service.containers.iter().filter_map(|c| c.memory).sum();
        if total_memory > service.memory {
            result.error(
                "service.containers",
                format!(
                    "Containers reserve {total_memory} MiB but the task has {} MiB",
                    service.memory
                ),
            );
        }
    }

    /// Validates a single container.
    fn validate_container(container: &ContainerSpec, prefix: &str, result: &mut ValidationResult) {
        if container.name.is_empty() {
            result.error(format!("{prefix}.name"), "Container name cannot be empty");
        } else if !container
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            result.error(
                format!("{prefix}.name"),
                format!(
                    "Container name '{}' may only contain letters, digits, hyphens and underscores",
                    container.name
                ),
            );
        }

        if container.image.is_empty() {
            result.error(format!("{prefix}.image"), "Container image cannot be empty");
        } else if container.image.ends_with(":latest") {
            result.warnings.push(format!(
                "{prefix}.image: Using ':latest' tag is not recommended for production"
            ));
        }

        let mut seen_ports = HashSet::new();
        for (i, port) in container.ports.iter().enumerate() {
            if !seen_ports.insert(port.port) {
                result.error(
                    format!("{prefix}.ports[{i}]"),
                    format!("Duplicate port {} in container", port.port),
                );
            }
        }
    }

    /// Validates an explicit network placement.
    fn validate_network(network: &NetworkConfig, result: &mut ValidationResult) {
        if network.subnets.is_empty() {
            result.error(
                "service.network.subnets",
                "An explicit network needs at least one subnet",
            );
        }

        if network.security_groups.is_empty() {
            result.error(
                "service.network.security_groups",
                "An explicit network needs at least one security group",
            );
        }
    }

    /// Validates timing configuration.
    fn validate_timing(timing: &TimingConfig, result: &mut ValidationResult) {
        if timing.deploy_attempts == 0 {
            result.error("timing.deploy_attempts", "At least one poll round is required");
        }

        if timing.teardown_attempts == 0 {
            result.error(
                "timing.teardown_attempts",
                "At least one poll round is required",
            );
        }

        if timing.poll_interval_secs == 0 {
            result.warnings.push(String::from(
                "timing.poll_interval_secs: polling without delay may hit API rate limits",
            ));
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    let Some(first) = chars.next() else {
        return false;
    };

    first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
        && !name.contains("--")
}

/// Returns true if the CPU/memory pair is a size Fargate accepts.
const fn is_valid_fargate_size(cpu: u32, memory: u32) -> bool {
    let (min, max, step) = match cpu {
        256 => {
            return matches!(memory, 512 | 1024 | 2048);
        }
        512 => (1024, 4096, 1024),
        1024 => (2048, 8192, 1024),
        2048 => (4096, 16384, 1024),
        4096 => (8192, 30720, 1024),
        8192 => (16384, 61440, 4096),
        16384 => (32768, 122_880, 8192),
        _ => return false,
    };

    memory >= min && memory <= max && memory % step == 0
}

impl ValidationResult {
    /// Records an error for a field.
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_config;

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("my-service-123"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Web"));
        assert!(!is_valid_name("123-web"));
        assert!(!is_valid_name("web_api"));
        assert!(!is_valid_name("web-"));
        assert!(!is_valid_name("web--api"));
    }

    #[test]
    fn test_fargate_sizes() {
        assert!(is_valid_fargate_size(256, 512));
        assert!(is_valid_fargate_size(1024, 3072));
        assert!(is_valid_fargate_size(8192, 20480));
        assert!(!is_valid_fargate_size(256, 4096));
        assert!(!is_valid_fargate_size(512, 1536));
        assert!(!is_valid_fargate_size(300, 1024));
        assert!(!is_valid_fargate_size(8192, 18432));
    }

    #[test]
    fn test_sample_config_is_valid() {
        let result = ConfigValidator::new()
            .validate(&sample_config("web"))
            .expect("sample config validates");
        assert!(result.is_valid());
    }

    #[test]
    fn test_invalid_task_size() {
        let mut config = sample_config("web");
        config.service.memory = 4096;

        let result = ConfigValidator::new().validate(&config);
        assert!(matches!(
            result,
            Err(HalldyllError::Config(ConfigError::ValidationError { field: Some(ref f), .. })) if f == "service.memory"
        ));
    }

    #[test]
    fn test_container_checks() {
        let mut config = sample_config("web");
        let mut sidecar = config.service.containers[0].clone();
        sidecar.essential = false;
        sidecar.memory = Some(1024);
        config.service.containers.push(sidecar);

        let mut result = ValidationResult::default();
        ConfigValidator::validate_service(&config.service, &mut result);

        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"service.containers[1].name"));
        assert!(fields.contains(&"service.containers"));
    }

    #[test]
    fn test_explicit_network_needs_subnets() {
        let mut config = sample_config("web");
        config.service.network = Some(NetworkConfig {
            security_groups: vec![String::from("sg-1")],
            subnets: vec![],
        });

        let mut result = ValidationResult::default();
        ConfigValidator::validate_service(&config.service, &mut result);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "service.network.subnets");
    }

    #[test]
    fn test_s3_backend_requires_bucket() {
        let mut config = sample_config("web");
        config.state.backend = StateBackend::S3;

        assert!(ConfigValidator::new().validate(&config).is_err());

        config.state.bucket = Some(String::from("state-bucket"));
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[test]
    fn test_reserved_tag_and_zero_attempts() {
        let mut config = sample_config("web");
        config
            .service
            .tags
            .insert(String::from("aws:owner"), String::from("me"));
        config.timing.teardown_attempts = 0;
        config.timing.poll_interval_secs = 0;

        let mut result = ValidationResult::default();
        ConfigValidator::validate_service(&config.service, &mut result);
        ConfigValidator::validate_timing(&config.timing, &mut result);

        assert_eq!(result.error_count(), 2);
        assert_eq!(result.warning_count(), 1);
    }
}
