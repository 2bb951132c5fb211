//! Configuration hashing for change detection.
//!
//! This module provides deterministic hashing of configuration structures
//! to detect changes between deployments and enable idempotent operations.

use sha2::{Digest, Sha256};

use super::spec::{ContainerSpec, DeployConfig, ServiceInstance};

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire deployment configuration.
    ///
    /// This hash changes when any part of the configuration changes.
    #[must_use]
    pub fn hash_config(&self, config: &DeployConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.project.name.as_bytes());
        hasher.update(config.project.environment.as_bytes());
        if let Some(region) = &config.project.region {
            hasher.update(region.as_bytes());
        }

        let service = &config.service;
        hasher.update(self.hash_task_definition(service).as_bytes());

        if let Some(cluster) = &service.cluster {
            hasher.update(cluster.as_bytes());
        }
        hasher.update(service.desired_count.to_be_bytes());
        hasher.update([u8::from(service.expose_publicly)]);

        if let Some(network) = &service.network {
            for group in &network.security_groups {
                hasher.update(group.as_bytes());
            }
            hasher.update([0u8]);
            for subnet in &network.subnets {
                hasher.update(subnet.as_bytes());
            }
        }

        // BTreeMap iteration is sorted
        for (key, value) in &service.tags {
            hasher.update(key.as_bytes());
            hasher.update(value.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes the fingerprint of the task definition inputs.
    ///
    /// A changed fingerprint means a new task definition revision is needed.
    #[must_use]
    pub fn hash_task_definition(&self, service: &ServiceInstance) -> String {
        let mut hasher = Sha256::new();

        hasher.update(service.task_family().as_bytes());
        hasher.update(service.cpu.to_be_bytes());
        hasher.update(service.memory.to_be_bytes());

        for container in &service.containers {
            Self::hash_container(&mut hasher, container);
        }

        hex::encode(hasher.finalize())
    }

    fn hash_container(hasher: &mut Sha256, container: &ContainerSpec) {
        hasher.update(container.name.as_bytes());
        hasher.update(container.image.as_bytes());
        if let Some(cpu) = container.cpu {
            hasher.update(cpu.to_be_bytes());
        }
        if let Some(memory) = container.memory {
            hasher.update(memory.to_be_bytes());
        }
        hasher.update([u8::from(container.essential)]);

        for port in &container.ports {
            hasher.update(String::from(*port).as_bytes());
        }

        for (key, value) in &container.environment {
            hasher.update(key.as_bytes());
            hasher.update(value.as_bytes());
        }

        if let Some(cmd) = &container.command {
            for arg in cmd {
                hasher.update(arg.as_bytes());
            }
        }

        // Separates containers so field shifts cannot collide
        hasher.update([0xffu8]);
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
