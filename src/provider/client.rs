//! Provider client trait definition.
//!
//! This module defines the network/compute capability the orchestrator
//! consumes. Every method is one remote call that either succeeds or fails
//! terminally.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{AclEntry, NetworkInterface, Route, RouteDestination, SecurityRule, Task};

/// Trait for network and compute provider backends.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Creates a virtual network and returns its id.
    async fn create_network(&self, cidr_block: &str) -> Result<String>;

    /// Deletes a virtual network.
    async fn delete_network(&self, network_id: &str) -> Result<()>;

    /// Creates an internet gateway and returns its id.
    async fn create_gateway(&self) -> Result<String>;

    /// Attaches a gateway to a network.
    async fn attach_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()>;

    /// Detaches a gateway from a network.
    async fn detach_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()>;

    /// Deletes a gateway.
    async fn delete_gateway(&self, gateway_id: &str) -> Result<()>;

    /// Creates a security policy inside a network and returns its id.
    async fn create_security_policy(
        &self,
        name: &str,
        description: &str,
        network_id: &str,
    ) -> Result<String>;

    /// Adds a rule to a security policy.
    async fn authorize_security_rule(&self, policy_id: &str, rule: &SecurityRule) -> Result<()>;

    /// Deletes a security policy.
    async fn delete_security_policy(&self, policy_id: &str) -> Result<()>;

    /// Creates a network ACL and returns its id.
    async fn create_acl(&self, network_id: &str) -> Result<String>;

    /// Lists the entries of a network ACL.
    async fn describe_acl(&self, acl_id: &str) -> Result<Vec<AclEntry>>;

    /// Deletes a single ACL entry.
    async fn delete_acl_entry(&self, acl_id: &str, entry: &AclEntry) -> Result<()>;

    /// Deletes a network ACL.
    async fn delete_acl(&self, acl_id: &str) -> Result<()>;

    /// Creates a route table and returns its id.
    async fn create_route_table(&self, network_id: &str) -> Result<String>;

    /// Adds a route through a gateway.
    async fn create_route(
        &self,
        route_table_id: &str,
        destination: &RouteDestination,
        gateway_id: &str,
    ) -> Result<()>;

    /// Lists the routes of a route table.
    async fn describe_route_table(&self, route_table_id: &str) -> Result<Vec<Route>>;

    /// Deletes a single route.
    async fn delete_route(&self, route_table_id: &str, destination: &RouteDestination)
    -> Result<()>;

    /// Deletes a route table.
    async fn delete_route_table(&self, route_table_id: &str) -> Result<()>;

    /// Creates a subnet and returns its id.
    async fn create_subnet(&self, network_id: &str, cidr_block: &str) -> Result<String>;

    /// Deletes a subnet.
    async fn delete_subnet(&self, subnet_id: &str) -> Result<()>;

    /// Associates a route table with a subnet and returns the association id.
    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str)
    -> Result<String>;

    /// Removes a route table association.
    async fn disassociate_route_table(&self, association_id: &str) -> Result<()>;

    /// Lists the task ARNs of a service.
    async fn list_tasks(&self, cluster: Option<&str>, service_name: &str) -> Result<Vec<String>>;

    /// Describes tasks by ARN.
    async fn describe_tasks(&self, cluster: Option<&str>, task_arns: &[String])
    -> Result<Vec<Task>>;

    /// Resolves network interfaces by id in one batched call.
    async fn describe_network_interfaces(
        &self,
        interface_ids: &[String],
    ) -> Result<Vec<NetworkInterface>>;

    /// Sets a tag on a resource.
    async fn tag_resource(&self, resource_arn: &str, key: &str, value: &str) -> Result<()>;

    /// Removes a tag from a resource.
    async fn untag_resource(&self, resource_arn: &str, key: &str) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
