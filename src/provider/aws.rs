//! AWS-backed provider client.
//!
//! Network resources map onto EC2 (VPC, internet gateway, security group,
//! network ACL, route table, subnet) and tasks onto ECS. All wire concerns
//! are left to the official SDK clients.

use async_trait::async_trait;
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::{IpPermission, IpRange, Ipv6Range};
use tracing::{debug, trace, warn};

use crate::error::{HalldyllError, ProviderError, Result};

use super::client::ProviderClient;
use super::types::{
    AclEntry, Attachment, AttachmentDetail, Container, NetworkInterface, Route, RouteDestination,
    RuleDirection, SecurityRule, Task,
};

/// Most tasks `DescribeTasks` accepts per call.
const DESCRIBE_TASKS_BATCH: usize = 100;

/// Provider client backed by the EC2 and ECS APIs.
#[derive(Debug, Clone)]
pub struct AwsProviderClient {
    /// EC2 client for the network stack.
    ec2: aws_sdk_ec2::Client,
    /// ECS client for tasks and tagging.
    ecs: aws_sdk_ecs::Client,
}

/// Loads the shared AWS configuration, optionally pinned to a region.
pub async fn load_sdk_config(region: Option<&str>) -> aws_config::SdkConfig {
    if let Some(region_str) = region {
        aws_config::from_env()
            .region(aws_config::Region::new(region_str.to_string()))
            .load()
            .await
    } else {
        aws_config::load_from_env().await
    }
}

/// Maps an SDK failure to a provider call failure.
pub(crate) fn call_failed<E>(operation: &'static str) -> impl FnOnce(E) -> HalldyllError
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |err| {
        HalldyllError::Provider(ProviderError::call(
            operation,
            DisplayErrorContext(&err).to_string(),
        ))
    }
}

/// Extracts a required identifier from a response.
pub(crate) fn required(operation: &str, field: &str, value: Option<&str>) -> Result<String> {
    value
        .map(String::from)
        .ok_or_else(|| HalldyllError::Provider(ProviderError::missing(operation, field)))
}

impl AwsProviderClient {
    /// Creates a provider client from a loaded AWS configuration.
    #[must_use]
    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(config),
            ecs: aws_sdk_ecs::Client::new(config),
        }
    }

    /// Gets the underlying ECS client.
    #[must_use]
    pub const fn ecs(&self) -> &aws_sdk_ecs::Client {
        &self.ecs
    }

    /// Splits task ARNs into batches `DescribeTasks` accepts.
    fn describe_batches(task_arns: &[String]) -> std::slice::Chunks<'_, String> {
        task_arns.chunks(DESCRIBE_TASKS_BATCH)
    }

    /// Formats a task the API could not describe.
    fn describe_failure(failure: &aws_sdk_ecs::types::Failure) -> String {
        format!(
            "{}: {}{}",
            failure.arn().unwrap_or("unknown task"),
            failure.reason().unwrap_or("no reason given"),
            failure
                .detail()
                .map(|detail| format!(" ({detail})"))
                .unwrap_or_default()
        )
    }

    fn convert_task(task: &aws_sdk_ecs::types::Task) -> Task {
        Task {
            task_arn: task.task_arn().unwrap_or_default().to_string(),
            desired_status: task.desired_status().map(String::from),
            last_status: task.last_status().map(String::from),
            containers: task
                .containers()
                .iter()
                .map(|c| Container {
                    name: c.name().unwrap_or_default().to_string(),
                    container_arn: c.container_arn().map(String::from),
                    task_arn: c.task_arn().map(String::from),
                    image: c.image().map(String::from),
                    last_status: c.last_status().map(String::from),
                })
                .collect(),
            attachments: task
                .attachments()
                .iter()
                .map(|a| Attachment {
                    id: a.id().unwrap_or_default().to_string(),
                    attachment_type: a.r#type().map(String::from),
                    status: a.status().map(String::from),
                    details: a
                        .details()
                        .iter()
                        .filter_map(|d| {
                            Some(AttachmentDetail {
                                name: d.name()?.to_string(),
                                value: d.value()?.to_string(),
                            })
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ProviderClient for AwsProviderClient {
    async fn create_network(&self, cidr_block: &str) -> Result<String> {
        let output = self
            .ec2
            .create_vpc()
            .cidr_block(cidr_block)
            .send()
            .await
            .map_err(call_failed("CreateVpc"))?;

        required("CreateVpc", "VpcId", output.vpc().and_then(|v| v.vpc_id()))
    }

    async fn delete_network(&self, network_id: &str) -> Result<()> {
        self.ec2
            .delete_vpc()
            .vpc_id(network_id)
            .send()
            .await
            .map_err(call_failed("DeleteVpc"))?;
        Ok(())
    }

    async fn create_gateway(&self) -> Result<String> {
        let output = self
            .ec2
            .create_internet_gateway()
            .send()
            .await
            .map_err(call_failed("CreateInternetGateway"))?;

        required(
            "CreateInternetGateway",
            "InternetGatewayId",
            output.internet_gateway().and_then(|g| g.internet_gateway_id()),
        )
    }

    async fn attach_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()> {
        self.ec2
            .attach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(network_id)
            .send()
            .await
            .map_err(call_failed("AttachInternetGateway"))?;
        Ok(())
    }

    async fn detach_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()> {
        self.ec2
            .detach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(network_id)
            .send()
            .await
            .map_err(call_failed("DetachInternetGateway"))?;
        Ok(())
    }

    async fn delete_gateway(&self, gateway_id: &str) -> Result<()> {
        self.ec2
            .delete_internet_gateway()
            .internet_gateway_id(gateway_id)
            .send()
            .await
            .map_err(call_failed("DeleteInternetGateway"))?;
        Ok(())
    }

    async fn create_security_policy(
        &self,
        name: &str,
        description: &str,
        network_id: &str,
    ) -> Result<String> {
        let output = self
            .ec2
            .create_security_group()
            .group_name(name)
            .description(description)
            .vpc_id(network_id)
            .send()
            .await
            .map_err(call_failed("CreateSecurityGroup"))?;

        required("CreateSecurityGroup", "GroupId", output.group_id())
    }

    async fn authorize_security_rule(&self, policy_id: &str, rule: &SecurityRule) -> Result<()> {
        let ipv4_ranges = (!rule.ipv4_ranges.is_empty()).then(|| {
            rule.ipv4_ranges
                .iter()
                .map(|cidr| IpRange::builder().cidr_ip(cidr).build())
                .collect::<Vec<_>>()
        });
        let ipv6_ranges = (!rule.ipv6_ranges.is_empty()).then(|| {
            rule.ipv6_ranges
                .iter()
                .map(|cidr| Ipv6Range::builder().cidr_ipv6(cidr).build())
                .collect::<Vec<_>>()
        });

        let permission = IpPermission::builder()
            .ip_protocol("-1")
            .from_port(-1)
            .to_port(-1)
            .set_ip_ranges(ipv4_ranges)
            .set_ipv6_ranges(ipv6_ranges)
            .build();

        trace!("Authorizing {:?} rule on {policy_id}", rule.direction);

        match rule.direction {
            RuleDirection::Ingress => {
                self.ec2
                    .authorize_security_group_ingress()
                    .group_id(policy_id)
                    .ip_permissions(permission)
                    .send()
                    .await
                    .map_err(call_failed("AuthorizeSecurityGroupIngress"))?;
            }
            RuleDirection::Egress => {
                self.ec2
                    .authorize_security_group_egress()
                    .group_id(policy_id)
                    .ip_permissions(permission)
                    .send()
                    .await
                    .map_err(call_failed("AuthorizeSecurityGroupEgress"))?;
            }
        }

        Ok(())
    }

    async fn delete_security_policy(&self, policy_id: &str) -> Result<()> {
        self.ec2
            .delete_security_group()
            .group_id(policy_id)
            .send()
            .await
            .map_err(call_failed("DeleteSecurityGroup"))?;
        Ok(())
    }

    async fn create_acl(&self, network_id: &str) -> Result<String> {
        let output = self
            .ec2
            .create_network_acl()
            .vpc_id(network_id)
            .send()
            .await
            .map_err(call_failed("CreateNetworkAcl"))?;

        required(
            "CreateNetworkAcl",
            "NetworkAclId",
            output.network_acl().and_then(|acl| acl.network_acl_id()),
        )
    }

    async fn describe_acl(&self, acl_id: &str) -> Result<Vec<AclEntry>> {
        let output = self
            .ec2
            .describe_network_acls()
            .network_acl_ids(acl_id)
            .send()
            .await
            .map_err(call_failed("DescribeNetworkAcls"))?;

        let entries = output
            .network_acls()
            .iter()
            .take(1)
            .flat_map(|acl| acl.entries())
            .filter_map(|entry| {
                Some(AclEntry {
                    rule_number: entry.rule_number()?,
                    egress: entry.egress()?,
                })
            })
            .collect();

        Ok(entries)
    }

    async fn delete_acl_entry(&self, acl_id: &str, entry: &AclEntry) -> Result<()> {
        self.ec2
            .delete_network_acl_entry()
            .network_acl_id(acl_id)
            .rule_number(entry.rule_number)
            .egress(entry.egress)
            .send()
            .await
            .map_err(call_failed("DeleteNetworkAclEntry"))?;
        Ok(())
    }

    async fn delete_acl(&self, acl_id: &str) -> Result<()> {
        self.ec2
            .delete_network_acl()
            .network_acl_id(acl_id)
            .send()
            .await
            .map_err(call_failed("DeleteNetworkAcl"))?;
        Ok(())
    }

    async fn create_route_table(&self, network_id: &str) -> Result<String> {
        let output = self
            .ec2
            .create_route_table()
            .vpc_id(network_id)
            .send()
            .await
            .map_err(call_failed("CreateRouteTable"))?;

        required(
            "CreateRouteTable",
            "RouteTableId",
            output.route_table().and_then(|rt| rt.route_table_id()),
        )
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination: &RouteDestination,
        gateway_id: &str,
    ) -> Result<()> {
        let request = self
            .ec2
            .create_route()
            .route_table_id(route_table_id)
            .gateway_id(gateway_id);

        let request = match destination {
            RouteDestination::Ipv4(cidr) => request.destination_cidr_block(cidr),
            RouteDestination::Ipv6(cidr) => request.destination_ipv6_cidr_block(cidr),
        };

        request.send().await.map_err(call_failed("CreateRoute"))?;
        Ok(())
    }

    async fn describe_route_table(&self, route_table_id: &str) -> Result<Vec<Route>> {
        let output = self
            .ec2
            .describe_route_tables()
            .route_table_ids(route_table_id)
            .send()
            .await
            .map_err(call_failed("DescribeRouteTables"))?;

        let routes = output
            .route_tables()
            .iter()
            .take(1)
            .flat_map(|table| table.routes())
            .filter_map(|route| {
                let destination = route
                    .destination_cidr_block()
                    .map(|cidr| RouteDestination::Ipv4(cidr.to_string()))
                    .or_else(|| {
                        route
                            .destination_ipv6_cidr_block()
                            .map(|cidr| RouteDestination::Ipv6(cidr.to_string()))
                    })?;

                Some(Route {
                    destination,
                    gateway_id: route.gateway_id().map(String::from),
                })
            })
            .collect();

        Ok(routes)
    }

    async fn delete_route(
        &self,
        route_table_id: &str,
        destination: &RouteDestination,
    ) -> Result<()> {
        let request = self.ec2.delete_route().route_table_id(route_table_id);

        let request = match destination {
            RouteDestination::Ipv4(cidr) => request.destination_cidr_block(cidr),
            RouteDestination::Ipv6(cidr) => request.destination_ipv6_cidr_block(cidr),
        };

        request.send().await.map_err(call_failed("DeleteRoute"))?;
        Ok(())
    }

    async fn delete_route_table(&self, route_table_id: &str) -> Result<()> {
        self.ec2
            .delete_route_table()
            .route_table_id(route_table_id)
            .send()
            .await
            .map_err(call_failed("DeleteRouteTable"))?;
        Ok(())
    }

    async fn create_subnet(&self, network_id: &str, cidr_block: &str) -> Result<String> {
        let output = self
            .ec2
            .create_subnet()
            .vpc_id(network_id)
            .cidr_block(cidr_block)
            .send()
            .await
            .map_err(call_failed("CreateSubnet"))?;

        required(
            "CreateSubnet",
            "SubnetId",
            output.subnet().and_then(|s| s.subnet_id()),
        )
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        self.ec2
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(call_failed("DeleteSubnet"))?;
        Ok(())
    }

    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> Result<String> {
        let output = self
            .ec2
            .associate_route_table()
            .route_table_id(route_table_id)
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(call_failed("AssociateRouteTable"))?;

        required("AssociateRouteTable", "AssociationId", output.association_id())
    }

    async fn disassociate_route_table(&self, association_id: &str) -> Result<()> {
        self.ec2
            .disassociate_route_table()
            .association_id(association_id)
            .send()
            .await
            .map_err(call_failed("DisassociateRouteTable"))?;
        Ok(())
    }

    async fn list_tasks(&self, cluster: Option<&str>, service_name: &str) -> Result<Vec<String>> {
        let task_arns = self
            .ecs
            .list_tasks()
            .set_cluster(cluster.map(String::from))
            .service_name(service_name)
            .into_paginator()
            .items()
            .send()
            .collect::<std::result::Result<Vec<_>, _>>()
            .await
            .map_err(call_failed("ListTasks"))?;

        debug!("Service {service_name} has {} tasks", task_arns.len());
        Ok(task_arns)
    }

    async fn describe_tasks(
        &self,
        cluster: Option<&str>,
        task_arns: &[String],
    ) -> Result<Vec<Task>> {
        let mut tasks = Vec::with_capacity(task_arns.len());

        for batch in Self::describe_batches(task_arns) {
            let output = self
                .ecs
                .describe_tasks()
                .set_cluster(cluster.map(String::from))
                .set_tasks(Some(batch.to_vec()))
                .send()
                .await
                .map_err(call_failed("DescribeTasks"))?;

            for failure in output.failures() {
                warn!("Could not describe task {}", Self::describe_failure(failure));
            }
            tasks.extend(output.tasks().iter().map(Self::convert_task));
        }

        Ok(tasks)
    }

    async fn describe_network_interfaces(
        &self,
        interface_ids: &[String],
    ) -> Result<Vec<NetworkInterface>> {
        if interface_ids.is_empty() {
            return Ok(Vec::new());
        }

        let output = self
            .ec2
            .describe_network_interfaces()
            .set_network_interface_ids(Some(interface_ids.to_vec()))
            .send()
            .await
            .map_err(call_failed("DescribeNetworkInterfaces"))?;

        let interfaces = output
            .network_interfaces()
            .iter()
            .map(|ni| NetworkInterface {
                network_interface_id: ni.network_interface_id().unwrap_or_default().to_string(),
                subnet_id: ni.subnet_id().map(String::from),
                private_ip_address: ni.private_ip_address().map(String::from),
                public_ip: ni
                    .association()
                    .and_then(|assoc| assoc.public_ip())
                    .map(String::from),
                mac_address: ni.mac_address().map(String::from),
            })
            .collect();

        Ok(interfaces)
    }

    async fn tag_resource(&self, resource_arn: &str, key: &str, value: &str) -> Result<()> {
        self.ecs
            .tag_resource()
            .resource_arn(resource_arn)
            .tags(aws_sdk_ecs::types::Tag::builder().key(key).value(value).build())
            .send()
            .await
            .map_err(call_failed("TagResource"))?;
        Ok(())
    }

    async fn untag_resource(&self, resource_arn: &str, key: &str) -> Result<()> {
        self.ecs
            .untag_resource()
            .resource_arn(resource_arn)
            .tag_keys(key)
            .send()
            .await
            .map_err(call_failed("UntagResource"))?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "aws"
    }
}
