//! In-memory fakes shared by the unit tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::components::{
    Component, ComponentKind, ComponentOutput, ComponentParams, ComponentRegistry,
};
use crate::config::{
    ContainerSpec, DeployConfig, PortConfig, PortProtocol, ProjectConfig, ServiceInstance,
    StateConfig, TimingConfig,
};
use crate::error::{HalldyllError, ProviderError, Result, StateError};
use crate::provider::{
    AclEntry, Attachment, AttachmentDetail, Container, LOCAL_GATEWAY, NETWORK_INTERFACE_DETAIL,
    NetworkInterface, ProviderClient, Route, RouteDestination, RuleDirection, SecurityRule, Task,
};
use crate::state::{
    LockInfo, ProvisioningState, ResourceRole, ServiceRef, StateStore, TaskDefinitionRef,
};

/// Status the fake scheduler drives tasks to.
pub const RUNNING: &str = "RUNNING";

/// A minimal valid configuration with no waits.
pub fn sample_config(service_name: &str) -> DeployConfig {
    DeployConfig {
        project: ProjectConfig {
            name: String::from("halldyll"),
            environment: String::from("dev"),
            region: None,
        },
        state: StateConfig::default(),
        service: ServiceInstance {
            name: service_name.to_string(),
            cluster: None,
            cpu: 256,
            memory: 512,
            containers: vec![ContainerSpec {
                name: service_name.to_string(),
                image: String::from("nginx:1.27"),
                cpu: None,
                memory: None,
                essential: true,
                ports: vec![PortConfig::new(80, PortProtocol::Tcp)],
                environment: BTreeMap::new(),
                command: None,
            }],
            desired_count: 1,
            expose_publicly: true,
            network: None,
            tags: BTreeMap::new(),
        },
        timing: TimingConfig::immediate(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A call recorded by [`FakeProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum ProviderCall {
    CreateNetwork,
    CreateGateway,
    AttachGateway { gateway_id: String, network_id: String },
    CreateSecurityPolicy { name: String, description: String },
    AuthorizeSecurityRule(RuleDirection),
    CreateAcl,
    CreateRouteTable,
    CreateRoute { destination: RouteDestination, gateway_id: String },
    CreateSubnet,
    AssociateRouteTable,
    DisassociateRouteTable(String),
    DeleteSubnet(String),
    DescribeRouteTable(String),
    DeleteRoute(RouteDestination),
    DeleteRouteTable(String),
    DescribeAcl(String),
    DeleteAclEntry(i32),
    DeleteAcl(String),
    DeleteSecurityPolicy(String),
    DetachGateway { gateway_id: String, network_id: String },
    DeleteGateway(String),
    DeleteNetwork(String),
    ListTasks(String),
    DescribeTasks(Vec<String>),
    DescribeNetworkInterfaces(Vec<String>),
    TagResource { key: String, value: String },
    UntagResource { key: String },
}

impl ProviderCall {
    /// Role created by this call, if it creates a network resource.
    pub const fn created_role(&self) -> Option<ResourceRole> {
        match self {
            Self::CreateNetwork => Some(ResourceRole::Network),
            Self::CreateGateway => Some(ResourceRole::Gateway),
            Self::CreateSecurityPolicy { .. } => Some(ResourceRole::SecurityPolicy),
            Self::CreateAcl => Some(ResourceRole::Acl),
            Self::CreateRouteTable => Some(ResourceRole::RouteTable),
            Self::CreateSubnet => Some(ResourceRole::Subnet),
            Self::AssociateRouteTable => Some(ResourceRole::Association),
            _ => None,
        }
    }

    /// Role removed by this call, if it removes a network resource.
    pub const fn deleted_role(&self) -> Option<ResourceRole> {
        match self {
            Self::DeleteNetwork(_) => Some(ResourceRole::Network),
            Self::DeleteGateway(_) => Some(ResourceRole::Gateway),
            Self::DeleteSecurityPolicy(_) => Some(ResourceRole::SecurityPolicy),
            Self::DeleteAcl(_) => Some(ResourceRole::Acl),
            Self::DeleteRouteTable(_) => Some(ResourceRole::RouteTable),
            Self::DeleteSubnet(_) => Some(ResourceRole::Subnet),
            Self::DisassociateRouteTable(_) => Some(ResourceRole::Association),
            _ => None,
        }
    }

    /// Operation name used for failure injection.
    const fn operation(&self) -> &'static str {
        match self {
            Self::CreateNetwork => "CreateNetwork",
            Self::CreateGateway => "CreateGateway",
            Self::AttachGateway { .. } => "AttachGateway",
            Self::CreateSecurityPolicy { .. } => "CreateSecurityPolicy",
            Self::AuthorizeSecurityRule(RuleDirection::Ingress) => "AuthorizeSecurityGroupIngress",
            Self::AuthorizeSecurityRule(RuleDirection::Egress) => "AuthorizeSecurityGroupEgress",
            Self::CreateAcl => "CreateAcl",
            Self::CreateRouteTable => "CreateRouteTable",
            Self::CreateRoute { .. } => "CreateRoute",
            Self::CreateSubnet => "CreateSubnet",
            Self::AssociateRouteTable => "AssociateRouteTable",
            Self::DisassociateRouteTable(_) => "DisassociateRouteTable",
            Self::DeleteSubnet(_) => "DeleteSubnet",
            Self::DescribeRouteTable(_) => "DescribeRouteTable",
            Self::DeleteRoute(_) => "DeleteRoute",
            Self::DeleteRouteTable(_) => "DeleteRouteTable",
            Self::DescribeAcl(_) => "DescribeAcl",
            Self::DeleteAclEntry(_) => "DeleteAclEntry",
            Self::DeleteAcl(_) => "DeleteAcl",
            Self::DeleteSecurityPolicy(_) => "DeleteSecurityPolicy",
            Self::DetachGateway { .. } => "DetachGateway",
            Self::DeleteGateway(_) => "DeleteGateway",
            Self::DeleteNetwork(_) => "DeleteNetwork",
            Self::ListTasks(_) => "ListTasks",
            Self::DescribeTasks(_) => "DescribeTasks",
            Self::DescribeNetworkInterfaces(_) => "DescribeNetworkInterfaces",
            Self::TagResource { .. } => "TagResource",
            Self::UntagResource { .. } => "UntagResource",
        }
    }
}

/// A scripted task: it reports `RUNNING` after `rounds_left` describes.
#[derive(Debug, Clone)]
struct ScriptedTask {
    rounds_left: u32,
}

#[derive(Debug, Default)]
struct ProviderInner {
    calls: Vec<ProviderCall>,
    next_id: u32,
    failing: Vec<&'static str>,
    service_tasks: Vec<String>,
    tasks: HashMap<String, ScriptedTask>,
    routes: Vec<Route>,
    acl_entries: Vec<AclEntry>,
}

/// Provider fake that records calls and keeps just enough resource state.
#[derive(Debug, Default)]
pub struct FakeProvider {
    inner: Mutex<ProviderInner>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call of the operation fail until cleared.
    pub fn fail_on(&self, operation: &'static str) {
        lock(&self.inner).failing.push(operation);
    }

    pub fn clear_failures(&self) {
        lock(&self.inner).failing.clear();
    }

    /// Gives the service tasks that converge after the given describe rounds.
    pub fn with_tasks(&self, tasks: &[(&str, u32)]) {
        let mut inner = lock(&self.inner);
        inner.service_tasks = tasks.iter().map(|(arn, _)| (*arn).to_string()).collect();
        inner.tasks = tasks
            .iter()
            .map(|(arn, rounds_left)| {
                (
                    (*arn).to_string(),
                    ScriptedTask {
                        rounds_left: *rounds_left,
                    },
                )
            })
            .collect();
    }

    pub fn set_routes(&self, routes: Vec<Route>) {
        lock(&self.inner).routes = routes;
    }

    pub fn set_acl_entries(&self, entries: Vec<AclEntry>) {
        lock(&self.inner).acl_entries = entries;
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.inner).calls.clone()
    }

    pub fn reset_calls(&self) {
        lock(&self.inner).calls.clear();
    }

    /// Network roles in the order they were created.
    pub fn created_roles(&self) -> Vec<ResourceRole> {
        self.calls().iter().filter_map(ProviderCall::created_role).collect()
    }

    /// Network roles in the order they were deleted.
    pub fn deleted_roles(&self) -> Vec<ResourceRole> {
        self.calls().iter().filter_map(ProviderCall::deleted_role).collect()
    }

    pub fn count(&self, predicate: impl Fn(&ProviderCall) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: ProviderCall) -> Result<()> {
        let mut inner = lock(&self.inner);
        let operation = call.operation();
        if inner.failing.contains(&operation) {
            return Err(ProviderError::call(operation, "injected failure").into());
        }
        inner.calls.push(call);
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        format!("{prefix}-{}", inner.next_id)
    }

    fn describe_task(arn: &str, scripted: &mut ScriptedTask) -> Task {
        let last_status = if scripted.rounds_left == 0 {
            RUNNING
        } else {
            scripted.rounds_left = scripted.rounds_left.saturating_sub(1);
            "PROVISIONING"
        };

        Task {
            task_arn: arn.to_string(),
            desired_status: Some(String::from(RUNNING)),
            last_status: Some(String::from(last_status)),
            containers: vec![Container {
                name: String::from("web"),
                task_arn: Some(arn.to_string()),
                ..Container::default()
            }],
            attachments: vec![Attachment {
                id: format!("att-{arn}"),
                details: vec![AttachmentDetail {
                    name: String::from(NETWORK_INTERFACE_DETAIL),
                    value: format!("eni-{arn}"),
                }],
                ..Attachment::default()
            }],
        }
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn create_network(&self, _cidr_block: &str) -> Result<String> {
        self.record(ProviderCall::CreateNetwork)?;
        Ok(self.next_id("vpc"))
    }

    async fn delete_network(&self, network_id: &str) -> Result<()> {
        self.record(ProviderCall::DeleteNetwork(network_id.to_string()))
    }

    async fn create_gateway(&self) -> Result<String> {
        self.record(ProviderCall::CreateGateway)?;
        Ok(self.next_id("igw"))
    }

    async fn attach_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()> {
        self.record(ProviderCall::AttachGateway {
            gateway_id: gateway_id.to_string(),
            network_id: network_id.to_string(),
        })
    }

    async fn detach_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()> {
        self.record(ProviderCall::DetachGateway {
            gateway_id: gateway_id.to_string(),
            network_id: network_id.to_string(),
        })
    }

    async fn delete_gateway(&self, gateway_id: &str) -> Result<()> {
        self.record(ProviderCall::DeleteGateway(gateway_id.to_string()))
    }

    async fn create_security_policy(
        &self,
        name: &str,
        description: &str,
        _network_id: &str,
    ) -> Result<String> {
        self.record(ProviderCall::CreateSecurityPolicy {
            name: name.to_string(),
            description: description.to_string(),
        })?;
        Ok(self.next_id("sg"))
    }

    async fn authorize_security_rule(&self, _policy_id: &str, rule: &SecurityRule) -> Result<()> {
        self.record(ProviderCall::AuthorizeSecurityRule(rule.direction))
    }

    async fn delete_security_policy(&self, policy_id: &str) -> Result<()> {
        self.record(ProviderCall::DeleteSecurityPolicy(policy_id.to_string()))
    }

    async fn create_acl(&self, _network_id: &str) -> Result<String> {
        self.record(ProviderCall::CreateAcl)?;
        Ok(self.next_id("acl"))
    }

    async fn describe_acl(&self, acl_id: &str) -> Result<Vec<AclEntry>> {
        self.record(ProviderCall::DescribeAcl(acl_id.to_string()))?;
        Ok(lock(&self.inner).acl_entries.clone())
    }

    async fn delete_acl_entry(&self, _acl_id: &str, entry: &AclEntry) -> Result<()> {
        self.record(ProviderCall::DeleteAclEntry(entry.rule_number))?;
        lock(&self.inner).acl_entries.retain(|e| e != entry);
        Ok(())
    }

    async fn delete_acl(&self, acl_id: &str) -> Result<()> {
        self.record(ProviderCall::DeleteAcl(acl_id.to_string()))
    }

    async fn create_route_table(&self, _network_id: &str) -> Result<String> {
        self.record(ProviderCall::CreateRouteTable)?;
        lock(&self.inner).routes = vec![Route {
            destination: RouteDestination::Ipv4(String::from("10.0.0.0/16")),
            gateway_id: Some(String::from(LOCAL_GATEWAY)),
        }];
        Ok(self.next_id("rtb"))
    }

    async fn create_route(
        &self,
        _route_table_id: &str,
        destination: &RouteDestination,
        gateway_id: &str,
    ) -> Result<()> {
        self.record(ProviderCall::CreateRoute {
            destination: destination.clone(),
            gateway_id: gateway_id.to_string(),
        })?;
        lock(&self.inner).routes.push(Route {
            destination: destination.clone(),
            gateway_id: Some(gateway_id.to_string()),
        });
        Ok(())
    }

    async fn describe_route_table(&self, route_table_id: &str) -> Result<Vec<Route>> {
        self.record(ProviderCall::DescribeRouteTable(route_table_id.to_string()))?;
        Ok(lock(&self.inner).routes.clone())
    }

    async fn delete_route(
        &self,
        _route_table_id: &str,
        destination: &RouteDestination,
    ) -> Result<()> {
        self.record(ProviderCall::DeleteRoute(destination.clone()))?;
        lock(&self.inner)
            .routes
            .retain(|r| &r.destination != destination);
        Ok(())
    }

    async fn delete_route_table(&self, route_table_id: &str) -> Result<()> {
        self.record(ProviderCall::DeleteRouteTable(route_table_id.to_string()))
    }

    async fn create_subnet(&self, _network_id: &str, _cidr_block: &str) -> Result<String> {
        self.record(ProviderCall::CreateSubnet)?;
        Ok(self.next_id("subnet"))
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        self.record(ProviderCall::DeleteSubnet(subnet_id.to_string()))
    }

    async fn associate_route_table(
        &self,
        _route_table_id: &str,
        _subnet_id: &str,
    ) -> Result<String> {
        self.record(ProviderCall::AssociateRouteTable)?;
        Ok(self.next_id("rtbassoc"))
    }

    async fn disassociate_route_table(&self, association_id: &str) -> Result<()> {
        self.record(ProviderCall::DisassociateRouteTable(
            association_id.to_string(),
        ))
    }

    async fn list_tasks(&self, _cluster: Option<&str>, service_name: &str) -> Result<Vec<String>> {
        self.record(ProviderCall::ListTasks(service_name.to_string()))?;
        Ok(lock(&self.inner).service_tasks.clone())
    }

    async fn describe_tasks(
        &self,
        _cluster: Option<&str>,
        task_arns: &[String],
    ) -> Result<Vec<Task>> {
        self.record(ProviderCall::DescribeTasks(task_arns.to_vec()))?;
        let mut inner = lock(&self.inner);
        Ok(task_arns
            .iter()
            .filter_map(|arn| {
                inner
                    .tasks
                    .get_mut(arn)
                    .map(|scripted| Self::describe_task(arn, scripted))
            })
            .collect())
    }

    async fn describe_network_interfaces(
        &self,
        interface_ids: &[String],
    ) -> Result<Vec<NetworkInterface>> {
        self.record(ProviderCall::DescribeNetworkInterfaces(
            interface_ids.to_vec(),
        ))?;
        Ok(interface_ids
            .iter()
            .map(|id| NetworkInterface {
                network_interface_id: id.clone(),
                private_ip_address: Some(String::from("10.0.0.10")),
                ..NetworkInterface::default()
            })
            .collect())
    }

    async fn tag_resource(&self, _resource_arn: &str, key: &str, value: &str) -> Result<()> {
        self.record(ProviderCall::TagResource {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    async fn untag_resource(&self, _resource_arn: &str, key: &str) -> Result<()> {
        self.record(ProviderCall::UntagResource {
            key: key.to_string(),
        })
    }

    fn backend_type(&self) -> &'static str {
        "fake"
    }
}

/// A call recorded by [`FakeComponents`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum ComponentCall {
    Deploy {
        kind: ComponentKind,
        updating: bool,
        params: ComponentParams,
    },
    Remove(ComponentKind),
    Get(ComponentKind),
}

#[derive(Debug, Default)]
struct ComponentLedger {
    calls: Vec<ComponentCall>,
    revisions: i32,
    failing: Vec<ComponentKind>,
    gone: Vec<ComponentKind>,
}

/// Component fakes sharing one call ledger.
#[derive(Debug, Clone, Default)]
pub struct FakeComponents {
    ledger: Arc<Mutex<ComponentLedger>>,
}

impl FakeComponents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry whose handles record into this ledger.
    pub fn registry(&self) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for kind in [ComponentKind::TaskDefinition, ComponentKind::Service] {
            let ledger = Arc::clone(&self.ledger);
            registry.register(kind, move |params| {
                Ok(Box::new(FakeComponent {
                    params,
                    ledger: Arc::clone(&ledger),
                }))
            });
        }
        registry
    }

    pub fn fail_on(&self, kind: ComponentKind) {
        lock(&self.ledger).failing.push(kind);
    }

    pub fn clear_failures(&self) {
        lock(&self.ledger).failing.clear();
    }

    /// Makes `get` report the sub-resource as gone.
    pub fn mark_gone(&self, kind: ComponentKind) {
        lock(&self.ledger).gone.push(kind);
    }

    pub fn calls(&self) -> Vec<ComponentCall> {
        lock(&self.ledger).calls.clone()
    }

    pub fn reset_calls(&self) {
        lock(&self.ledger).calls.clear();
    }

    pub fn deploys(&self, kind: ComponentKind) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ComponentCall::Deploy { kind: k, .. } if *k == kind))
            .count()
    }
}

struct FakeComponent {
    params: ComponentParams,
    ledger: Arc<Mutex<ComponentLedger>>,
}

impl FakeComponent {
    fn check(&self, ledger: &ComponentLedger) -> Result<()> {
        let kind = self.params.kind();
        if ledger.failing.contains(&kind) {
            return Err(HalldyllError::internal(format!("injected {kind} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl Component for FakeComponent {
    fn kind(&self) -> ComponentKind {
        self.params.kind()
    }

    async fn deploy(&self, prev: Option<&ComponentOutput>) -> Result<ComponentOutput> {
        let mut ledger = lock(&self.ledger);
        self.check(&ledger)?;
        ledger.calls.push(ComponentCall::Deploy {
            kind: self.params.kind(),
            updating: prev.is_some(),
            params: self.params.clone(),
        });

        Ok(match &self.params {
            ComponentParams::TaskDefinition(p) => {
                ledger.revisions += 1;
                ComponentOutput::TaskDefinition(TaskDefinitionRef {
                    family: p.family.clone(),
                    revision: ledger.revisions,
                    arn: format!("arn:task-definition/{}:{}", p.family, ledger.revisions),
                })
            }
            ComponentParams::Service(p) => ComponentOutput::Service(ServiceRef {
                service_name: p.service_name.clone(),
                service_arn: format!("arn:service/{}", p.service_name),
                cluster: p.cluster.clone(),
            }),
        })
    }

    async fn remove(&self, _prev: &ComponentOutput) -> Result<()> {
        let mut ledger = lock(&self.ledger);
        self.check(&ledger)?;
        ledger.calls.push(ComponentCall::Remove(self.params.kind()));
        Ok(())
    }

    async fn get(&self, prev: &ComponentOutput) -> Result<Option<ComponentOutput>> {
        let mut ledger = lock(&self.ledger);
        self.check(&ledger)?;
        let kind = self.params.kind();
        ledger.calls.push(ComponentCall::Get(kind));
        Ok((!ledger.gone.contains(&kind)).then(|| prev.clone()))
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    states: HashMap<String, ProvisioningState>,
    locks: HashMap<String, LockInfo>,
    saves: usize,
    fail_after_saves: Option<usize>,
}

/// State store held in memory, with save-failure injection.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every save after the next `saves` successful ones fail.
    pub fn fail_after_saves(&self, saves: usize) {
        let mut inner = lock(&self.inner);
        inner.fail_after_saves = Some(inner.saves + saves);
    }

    pub fn clear_failures(&self) {
        lock(&self.inner).fail_after_saves = None;
    }

    pub fn saves(&self) -> usize {
        lock(&self.inner).saves
    }

    pub fn snapshot(&self, key: &str) -> Option<ProvisioningState> {
        lock(&self.inner).states.get(key).cloned()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, key: &str) -> Result<Option<ProvisioningState>> {
        Ok(lock(&self.inner).states.get(key).cloned())
    }

    async fn save(&self, key: &str, state: &ProvisioningState) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.fail_after_saves.is_some_and(|limit| inner.saves >= limit) {
            return Err(StateError::local("injected save failure").into());
        }
        inner.saves += 1;
        inner.states.insert(key.to_string(), state.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.states.remove(key);
        inner.locks.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(lock(&self.inner).states.contains_key(key))
    }

    async fn acquire_lock(&self, key: &str, holder: &str) -> Result<LockInfo> {
        let mut inner = lock(&self.inner);
        if let Some(existing) = inner.locks.get(key) {
            existing.ensure_expired()?;
        }
        let info = LockInfo::new(holder);
        inner.locks.insert(key.to_string(), info.clone());
        Ok(info)
    }

    async fn release_lock(&self, key: &str, lock_id: &str) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.locks.get(key).is_some_and(|l| l.lock_id == lock_id) {
            inner.locks.remove(key);
        }
        Ok(())
    }

    async fn get_lock_info(&self, key: &str) -> Result<Option<LockInfo>> {
        Ok(lock(&self.inner).locks.get(key).cloned())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
