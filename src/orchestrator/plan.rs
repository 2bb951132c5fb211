//! Deployment plan types and construction.
//!
//! A plan lists the creation and update steps a deploy would perform
//! against the recorded state. Building one makes no provider calls.

use chrono::{DateTime, Utc};

use crate::components::ComponentKind;
use crate::config::{ConfigHasher, ServiceInstance};
use crate::reconciler::AttributeReconciler;
use crate::state::{ProvisioningState, ResourceRole};

/// A complete deployment plan.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Configuration hash this plan is based on.
    pub config_hash: String,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// A single planned action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Resource the action applies to.
    pub resource: String,
    /// Reason for this action.
    pub reason: String,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Create a resource.
    Create,
    /// Update a resource in place.
    Update,
    /// Replace a resource with a new revision.
    Replace,
    /// Set or unset service tags.
    Tag,
}

impl DeploymentPlan {
    /// Builds the plan for deploying an instance over a recorded state.
    #[must_use]
    pub fn build(instance: &ServiceInstance, state: &ProvisioningState, config_hash: &str) -> Self {
        let mut actions = Vec::new();

        let fingerprint = ConfigHasher::new().hash_task_definition(instance);
        match &state.task_definition {
            None => actions.push(PlannedAction::new(
                ActionType::Create,
                ComponentKind::TaskDefinition.as_str(),
                format!("Register {}", instance.task_family()),
            )),
            Some(td) if state.task_definition_hash.as_deref() != Some(fingerprint.as_str()) => {
                actions.push(PlannedAction::new(
                    ActionType::Replace,
                    ComponentKind::TaskDefinition.as_str(),
                    format!("Task definition inputs changed since {}", td.family_revision()),
                ));
            }
            Some(_) => {}
        }

        if !instance.has_explicit_network() {
            actions.extend(
                ResourceRole::CREATION_ORDER
                    .into_iter()
                    .filter(|role| state.network.get(*role).is_none())
                    .map(|role| {
                        PlannedAction::new(ActionType::Create, role.as_str(), "Not provisioned")
                    }),
            );
            actions.extend(state.network.pending_steps().map(|step| {
                PlannedAction::new(
                    ActionType::Update,
                    step.role().as_str(),
                    format!("Finish {step}"),
                )
            }));
        }

        actions.push(match &state.service {
            None => PlannedAction::new(
                ActionType::Create,
                ComponentKind::Service.as_str(),
                format!("Launch {} with {} tasks", instance.name, instance.desired_count),
            ),
            Some(service) => PlannedAction::new(
                ActionType::Update,
                ComponentKind::Service.as_str(),
                format!(
                    "Roll {} to {} tasks",
                    service.service_name, instance.desired_count
                ),
            ),
        });

        let tag_changes = AttributeReconciler::new().diff(&instance.tags, &state.tags);
        if !tag_changes.is_empty() {
            actions.push(PlannedAction::new(
                ActionType::Tag,
                "tags",
                format!("{} tag changes", tag_changes.len()),
            ));
        }

        Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions,
        }
    }

    /// Returns the number of actions of a given type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    /// Returns a one-line summary of the plan.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} to create, {} to update, {} to replace, {} tag updates",
            self.count(ActionType::Create),
            self.count(ActionType::Update),
            self.count(ActionType::Replace),
            self.count(ActionType::Tag),
        )
    }
}

impl PlannedAction {
    fn new(action_type: ActionType, resource: &str, reason: impl Into<String>) -> Self {
        Self {
            action_type,
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Replace => write!(f, "REPLACE"),
            Self::Tag => write!(f, "TAG"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{NetworkStep, ServiceRef, TaskDefinitionRef};
    use crate::testing::sample_config;

    #[test]
    fn test_plan_from_empty_state() {
        let config = sample_config("web");
        let state = ProvisioningState::new("web");

        let plan = DeploymentPlan::build(&config.service, &state, "abc");

        assert_eq!(plan.count(ActionType::Create), 9);
        assert_eq!(plan.actions[0].resource, "task-definition");
        assert_eq!(plan.actions[1].resource, "network");
        assert_eq!(plan.actions[8].resource, "service");
        assert_eq!(plan.count(ActionType::Tag), 0);
    }

    #[test]
    fn test_plan_over_deployed_state() {
        let mut config = sample_config("web");
        let mut state = ProvisioningState::new("web");
        for role in ResourceRole::CREATION_ORDER {
            state.network.set(role, format!("{role}-1"));
            for &step in NetworkStep::for_role(role) {
                state.network.mark_done(step);
            }
        }
        state.task_definition = Some(TaskDefinitionRef {
            family: String::from("web-family"),
            revision: 1,
            arn: String::from("arn:td/web-family:1"),
        });
        state.task_definition_hash =
            Some(ConfigHasher::new().hash_task_definition(&config.service));
        state.service = Some(ServiceRef {
            service_name: String::from("web"),
            service_arn: String::from("arn:service/web"),
            cluster: None,
        });

        let plan = DeploymentPlan::build(&config.service, &state, "abc");
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].action_type, ActionType::Update);

        config.service.containers[0].image = String::from("nginx:1.28");
        config
            .service
            .tags
            .insert(String::from("team"), String::from("core"));
        let plan = DeploymentPlan::build(&config.service, &state, "def");
        assert_eq!(plan.count(ActionType::Replace), 1);
        assert_eq!(plan.count(ActionType::Tag), 1);
        assert_eq!(
            plan.summary(),
            "0 to create, 1 to update, 1 to replace, 1 tag updates"
        );
    }

    #[test]
    fn test_plan_lists_unfinished_follow_ups() {
        let config = sample_config("web");
        let mut state = ProvisioningState::new("web");
        state.network.set(ResourceRole::Network, "vpc-1");
        state.network.set(ResourceRole::Gateway, "igw-1");

        let plan = DeploymentPlan::build(&config.service, &state, "abc");

        let follow_ups: Vec<&PlannedAction> = plan
            .actions
            .iter()
            .filter(|a| a.action_type == ActionType::Update)
            .collect();
        assert_eq!(follow_ups.len(), 1);
        assert_eq!(follow_ups[0].resource, "gateway");
        assert_eq!(follow_ups[0].reason, "Finish attach gateway");
    }
}
