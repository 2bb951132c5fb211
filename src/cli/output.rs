//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::orchestrator::{ActionType, DeploymentPlan, ServiceOutputs};
use crate::state::{LockInfo, ProvisioningState};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Task container row for table display.
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Container")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Task")]
    task: String,
}

/// Network resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "ID")]
    id: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&PlanJson::from(plan)),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &DeploymentPlan, detailed: bool) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "\nDeployment Plan");
        let _ = write!(
            output,
            "   Config hash: {}\n\n",
            Self::short(&plan.config_hash)
        );

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                resource: a.resource.clone(),
                reason: if detailed {
                    a.reason.clone()
                } else {
                    Self::truncate(&a.reason, 40)
                },
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(output, "\nPlan: {}\n", plan.summary());
        output
    }

    /// Formats what a deploy or refresh reported.
    #[must_use]
    pub fn format_outputs(&self, outputs: &ServiceOutputs) -> String {
        match self.format {
            OutputFormat::Json => Self::json(outputs),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = write!(output, "\nService: {}\n\n", outputs.service_name);
                let _ = writeln!(output, "   ARN: {}", outputs.service_arn);
                if let Some(td) = &outputs.task_definition {
                    let _ = writeln!(output, "   Task definition: {td}");
                }

                let status = if outputs.converged {
                    "converged".green().to_string()
                } else {
                    "not converged".yellow().to_string()
                };
                let _ = write!(output, "   Tasks: {status}\n\n");

                if outputs.containers.is_empty() {
                    output.push_str("   No running containers.\n");
                } else {
                    let rows: Vec<ContainerRow> = outputs
                        .containers
                        .iter()
                        .map(|c| ContainerRow {
                            name: c.name.clone(),
                            status: c.last_status.clone().unwrap_or_default(),
                            task: Self::truncate(c.task_arn.as_deref().unwrap_or("-"), 40),
                        })
                        .collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                let addresses: Vec<String> = outputs
                    .network_interfaces
                    .iter()
                    .filter_map(|i| i.public_ip.clone().or_else(|| i.private_ip_address.clone()))
                    .collect();
                if !addresses.is_empty() {
                    let _ = writeln!(output, "\nAddresses: {}", addresses.join(", "));
                }

                output
            }
        }
    }

    /// Formats provisioning state.
    #[must_use]
    pub fn format_state(&self, state: &ProvisioningState) -> String {
        match self.format {
            OutputFormat::Json => Self::json(state),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = write!(output, "\nState: {}\n\n", state.instance);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Config hash: {}", Self::short(&state.config_hash));
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                if let Some(td) = &state.task_definition {
                    let _ = writeln!(output, "   Task definition: {}", td.family_revision());
                }
                if let Some(service) = &state.service {
                    let _ = writeln!(output, "   Service: {}", service.service_arn);
                }

                let rows: Vec<ResourceRow> = state
                    .network
                    .present()
                    .map(|(role, id)| ResourceRow {
                        role: role.to_string(),
                        id: id.to_string(),
                    })
                    .collect();
                if !rows.is_empty() {
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success {
                            "✓".green()
                        } else {
                            "✗".red()
                        };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {}{}",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry
                                .error
                                .as_deref()
                                .map(|e| format!(" ({e})"))
                                .unwrap_or_default()
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats lock information.
    #[must_use]
    pub fn format_lock(&self, lock: &LockInfo) -> String {
        match self.format {
            OutputFormat::Json => Self::json(lock),
            OutputFormat::Text => format!(
                "{} State locked by {} (lock id {}, {}s remaining)",
                "✓".green(),
                lock.holder,
                lock.lock_id,
                lock.remaining_secs()
            ),
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Replace => "-/+replace".yellow().to_string(),
            ActionType::Tag => "~tag".cyan().to_string(),
        }
    }

    fn json(value: &impl Serialize) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    /// First eight characters of a hash.
    fn short(hash: &str) -> &str {
        hash.get(..8).unwrap_or(hash)
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson {
    config_hash: String,
    action_count: usize,
    actions: Vec<ActionJson>,
}

#[derive(Serialize)]
struct ActionJson {
    action_type: String,
    resource: String,
    reason: String,
}

impl From<&DeploymentPlan> for PlanJson {
    fn from(plan: &DeploymentPlan) -> Self {
        Self {
            config_hash: plan.config_hash.clone(),
            action_count: plan.actions.len(),
            actions: plan
                .actions
                .iter()
                .map(|a| ActionJson {
                    action_type: a.action_type.to_string(),
                    resource: a.resource.clone(),
                    reason: a.reason.clone(),
                })
                .collect(),
        }
    }
}
