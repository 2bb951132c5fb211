// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Halldyll Deploy Fargate
//!
//! Idempotent, checkpointed provisioning of Fargate services and the private
//! network they run in.
//!
//! ## Overview
//!
//! A single YAML file describes one service: its task size, containers,
//! replica count, tags and, optionally, an existing network to launch into.
//! Halldyll converges AWS towards that description:
//!
//! - Builds a seven-role network stack (VPC, internet gateway, security
//!   group, network ACL, route table, subnet, association) when no network
//!   is supplied
//! - Registers the task definition and creates or updates the service
//! - Polls the service's tasks until they reach their desired status
//! - Tears everything down in the exact reverse order
//!
//! ## Architecture
//!
//! Every provisioned identifier is recorded in a [`state::ProvisioningState`]
//! and checkpointed after each step. Presence of an id is the only signal
//! that decides whether a creation step runs, so an interrupted deploy or
//! destroy resumes where it stopped.
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`state`]: State storage backends (local, S3)
//! - [`provider`]: EC2/ECS provider abstraction
//! - [`components`]: Task definition and service sub-resources
//! - [`orchestrator`]: Deploy, refresh, plan and teardown sequencing
//! - [`reconciler`]: Tag reconciliation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: storefront
//!   environment: prod
//!
//! service:
//!   name: web
//!   cpu: 256
//!   memory: 512
//!   expose_publicly: true
//!   containers:
//!     - name: web
//!       image: nginx:1.27
//!       ports:
//!         - "80/tcp"
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod components;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod reconciler;
pub mod state;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use components::{Component, ComponentKind, ComponentRegistry};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, DeployConfig};
pub use error::{HalldyllError, Result};
pub use orchestrator::{DeploymentPlan, ServiceOrchestrator, ServiceOutputs};
pub use provider::{AwsProviderClient, ProviderClient};
pub use reconciler::{AttributeReconciler, AttributeSink};
pub use state::{LocalStateStore, ProvisioningState, S3StateStore, StateStore};
