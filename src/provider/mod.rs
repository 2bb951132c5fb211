//! Network and compute provider abstraction.
//!
//! The orchestrator only talks to providers through [`ProviderClient`].
//! [`AwsProviderClient`] is the production implementation.

mod aws;
mod client;
mod types;

pub use aws::{AwsProviderClient, load_sdk_config};
pub(crate) use aws::{call_failed, required};
pub use client::ProviderClient;
pub use types::{
    ACL_RULE_CEILING, ACL_RULE_FLOOR, AclEntry, Attachment, AttachmentDetail, Container,
    LOCAL_GATEWAY, NETWORK_INTERFACE_DETAIL, NetworkInterface, Route, RouteDestination,
    RuleDirection, SecurityRule, Task,
};
