//! State management module for the Halldyll Fargate deployment system.
//!
//! This module provides persistent, per-instance storage of provisioned
//! resource ids, sub-resource refs, observed task metadata and history.

mod local;
mod lock;
mod s3;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use s3::S3StateStore;
pub use store::StateStore;
pub use types::{
    NetworkIds, NetworkStep, Operation, OperationHistoryEntry, ProvisioningState, ResourceRole,
    STATE_VERSION, ServiceRef, TaskDefinitionRef,
};
