//! Error types for the Halldyll Fargate deployment system.
//!
//! This module provides the error hierarchy for every stage of the service
//! lifecycle: configuration, state management, provider calls, sub-component
//! handling, and orchestration.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Halldyll deployment system.
#[derive(Debug, Error)]
pub enum HalldyllError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Provider (network/compute API) errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Sub-component errors.
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    /// Orchestration invariant violations.
    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {resource_type} name: {name}")]
    DuplicateName {
        /// Type of resource (container, tag, ...).
        resource_type: String,
        /// The duplicated name.
        name: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Local filesystem backend error.
    #[error("Local state backend error: {message}")]
    LocalError {
        /// Description of the filesystem error.
        message: String,
    },

    /// S3 backend error.
    #[error("S3 state backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Provider API errors.
///
/// Every remote call is a single logical operation that either succeeds or
/// fails terminally; failures abort the current deploy or remove.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A create/describe/delete call failed.
    #[error("{operation} failed: {message}")]
    CallFailed {
        /// Provider operation name.
        operation: String,
        /// Error message from the provider.
        message: String,
    },

    /// A call succeeded but the response lacked a required field.
    #[error("{operation} returned no {field}")]
    MissingField {
        /// Provider operation name.
        operation: String,
        /// The missing field.
        field: String,
    },
}

/// Sub-component errors.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// No constructor is registered for the requested kind.
    #[error("No component registered for kind '{kind}'")]
    NotRegistered {
        /// The requested component kind.
        kind: String,
    },

    /// A constructor was handed parameters of another kind.
    #[error("Component '{kind}' cannot be built from {params} parameters")]
    MismatchedParams {
        /// The component kind.
        kind: String,
        /// Kind of the parameters received.
        params: String,
    },

    /// A component returned an output of the wrong kind.
    #[error("Component '{kind}' returned an unexpected output: {output}")]
    UnexpectedOutput {
        /// The component kind.
        kind: String,
        /// Description of the output received.
        output: String,
    },
}

/// Orchestration errors.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A dependent creation needs an identifier that is not recorded.
    #[error("Cannot {needed_by}: {role} is not provisioned")]
    MissingResourcePrecondition {
        /// The role whose identifier is missing.
        role: String,
        /// The step that needed it.
        needed_by: String,
    },
}

/// Result type alias for Halldyll operations.
pub type Result<T> = std::result::Result<T, HalldyllError>;

impl HalldyllError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the error signals a broken orchestration invariant.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Orchestration(_) | Self::State(StateError::Corrupted { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a local backend error with the given message.
    #[must_use]
    pub fn local(message: impl Into<String>) -> Self {
        Self::LocalError {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a call failure for the given operation.
    #[must_use]
    pub fn call(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CallFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a missing-field error for the given operation.
    #[must_use]
    pub fn missing(operation: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            operation: operation.into(),
            field: field.into(),
        }
    }
}

impl OrchestrationError {
    /// Creates a missing precondition error.
    #[must_use]
    pub fn missing(role: impl std::fmt::Display, needed_by: impl Into<String>) -> Self {
        Self::MissingResourcePrecondition {
            role: role.to_string(),
            needed_by: needed_by.into(),
        }
    }
}
