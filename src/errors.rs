//! Error types for stack construction and orchestration

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{NamingError, NetworkError, ValidationError};
use crate::state_machine::TransitionError;

/// Errors that can occur while defining, composing or synthesizing stacks
#[derive(Debug, Error)]
pub enum StackError {
    /// Malformed or missing configuration input
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A domain invariant was violated
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A local build artifact referenced by an asset does not exist
    #[error("Cannot find asset at {}", path.display())]
    MissingAsset { path: PathBuf },

    /// A handle from another unit was referenced but never exported
    #[error("Unresolved reference to {logical_id}.{attribute} in stack {stack_id}")]
    UnresolvedReference {
        stack_id: String,
        logical_id: String,
        attribute: String,
    },

    /// Two resources in one unit share a logical id
    #[error("Duplicate resource '{logical_id}' in stack {stack_id}")]
    DuplicateResource { stack_id: String, logical_id: String },

    /// Two units in one run share a canonical identifier
    #[error("Duplicate deployable unit: {0}")]
    DuplicateUnit(String),

    /// A build part depends on a part that is not part of the run
    #[error("Build part '{part}' depends on unknown part '{dependency}'")]
    UnknownDependency { part: String, dependency: String },

    /// Build part dependencies form a cycle
    #[error("Dependency cycle between build parts: {}", parts.join(" -> "))]
    DependencyCycle { parts: Vec<String> },

    /// The build lifecycle rejected a transition
    #[error("Build lifecycle error: {0}")]
    Transition(#[from] TransitionError),

    /// Error raised by the provider or any collaborator outside this crate
    #[error("{0}")]
    External(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while writing an assembly
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the orchestrator treats an error raised by a build part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input problem; aborts the run
    Configuration,
    /// Skip the failing part and keep building
    RecoverableBuild,
    /// Anything else; aborts the run
    Fatal,
}

impl StackError {
    /// Classify this error for orchestration
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingAsset { .. } => ErrorKind::RecoverableBuild,
            Self::Configuration(_)
            | Self::Validation(_)
            | Self::UnknownDependency { .. }
            | Self::DependencyCycle { .. }
            | Self::DuplicateResource { .. }
            | Self::DuplicateUnit(_) => ErrorKind::Configuration,
            _ => ErrorKind::Fatal,
        }
    }

    /// Whether the orchestrator may skip the failing part and continue
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::RecoverableBuild
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::External(message.into())
    }
}

impl From<NamingError> for StackError {
    fn from(err: NamingError) -> Self {
        StackError::Configuration(err.to_string())
    }
}

impl From<NetworkError> for StackError {
    fn from(err: NetworkError) -> Self {
        StackError::Configuration(err.to_string())
    }
}

/// Result type for stack operations
pub type StackResult<T> = Result<T, StackError>;
