//! Stack composition for cloud deployments
//!
//! This crate turns typed stack definitions into deployable units with
//! canonical names, tags and cross-stack wiring, then orders and
//! synthesizes them into a cloud assembly.

pub mod asset;
pub mod assembly;
pub mod composition;
pub mod config;
pub mod construct;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod scaling;
pub mod stacks;
pub mod state_machine;
pub mod workshop;

// Re-export commonly used types
pub use assembly::{Assembly, Manifest, StackArtifact};
pub use composition::{
    BuildReport, ContextValues, SharedNetwork, StackBuildPart, StackBuildProps, StackBuilder,
};
pub use config::{DeploymentConfig, DeploymentEnvironment, NetworkSettings};
pub use construct::{DeployableUnit, Resource};
pub use domain::{AppEnvironment, StackIdentity};
pub use errors::{StackError, StackResult};
pub use stacks::ResourceStack;
