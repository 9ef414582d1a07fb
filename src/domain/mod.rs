// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Domain Models
//!
//! Value objects with validation invariants shared by every stack definition.
//!
//! # Value Objects with Invariants
//!
//! - [`StackIdentity`] - composite identity and canonical stack id
//! - [`CloudFormationName`] - names accepted by the provider
//! - [`ParameterPath`] - published parameter locations
//! - [`CidrBlock`] / [`PortRange`] - security group rule inputs
//! - [`TagSet`] - priority-merged resource tags
//! - [`ResourceType`] - provider resource taxonomy

pub mod environment;
pub mod identity;
pub mod invariants;
pub mod naming;
pub mod network;
pub mod resource_type;
pub mod tags;

pub use environment::AppEnvironment;
pub use identity::{AppType, ParameterPath, StackIdentity, DEFAULT_ORG_PREFIX};
pub use invariants::{ValidationError, ValidationResult};
pub use naming::{format_identifier, to_pascal_case, CloudFormationName, NamingError};
pub use network::{
    CidrBlock, NetworkError, Peer, PortRange, Protocol, RuleDirection, LEGACY_VPC_CIDR,
};
pub use resource_type::{ResourceCategory, ResourceType};
pub use tags::{Tag, TagSet, Taggable, DEFAULT_TAG_PRIORITY, PROJECT_TAG_PRIORITY};
