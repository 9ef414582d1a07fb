// Copyright (c) 2025 - Cowboy AI, Inc.
//! Synthesis Model
//!
//! Provider-neutral document model every stack definition writes into:
//! [`Resource`]s owned by a [`DeployableUnit`], read-only
//! [`ResourceHandle`]s for cross-unit wiring, outputs and published
//! parameters. A unit renders to a CloudFormation-compatible template.

pub mod resource;
pub mod tokens;
pub mod unit;

pub use resource::{DeletionPolicy, Resource, ResourceHandle};
pub use tokens::{
    aws_account_id, aws_region, fn_get_att, fn_import_value, fn_join, fn_ref, fn_sub, logical_id,
    secret_value, REF,
};
pub use unit::{DeployableUnit, Output, PublishedParameter};
