// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Build Part contract

use crate::construct::DeployableUnit;
use crate::errors::StackResult;

/// A group of stack definitions built together for one module of the system
///
/// Implementations receive their [`StackBuildProps`](super::StackBuildProps)
/// at construction and keep no other state. Inside `build`, producers are
/// defined before their consumers; across parts, consumers import by export
/// name and declare the producing part in `depends_on`.
pub trait StackBuildPart {
    /// Unique name within a run
    fn name(&self) -> &str;

    /// Names of parts that must be built first
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    /// Define every unit of this part, in dependency order
    fn build(&self) -> StackResult<Vec<DeployableUnit>>;
}
