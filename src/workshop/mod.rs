// Copyright (c) 2025 - Cowboy AI, Inc.
//! Workshop Deployment
//!
//! The demo workload's infrastructure: a containerised API behind a REST
//! gateway, plus the shared pipeline, database and Windows bastion.

pub mod production_backend;
pub mod production_shared;

pub use production_backend::ProductionBackend;
pub use production_shared::ProductionShared;

use std::path::{Path, PathBuf};

use crate::composition::{StackBuildPart, StackBuildProps};

/// Repository the workshop is deployed from
pub const WORKSHOP_REPOSITORY: &str = "cdk-intro-workshop";

/// VPC the workshop deploys into
pub const WORKSHOP_VPC_ID: &str = "vpc-ee04cd97";

/// Where the workshop's build inputs live, relative to the repository root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePaths {
    pub repository_root: PathBuf,
    /// Docker build context of the API image
    pub api_context: PathBuf,
    /// Dockerfile of the API image, relative to its context
    pub api_dockerfile: PathBuf,
    pub frontend_dist: PathBuf,
}

impl ModulePaths {
    /// Standard layout under `repository_root`
    pub fn workshop(repository_root: impl Into<PathBuf>) -> Self {
        Self {
            repository_root: repository_root.into(),
            api_context: PathBuf::from("."),
            api_dockerfile: PathBuf::from("workshop/src/apps/Minimal.Api/Dockerfile"),
            frontend_dist: PathBuf::from("workshop/src/apps/frontend/dist"),
        }
    }

    /// `relative` under the repository root
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.repository_root.join(relative)
    }

    /// Label and absolute path of every module, for display
    pub fn entries(&self) -> Vec<(&'static str, PathBuf)> {
        vec![
            ("Repository Root", self.repository_root.clone()),
            (
                "API Dockerfile",
                self.resolve(&self.api_context).join(&self.api_dockerfile),
            ),
            ("Frontend Dist", self.resolve(&self.frontend_dist)),
        ]
    }
}

/// Every part of the workshop deployment, in the order they are requested
pub fn workshop_parts(props: &StackBuildProps, paths: &ModulePaths) -> Vec<Box<dyn StackBuildPart>> {
    vec![
        Box::new(ProductionBackend::new(props, paths)),
        Box::new(ProductionShared::new(props)),
    ]
}
