// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Composition
//!
//! Build parts group stack definitions into deployable modules. The
//! [`StackBuilder`] resolves what every part shares (branch, account and
//! region, the network), orders parts by their declared dependencies and
//! builds them one at a time.
//!
//! ```text
//! DeploymentConfig → StackBuilder::new → StackBuildProps → parts → build → BuildReport
//! ```

pub mod build_part;
pub mod builder;
pub mod observer;
pub mod ordering;

pub use build_part::StackBuildPart;
pub use builder::{BuildReport, PartOutcome, PartReport, StackBuilder};
pub use observer::{
    BuildEvent, BuildObserver, EventLevel, RecordedEvent, RecordingObserver, TracingObserver,
};
pub use ordering::{build_order, order_nodes, PartNode};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{
    DeploymentConfig, DeploymentEnvironment, NetworkSettings, BRANCH_CONTEXT_KEY, DEFAULT_BRANCH,
    PRIVATE_SUBNETS_CONTEXT_KEY, PUBLIC_SUBNETS_CONTEXT_KEY,
};
use crate::construct::DeployableUnit;
use crate::domain::{AppEnvironment, StackIdentity};
use crate::errors::StackResult;
use crate::stacks::{repository_url, NetworkStack, ResourceStack, VpcReference};

/// Unit name of the provisioned shared network
pub const SHARED_NETWORK_UNIT: &str = "VpcStack";

/// Free-form `key=value` context supplied on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextValues(BTreeMap<String, String>);

impl ContextValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Value for `key`; blank values count as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Deployment branch, `main` unless the context names one
    pub fn branch(&self) -> &str {
        self.get(BRANCH_CONTEXT_KEY).unwrap_or(DEFAULT_BRANCH)
    }

    /// Comma separated list under `key`, empty entries dropped
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for ContextValues {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The network every part deploys into
pub enum SharedNetwork {
    /// Existing VPC, referenced by id
    Existing(VpcReference),
    /// VPC defined by this run; its unit ships with the assembly
    Provisioned(Box<NetworkStack>),
}

impl SharedNetwork {
    /// Look up or define the network named by `config`
    ///
    /// A lookup without subnet ids takes them from the `private-subnets` and
    /// `public-subnets` context values.
    pub fn resolve(config: &DeploymentConfig) -> StackResult<Self> {
        match &config.network {
            NetworkSettings::Lookup {
                vpc_id,
                cidr_block,
                private_subnet_ids,
                public_subnet_ids,
            } => {
                let private_subnets =
                    subnets_or_context(private_subnet_ids, &config.context, PRIVATE_SUBNETS_CONTEXT_KEY);
                let public_subnets =
                    subnets_or_context(public_subnet_ids, &config.context, PUBLIC_SUBNETS_CONTEXT_KEY);
                Ok(Self::Existing(VpcReference::lookup(
                    vpc_id,
                    cidr_block.clone(),
                    &private_subnets,
                    &public_subnets,
                )))
            }
            NetworkSettings::Provision(props) => {
                let identity = StackIdentity::new(
                    config.org_prefix.clone(),
                    config.project_id.clone(),
                    SHARED_NETWORK_UNIT,
                    config.app_environment,
                )?;
                Ok(Self::Provisioned(Box::new(NetworkStack::new(identity, props)?)))
            }
        }
    }

    pub fn reference(&self) -> &VpcReference {
        match self {
            Self::Existing(reference) => reference,
            Self::Provisioned(stack) => stack.reference(),
        }
    }

    pub fn is_provisioned(&self) -> bool {
        matches!(self, Self::Provisioned(_))
    }

    /// Split into the reference parts consume and the unit to synthesize, if any
    pub fn into_parts(self) -> (VpcReference, Option<DeployableUnit>) {
        match self {
            Self::Existing(reference) => (reference, None),
            Self::Provisioned(stack) => {
                let reference = stack.reference().clone();
                (reference, Some(stack.into_unit()))
            }
        }
    }
}

fn subnets_or_context(configured: &[String], context: &ContextValues, key: &str) -> Vec<String> {
    if configured.is_empty() {
        context.list(key)
    } else {
        configured.to_vec()
    }
}

/// What every build part receives
#[derive(Debug, Clone, PartialEq)]
pub struct StackBuildProps {
    pub environment: AppEnvironment,
    pub deployment: DeploymentEnvironment,
    pub org_prefix: String,
    pub project_id: String,
    pub github_owner: String,
    pub branch: String,
    pub network: VpcReference,
    /// Default subdomain for public endpoints, `{project}-api`
    pub subdomain: String,
    pub source_root: PathBuf,
    /// Where the assembly is written; never part of an asset fingerprint
    pub out_dir: PathBuf,
}

impl StackBuildProps {
    /// Identity of `unit_name` in this run's project and environment
    pub fn identity(&self, unit_name: &str) -> StackResult<StackIdentity> {
        Ok(StackIdentity::new(
            self.org_prefix.clone(),
            self.project_id.clone(),
            unit_name,
            self.environment,
        )?)
    }

    /// Same props targeting another environment
    pub fn for_environment(&self, environment: AppEnvironment) -> Self {
        Self {
            environment,
            ..self.clone()
        }
    }

    /// `relative` resolved against the source root
    pub fn source_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.source_root.join(relative)
    }

    pub fn repository_url(&self) -> String {
        repository_url(&self.github_owner, &self.project_id, &self.branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CidrBlock;
    use crate::stacks::VpcProps;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_context_branch() {
        let mut context = ContextValues::new();
        assert_eq!(context.branch(), "main");
        context.insert("branch", "  ");
        assert_eq!(context.branch(), "main");
        context.insert("branch", "feature/x");
        assert_eq!(context.branch(), "feature/x");
    }

    #[test]
    fn test_lookup_network_has_no_unit() {
        let config =
            DeploymentConfig::new("cdk-intro-workshop", NetworkSettings::lookup("vpc-ee04cd97"));
        let network = SharedNetwork::resolve(&config).unwrap();
        assert!(!network.is_provisioned());

        let (reference, unit) = network.into_parts();
        assert_eq!(reference.vpc_id, serde_json::json!("vpc-ee04cd97"));
        assert!(unit.is_none());
    }

    #[test]
    fn test_lookup_subnets_fall_back_to_context() {
        let config =
            DeploymentConfig::new("cdk-intro-workshop", NetworkSettings::lookup("vpc-ee04cd97"))
                .with_context("private-subnets", "subnet-a, subnet-b,")
                .with_context("public-subnets", "subnet-c");
        let network = SharedNetwork::resolve(&config).unwrap();

        assert_eq!(
            network.reference().private_subnets,
            vec![serde_json::json!("subnet-a"), serde_json::json!("subnet-b")]
        );
        assert_eq!(network.reference().public_subnets, vec![serde_json::json!("subnet-c")]);
    }

    #[test]
    fn test_provisioned_network_ships_a_unit() {
        let config = DeploymentConfig::new(
            "cdk-intro-workshop",
            NetworkSettings::Provision(VpcProps::standard("workshop", CidrBlock::legacy())),
        );
        let (reference, unit) = SharedNetwork::resolve(&config).unwrap().into_parts();
        let unit = unit.unwrap();

        assert_eq!(unit.id(), "m47-cdk-intro-workshop-vpcstack-production-stack");
        assert_eq!(reference.stack_id.as_deref(), Some(unit.id().as_str()));
        assert_eq!(reference.private_subnets.len(), 2);
    }
}
