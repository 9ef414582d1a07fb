// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment Configuration
//!
//! Everything a synthesis run needs before any stack is defined: project
//! identity, the shared network, the target account and region, and the
//! free-form context passed on the command line.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::composition::ContextValues;
use crate::domain::invariants::require_non_empty;
use crate::domain::{AppEnvironment, CidrBlock, DEFAULT_ORG_PREFIX};
use crate::errors::{StackError, StackResult};
use crate::stacks::VpcProps;

/// Owner of the source repositories
pub const DEFAULT_GITHUB_OWNER: &str = "m47ai";

/// Branch deployed when the context does not name one
pub const DEFAULT_BRANCH: &str = "main";

/// Context key selecting the deployment branch
pub const BRANCH_CONTEXT_KEY: &str = "branch";

/// Context keys holding comma separated subnet ids of a looked up VPC
pub const PRIVATE_SUBNETS_CONTEXT_KEY: &str = "private-subnets";
pub const PUBLIC_SUBNETS_CONTEXT_KEY: &str = "public-subnets";

pub const ACCOUNT_ENV_VAR: &str = "CDK_DEFAULT_ACCOUNT";
pub const REGION_ENV_VAR: &str = "CDK_DEFAULT_REGION";

fn default_org_prefix() -> String {
    DEFAULT_ORG_PREFIX.to_string()
}

fn default_github_owner() -> String {
    DEFAULT_GITHUB_OWNER.to_string()
}

fn default_app_environment() -> AppEnvironment {
    AppEnvironment::Production
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("cdk.out")
}

fn default_source_root() -> PathBuf {
    PathBuf::from(".")
}

/// Target account and region
///
/// Both may be absent; the provider then falls back to its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEnvironment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl DeploymentEnvironment {
    /// Read `CDK_DEFAULT_ACCOUNT` and `CDK_DEFAULT_REGION`
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Resolve through `lookup`; blank values count as unset
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            account: read(ACCOUNT_ENV_VAR),
            region: read(REGION_ENV_VAR),
        }
    }

    /// Account id, required wherever it is baked into a literal ARN
    pub fn require_account(&self) -> StackResult<&str> {
        self.account.as_deref().ok_or_else(|| {
            StackError::configuration(format!("{} is not set", ACCOUNT_ENV_VAR))
        })
    }

    /// Region, required wherever it is baked into a literal ARN
    pub fn require_region(&self) -> StackResult<&str> {
        self.region.as_deref().ok_or_else(|| {
            StackError::configuration(format!("{} is not set", REGION_ENV_VAR))
        })
    }
}

/// How the shared network is obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NetworkSettings {
    /// Existing VPC, referenced by id only
    Lookup {
        vpc_id: String,
        cidr_block: CidrBlock,
        #[serde(default)]
        private_subnet_ids: Vec<String>,
        #[serde(default)]
        public_subnet_ids: Vec<String>,
    },
    /// VPC provisioned by this run as a shared unit
    Provision(VpcProps),
}

impl NetworkSettings {
    /// Existing VPC in the legacy range
    pub fn lookup(vpc_id: impl Into<String>) -> Self {
        Self::Lookup {
            vpc_id: vpc_id.into(),
            cidr_block: CidrBlock::legacy(),
            private_subnet_ids: Vec::new(),
            public_subnet_ids: Vec::new(),
        }
    }
}

/// Settings for one synthesis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_org_prefix")]
    pub org_prefix: String,

    /// Repository name the stacks belong to
    pub project_id: String,

    #[serde(default = "default_github_owner")]
    pub github_owner: String,

    pub network: NetworkSettings,

    /// Environment of units shared by every part, such as a provisioned network
    #[serde(default = "default_app_environment")]
    pub app_environment: AppEnvironment,

    /// Where the assembly is written
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Relative asset paths are resolved against this directory
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,

    /// Command line context (`key=value`)
    #[serde(default)]
    pub context: ContextValues,

    /// Always resolved from the process environment, never from the file
    #[serde(skip)]
    pub environment: DeploymentEnvironment,
}

impl DeploymentConfig {
    pub fn new(project_id: impl Into<String>, network: NetworkSettings) -> Self {
        Self {
            org_prefix: default_org_prefix(),
            project_id: project_id.into(),
            github_owner: default_github_owner(),
            network,
            app_environment: default_app_environment(),
            out_dir: default_out_dir(),
            source_root: default_source_root(),
            context: ContextValues::new(),
            environment: DeploymentEnvironment::default(),
        }
    }

    /// New config with account and region taken from the environment
    pub fn from_env(project_id: impl Into<String>, network: NetworkSettings) -> Self {
        Self::new(project_id, network).with_environment(DeploymentEnvironment::from_env())
    }

    /// Read a JSON config file, then resolve account and region from the environment
    pub fn load(path: impl AsRef<Path>) -> StackResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            StackError::configuration(format!("Cannot read config {}: {}", path.display(), err))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;

        debug!(path = %path.display(), project = %config.project_id, "Config loaded");
        Ok(config.with_environment(DeploymentEnvironment::from_env()))
    }

    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("org_prefix", &self.org_prefix)?;
        require_non_empty("project_id", &self.project_id)?;
        require_non_empty("github_owner", &self.github_owner)?;
        if let NetworkSettings::Lookup { vpc_id, .. } = &self.network {
            require_non_empty("network.vpc_id", vpc_id)?;
        }
        Ok(())
    }

    pub fn with_environment(mut self, environment: DeploymentEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_app_environment(mut self, environment: AppEnvironment) -> Self {
        self.app_environment = environment;
        self
    }

    pub fn with_org_prefix(mut self, org_prefix: impl Into<String>) -> Self {
        self.org_prefix = org_prefix.into();
        self
    }

    pub fn with_github_owner(mut self, owner: impl Into<String>) -> Self {
        self.github_owner = owner.into();
        self
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    pub fn with_source_root(mut self, source_root: impl Into<PathBuf>) -> Self {
        self.source_root = source_root.into();
        self
    }

    /// Branch named by the `branch` context value, `main` otherwise
    pub fn branch(&self) -> &str {
        self.context.branch()
    }
}

/// Parse one `key=value` context argument
pub fn parse_context_arg(arg: &str) -> StackResult<(String, String)> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(StackError::configuration(format!(
            "Context argument '{}' must be key=value",
            arg
        ))),
    }
}
