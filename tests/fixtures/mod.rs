// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for iac-stacks
//!
//! Deterministic deployment settings and scripted build parts shared by the
//! integration tests. Nothing here reads the process environment.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use iac_stacks::composition::{StackBuildPart, StackBuildProps};
use iac_stacks::config::{DeploymentConfig, DeploymentEnvironment, NetworkSettings};
use iac_stacks::construct::DeployableUnit;
use iac_stacks::errors::{StackError, StackResult};

pub const ACCOUNT: &str = "123456789012";
pub const REGION: &str = "eu-west-1";
pub const PROJECT: &str = "cdk-intro-workshop";
pub const VPC_ID: &str = "vpc-ee04cd97";
pub const BRANCH: &str = "main";

pub const API_DOCKERFILE: &str = "workshop/src/apps/Minimal.Api/Dockerfile";

/// Account and region as if exported by the deploy tool
pub fn deployment() -> DeploymentEnvironment {
    DeploymentEnvironment {
        account: Some(ACCOUNT.to_string()),
        region: Some(REGION.to_string()),
    }
}

/// Workshop config deploying into the existing VPC
pub fn config() -> DeploymentConfig {
    DeploymentConfig::new(PROJECT, NetworkSettings::lookup(VPC_ID))
        .with_environment(deployment())
        .with_context("branch", BRANCH)
}

/// Repository tree containing the API Dockerfile
pub fn write_workshop_tree(root: &Path) -> PathBuf {
    let dockerfile = root.join(API_DOCKERFILE);
    if let Some(parent) = dockerfile.parent() {
        fs::create_dir_all(parent).expect("create Dockerfile directory");
    }
    fs::write(&dockerfile, "FROM mcr.microsoft.com/dotnet/aspnet:9.0\n").expect("write Dockerfile");
    dockerfile
}

/// What a scripted part does when built
#[derive(Debug, Clone)]
pub enum Script {
    /// One unit per name
    Units(Vec<&'static str>),
    MissingAsset(&'static str),
    External(&'static str),
}

/// Build part whose outcome is fixed up front
pub struct ScriptedPart {
    name: String,
    depends_on: Vec<String>,
    script: Script,
    props: StackBuildProps,
    calls: Arc<AtomicUsize>,
}

impl ScriptedPart {
    pub fn new(props: &StackBuildProps, name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            depends_on: Vec::new(),
            script,
            props: props.clone(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn after(mut self, dependency: &str) -> Self {
        self.depends_on.push(dependency.to_string());
        self
    }

    /// Counter of `build` calls, readable after the part is moved into a run
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn boxed(self) -> Box<dyn StackBuildPart> {
        Box::new(self)
    }
}

impl StackBuildPart for ScriptedPart {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> Vec<String> {
        self.depends_on.clone()
    }

    fn build(&self) -> StackResult<Vec<DeployableUnit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Units(names) => names
                .iter()
                .map(|unit| -> StackResult<DeployableUnit> {
                    Ok(DeployableUnit::new(self.props.identity(unit)?))
                })
                .collect(),
            Script::MissingAsset(path) => Err(StackError::MissingAsset {
                path: PathBuf::from(path),
            }),
            Script::External(message) => Err(StackError::external(*message)),
        }
    }
}
