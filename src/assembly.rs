// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cloud Assembly
//!
//! The synthesized output of a run: one template per deployable unit plus a
//! manifest listing the units in deployment order.
//!
//! ```text
//! <out>/manifest.json
//! <out>/<stack-id>.template.json
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::composition::{order_nodes, BuildReport, PartNode};
use crate::config::DeploymentEnvironment;
use crate::construct::DeployableUnit;
use crate::errors::{StackError, StackResult};

pub const MANIFEST_VERSION: &str = "1.0";
pub const MANIFEST_FILE: &str = "manifest.json";

/// One stack in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackArtifact {
    pub stack_id: String,
    pub template_file: String,
    /// Stacks whose exports this one imports
    pub dependencies: Vec<String>,
    /// `aws://{account}/{region}`
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub branch: String,
    /// Deployment order
    pub stacks: Vec<StackArtifact>,
}

/// Rendered templates and their manifest
#[derive(Debug, Clone)]
pub struct Assembly {
    manifest: Manifest,
    templates: HashMap<String, Value>,
}

impl Assembly {
    /// Render every unit of `report`
    ///
    /// # Invariants
    /// - one unit per canonical stack id
    /// - a stack follows every stack it imports from
    pub fn from_report(report: &BuildReport) -> StackResult<Self> {
        let units: Vec<&DeployableUnit> = report.units().collect();

        let mut seen = HashSet::with_capacity(units.len());
        for unit in &units {
            let id = unit.id();
            if !seen.insert(id.clone()) {
                return Err(StackError::DuplicateUnit(id));
            }
        }

        let nodes: Vec<PartNode> = units
            .iter()
            .map(|unit| {
                let id = unit.id();
                let mut depends_on = Vec::new();
                for dependency in unit.dependencies() {
                    if seen.contains(dependency) {
                        depends_on.push(dependency.to_string());
                    } else {
                        warn!(
                            stack_id = %id,
                            dependency = %dependency,
                            "Imports from a stack outside this assembly"
                        );
                    }
                }
                PartNode {
                    name: id,
                    depends_on,
                }
            })
            .collect();
        let order = order_nodes(&nodes)?;

        let environment = environment_uri(&report.deployment);
        let mut stacks = Vec::with_capacity(units.len());
        let mut templates = HashMap::with_capacity(units.len());
        for index in order {
            let unit = units[index];
            let stack_id = unit.id();
            stacks.push(StackArtifact {
                template_file: template_file_name(&stack_id),
                dependencies: unit.dependencies().map(str::to_string).collect(),
                environment: environment.clone(),
                description: unit.description().map(str::to_string),
                stack_id: stack_id.clone(),
            });
            templates.insert(stack_id, unit.template());
        }

        Ok(Self {
            manifest: Manifest {
                version: MANIFEST_VERSION.to_string(),
                run_id: Uuid::now_v7(),
                created_at: Utc::now(),
                branch: report.branch.clone(),
                stacks,
            },
            templates,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Stack ids in deployment order
    pub fn stack_ids(&self) -> Vec<&str> {
        self.manifest
            .stacks
            .iter()
            .map(|stack| stack.stack_id.as_str())
            .collect()
    }

    pub fn template(&self, stack_id: &str) -> Option<&Value> {
        self.templates.get(stack_id)
    }

    /// Write every template and the manifest under `out_dir`
    pub fn write(&self, out_dir: &Path) -> StackResult<PathBuf> {
        fs::create_dir_all(out_dir)?;

        for stack in &self.manifest.stacks {
            let template = self.templates.get(&stack.stack_id).ok_or_else(|| {
                StackError::configuration(format!("No template for {}", stack.stack_id))
            })?;
            fs::write(
                out_dir.join(&stack.template_file),
                serde_json::to_string_pretty(template)?,
            )?;
        }

        let manifest_path = out_dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(&self.manifest)?)?;

        info!(
            path = %out_dir.display(),
            stacks = self.manifest.stacks.len(),
            run_id = %self.manifest.run_id,
            "Assembly written"
        );
        Ok(manifest_path)
    }
}

pub fn template_file_name(stack_id: &str) -> String {
    format!("{}.template.json", stack_id)
}

fn environment_uri(environment: &DeploymentEnvironment) -> String {
    format!(
        "aws://{}/{}",
        environment.account.as_deref().unwrap_or("unknown-account"),
        environment.region.as_deref().unwrap_or("unknown-region")
    )
}
