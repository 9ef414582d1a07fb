// Copyright (c) 2025 - Cowboy AI, Inc.
//! Container image repository
//!
//! Either creates the repository or points at one that already exists in the
//! account. Both ways the stack outputs the repository URI image builds push to.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ResourceStack;
use crate::construct::{fn_sub, DeletionPolicy, DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::require_range;
use crate::domain::{ResourceType, StackIdentity, ValidationError};
use crate::errors::StackResult;

const MIN_NAME_LENGTH: i64 = 2;
const MAX_NAME_LENGTH: i64 = 256;

/// Whether the stack owns the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositorySource {
    Create,
    /// Looked up by name; nothing is declared
    Existing,
}

/// Repository settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcrProps {
    pub repository_name: String,
    pub source: RepositorySource,
}

impl EcrProps {
    pub fn create(repository_name: impl Into<String>) -> Self {
        Self {
            repository_name: repository_name.into(),
            source: RepositorySource::Create,
        }
    }

    pub fn existing(repository_name: impl Into<String>) -> Self {
        Self {
            repository_name: repository_name.into(),
            source: RepositorySource::Existing,
        }
    }

    /// Lowercase letters, digits and `._-/` separators, starting alphanumeric
    pub fn validate(&self) -> StackResult<()> {
        let name = &self.repository_name;
        require_range(
            "repository_name.length",
            name.len() as i64,
            MIN_NAME_LENGTH,
            MAX_NAME_LENGTH,
        )?;
        let starts_alphanumeric = name
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/".contains(c));
        if !starts_alphanumeric || !valid_chars {
            return Err(ValidationError::BusinessRule(format!(
                "Invalid repository name '{}'",
                name
            ))
            .into());
        }
        Ok(())
    }
}

/// `{account}.dkr.ecr.{region}.{suffix}/{name}`
pub fn repository_uri(repository_name: &str) -> Value {
    fn_sub(&format!(
        "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/{}",
        repository_name
    ))
}

pub struct EcrStack {
    unit: DeployableUnit,
    repository: Option<ResourceHandle>,
}

impl EcrStack {
    pub fn new(identity: StackIdentity, props: &EcrProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity).with_description("Container repository");

        let repository = match props.source {
            RepositorySource::Create => {
                let mut repository = unit.add(
                    Resource::new("Repository", ResourceType::ContainerRepository)
                        .with_properties(json!({
                            "RepositoryName": props.repository_name,
                            "ImageScanningConfiguration": { "ScanOnPush": true }
                        }))
                        .with_deletion_policy(DeletionPolicy::Delete),
                )?;
                let uri = unit.reference(&repository, "RepositoryUri")?;
                unit.output("RepositoryUri", uri, Some("Repository URI"), None);
                unit.export(&mut repository, "Arn", "RepositoryArn")?;
                unit.export(&mut repository, REF, "RepositoryName")?;
                Some(repository)
            }
            RepositorySource::Existing => {
                unit.output(
                    "RepositoryUri",
                    repository_uri(&props.repository_name),
                    Some("Repository URI"),
                    None,
                );
                None
            }
        };

        Ok(Self { unit, repository })
    }

    /// Created repository, `Arn` and `Ref` exported
    pub fn repository(&self) -> Option<&ResourceHandle> {
        self.repository.as_ref()
    }
}

impl ResourceStack for EcrStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}
