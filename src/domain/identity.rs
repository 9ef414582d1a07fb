// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Identity Value Object
//!
//! Every deployable unit is identified by `(organization prefix, project id,
//! unit name, environment)`. The identity derives the canonical stack id, export
//! names, parameter store paths and the project tags, so identical inputs always
//! produce identical names.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::environment::AppEnvironment;
use super::invariants::{require_non_empty, ValidationError};
use super::naming::{format_identifier, to_pascal_case};
use super::tags::{Tag, Taggable, PROJECT_TAG_PRIORITY};

/// Default organization prefix
pub const DEFAULT_ORG_PREFIX: &str = "M47";

/// Composite identity of a deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackIdentity {
    org_prefix: String,
    project_id: String,
    unit_name: String,
    environment: AppEnvironment,
}

impl StackIdentity {
    /// Create an identity
    ///
    /// # Invariants
    /// - organization prefix, project id and unit name are non-empty
    pub fn new(
        org_prefix: impl Into<String>,
        project_id: impl Into<String>,
        unit_name: impl Into<String>,
        environment: AppEnvironment,
    ) -> Result<Self, ValidationError> {
        let org_prefix = org_prefix.into();
        let project_id = project_id.into();
        let unit_name = unit_name.into();

        require_non_empty("org_prefix", &org_prefix)?;
        require_non_empty("project_id", &project_id)?;
        require_non_empty("unit_name", &unit_name)?;

        Ok(Self {
            org_prefix,
            project_id,
            unit_name,
            environment,
        })
    }

    /// Same project and environment, different unit
    pub fn for_unit(&self, unit_name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(
            self.org_prefix.clone(),
            self.project_id.clone(),
            unit_name,
            self.environment,
        )
    }

    pub fn org_prefix(&self) -> &str {
        &self.org_prefix
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    pub fn environment(&self) -> AppEnvironment {
        self.environment
    }

    /// Canonical stack identifier:
    /// `{org}-{project}-{unit}-{environment}-stack`, lowercase, every segment
    /// passed through [`format_identifier`].
    pub fn stack_id(&self) -> String {
        format!(
            "{}-{}-{}-{}-stack",
            format_identifier(&self.org_prefix),
            format_identifier(&self.project_id),
            format_identifier(&self.unit_name),
            self.environment.as_str()
        )
        .to_lowercase()
    }

    /// Project id formatted for CloudFormation names
    pub fn cloud_formation_project(&self) -> String {
        format_identifier(&self.project_id)
    }

    /// Export name derived from the stack id
    pub fn export_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.stack_id(), suffix)
    }

    /// Resource name scoped to project, unit and environment
    pub fn scoped_name(&self, name: &str) -> String {
        format!(
            "{}-{}-{}",
            self.cloud_formation_project(),
            name,
            self.environment.as_str()
        )
        .to_lowercase()
    }

    /// The three project tags
    pub fn project_tags(&self) -> [Tag; 3] {
        [
            Tag::new("StackId", self.stack_id(), PROJECT_TAG_PRIORITY),
            Tag::new("Environment", self.environment.as_str(), PROJECT_TAG_PRIORITY),
            Tag::new("Project", self.project_id.clone(), PROJECT_TAG_PRIORITY),
        ]
    }

    /// Attach the project tags to a resource
    pub fn tag<T: Taggable>(&self, target: &mut T) {
        let tags = target.tags_mut();
        for tag in self.project_tags() {
            tags.apply(tag);
        }
    }

    /// Parameter store path for a value consumed by `app_type`
    pub fn parameter_path(&self, app_type: AppType, category: &str, key: &str) -> ParameterPath {
        ParameterPath::new(
            &self.org_prefix,
            &self.project_id,
            self.environment,
            app_type,
            category,
            key,
        )
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stack_id())
    }
}

/// Application roles that consume published parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppType {
    MinimalApi,
    WorkerService,
}

impl AppType {
    pub const ALL: [AppType; 2] = [AppType::MinimalApi, AppType::WorkerService];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinimalApi => "Minimal.Api",
            Self::WorkerService => "WorkerService",
        }
    }

    /// Short lowercase form used in logical ids
    pub fn slug(&self) -> &'static str {
        match self {
            Self::MinimalApi => "api",
            Self::WorkerService => "workerservice",
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter store path
/// `/{Org}.{ProjectPascalCase}.Apps.{AppType}/{EnvironmentPascalCase}/{Category}/{Key}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterPath(String);

impl ParameterPath {
    pub fn new(
        org: &str,
        project_id: &str,
        environment: AppEnvironment,
        app_type: AppType,
        category: &str,
        key: &str,
    ) -> Self {
        let category = category.trim_matches('/');
        Self(format!(
            "/{}.{}.Apps.{}/{}/{}/{}",
            org,
            to_pascal_case(project_id),
            app_type.as_str(),
            environment.pascal_name(),
            category,
            to_pascal_case(key)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParameterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tags::TagSet;
    use pretty_assertions::assert_eq;

    struct Tagged(TagSet);

    impl Taggable for Tagged {
        fn tags_mut(&mut self) -> &mut TagSet {
            &mut self.0
        }
    }

    fn identity() -> StackIdentity {
        StackIdentity::new("m47", "cdk-intro-workshop", "ApiLambda", AppEnvironment::Production)
            .unwrap()
    }

    #[test]
    fn test_stack_id() {
        assert_eq!(
            identity().stack_id(),
            "m47-cdk-intro-workshop-apilambda-production-stack"
        );
    }

    #[test]
    fn test_stack_id_formats_every_segment() {
        let id = StackIdentity::new("M47", "My Repo", "Rds_Postgres", AppEnvironment::Test).unwrap();
        assert_eq!(id.stack_id(), "m47-my-repo-rds-postgres-test-stack");
    }

    #[test]
    fn test_empty_fields_rejected() {
        assert!(StackIdentity::new("m47", "", "unit", AppEnvironment::Test).is_err());
        assert!(StackIdentity::new("m47", "repo", "", AppEnvironment::Test).is_err());
        assert!(StackIdentity::new("", "repo", "unit", AppEnvironment::Test).is_err());
    }

    #[test]
    fn test_export_and_scoped_names() {
        let id = identity();
        assert_eq!(
            id.export_name("FunctionArn"),
            "m47-cdk-intro-workshop-apilambda-production-stack-FunctionArn"
        );
        assert_eq!(id.scoped_name("Api"), "cdk-intro-workshop-api-production");
    }

    #[test]
    fn test_tag_attaches_project_tags() {
        let mut target = Tagged(TagSet::new());
        identity().tag(&mut target);

        assert_eq!(target.0.len(), 3);
        assert_eq!(
            target.0.get("StackId"),
            Some("m47-cdk-intro-workshop-apilambda-production-stack")
        );
        assert_eq!(target.0.get("Environment"), Some("production"));
        assert_eq!(target.0.get("Project"), Some("cdk-intro-workshop"));
        assert!(target.0.iter().all(|t| t.priority == PROJECT_TAG_PRIORITY));
    }

    #[test]
    fn test_parameter_path() {
        let path = ParameterPath::new(
            "M47",
            "my-repo",
            AppEnvironment::Production,
            AppType::MinimalApi,
            "Database/ConnectionStrings",
            "mydbPostgres",
        );
        assert_eq!(
            path.as_str(),
            "/M47.MyRepo.Apps.Minimal.Api/Production/Database/ConnectionStrings/MydbPostgres"
        );
    }

    #[test]
    fn test_parameter_path_trims_category_slashes() {
        let id = StackIdentity::new("M47", "repo", "queue", AppEnvironment::Staging).unwrap();
        let path = id.parameter_path(AppType::WorkerService, "/Jobs/Aws/", "QueueUrl");
        assert_eq!(path.as_str(), "/M47.Repo.Apps.WorkerService/Staging/Jobs/Aws/QueueUrl");
    }
}
