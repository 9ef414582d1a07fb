// Copyright (c) 2025 - Cowboy AI, Inc.
//! Production shared infrastructure: database, pipeline and bastion host

use crate::composition::{StackBuildPart, StackBuildProps};
use crate::construct::DeployableUnit;
use crate::domain::AppEnvironment;
use crate::errors::StackResult;
use crate::stacks::{
    BastionProps, BastionStack, DatabaseProps, DatabaseStack, PipelineProps, PipelineStack,
    ResourceStack,
};

pub const DATABASE_UNIT: &str = "RdsPostgres";
pub const PIPELINE_UNIT: &str = "Pipeline";
pub const BASTION_UNIT: &str = "bastion";

const PIPELINE_DOMAIN: &str = "workshop.com";
const GITHUB_TOKEN_SECRET: &str = "github-access-token-secret-dth2kY";
const TEST_BUILDSPECS: &[&str] = &[
    "workshop/src/iac/buildspecs/test/iac.yml",
    "workshop/src/iac/buildspecs/test/backend.yml",
];
const DEPLOY_BUILDSPECS: &[&str] = &["workshop/src/iac/buildspecs/production/backendApi.yml"];

pub struct ProductionShared {
    props: StackBuildProps,
}

impl ProductionShared {
    pub fn new(props: &StackBuildProps) -> Self {
        Self {
            props: props.for_environment(AppEnvironment::Production),
        }
    }

    fn database_stack(&self) -> StackResult<DatabaseStack> {
        let mut props = DatabaseProps::new(self.props.network.clone(), "workshop", "masteruser");
        props.backup_retention_days = 14;
        props.storage_size_gb = 100;
        props.monitoring_interval_seconds = 60;
        props.engine_version = "17.4".to_string();
        props.instance_class = "db.t3.micro".to_string();

        DatabaseStack::new(self.props.identity(DATABASE_UNIT)?, &props)
    }

    fn pipeline_stack(&self) -> StackResult<PipelineStack> {
        let deployment = &self.props.deployment;
        let secret_token_arn = format!(
            "arn:aws:secretsmanager:{}:{}:secret:{}",
            deployment.require_region()?,
            deployment.require_account()?,
            GITHUB_TOKEN_SECRET
        );

        let mut props = PipelineProps::new(
            self.props.project_id.clone(),
            self.props.github_owner.clone(),
            self.props.branch.clone(),
            secret_token_arn,
            self.props.network.clone(),
        );
        props.domain = PIPELINE_DOMAIN.to_string();
        props.test_buildspecs = TEST_BUILDSPECS.iter().map(|s| s.to_string()).collect();
        props.deploy_buildspecs = DEPLOY_BUILDSPECS.iter().map(|s| s.to_string()).collect();

        PipelineStack::new(self.props.identity(PIPELINE_UNIT)?, &props)
    }

    fn bastion_stack(&self) -> StackResult<BastionStack> {
        let props = BastionProps::new(self.props.network.clone());
        BastionStack::new(self.props.identity(BASTION_UNIT)?, &props)
    }
}

impl StackBuildPart for ProductionShared {
    fn name(&self) -> &str {
        "production-shared"
    }

    fn build(&self) -> StackResult<Vec<DeployableUnit>> {
        let database = self.database_stack()?;
        let pipeline = self.pipeline_stack()?;
        let bastion = self.bastion_stack()?;

        Ok(vec![
            database.into_unit(),
            pipeline.into_unit(),
            bastion.into_unit(),
        ])
    }
}
