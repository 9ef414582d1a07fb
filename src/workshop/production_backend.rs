// Copyright (c) 2025 - Cowboy AI, Inc.
//! Production backend: the API function and its gateway

use tracing::debug;

use super::ModulePaths;
use crate::asset::AssetSource;
use crate::composition::{StackBuildPart, StackBuildProps};
use crate::construct::DeployableUnit;
use crate::domain::{format_identifier, AppEnvironment};
use crate::errors::StackResult;
use crate::stacks::{
    FunctionProps, FunctionStack, GatewayProps, GatewayStack, HostedZone, ResourceStack,
};

pub const API_FUNCTION_UNIT: &str = "ApiLambda";
pub const API_GATEWAY_UNIT: &str = "ApiGateway";
pub const API_SUBDOMAIN: &str = "api-cdk-workshop";
pub const API_DOMAIN: &str = "m47.io";

const API_TIMEOUT_SECONDS: u32 = 29;
const API_MEMORY_SIZE_MB: u32 = 1024;
const API_CERTIFICATE_ID: &str = "be63062d-5316-47af-9f94-819c1dc02853";

pub struct ProductionBackend {
    props: StackBuildProps,
    image: AssetSource,
}

impl ProductionBackend {
    pub fn new(props: &StackBuildProps, paths: &ModulePaths) -> Self {
        Self {
            props: props.for_environment(AppEnvironment::Production),
            image: AssetSource::docker_image(
                paths.resolve(&paths.api_context),
                paths.api_dockerfile.clone(),
            )
            .excluding(props.out_dir.clone()),
        }
    }

    fn function_stack(&self) -> StackResult<FunctionStack> {
        let function_name = format!("{}-api", format_identifier(&self.props.project_id));
        let mut props =
            FunctionProps::new(function_name, self.image.clone(), self.props.network.clone());
        props.timeout_seconds = API_TIMEOUT_SECONDS;
        props.memory_size_mb = API_MEMORY_SIZE_MB;

        FunctionStack::new(self.props.identity(API_FUNCTION_UNIT)?, &props)
    }

    fn gateway_stack(&self, function: &FunctionStack) -> StackResult<GatewayStack> {
        let account = self.props.deployment.require_account()?;
        let props = GatewayProps {
            function: function.function().clone(),
            subdomain: API_SUBDOMAIN.to_string(),
            zone: HostedZone::lookup(API_DOMAIN),
            certificate_arn: format!(
                "arn:aws:acm:us-east-1:{}:certificate/{}",
                account, API_CERTIFICATE_ID
            ),
        };

        GatewayStack::new(self.props.identity(API_GATEWAY_UNIT)?, &props)
    }
}

impl StackBuildPart for ProductionBackend {
    fn name(&self) -> &str {
        "production-backend"
    }

    fn build(&self) -> StackResult<Vec<DeployableUnit>> {
        let function = self.function_stack()?;
        let gateway = self.gateway_stack(&function)?;
        debug!(
            function = %function.id(),
            gateway = %gateway.id(),
            "Backend stacks defined"
        );

        Ok(vec![function.into_unit(), gateway.into_unit()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeploymentEnvironment;
    use crate::domain::CidrBlock;
    use crate::errors::StackError;
    use crate::stacks::VpcReference;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn props(root: PathBuf) -> StackBuildProps {
        StackBuildProps {
            environment: AppEnvironment::Development,
            deployment: DeploymentEnvironment {
                account: Some("123456789012".to_string()),
                region: Some("eu-west-1".to_string()),
            },
            org_prefix: "M47".to_string(),
            project_id: "cdk-intro-workshop".to_string(),
            github_owner: "m47ai".to_string(),
            branch: "main".to_string(),
            network: VpcReference::lookup(
                "vpc-ee04cd97",
                CidrBlock::legacy(),
                &["subnet-a".to_string()],
                &[],
            ),
            subdomain: "cdk-intro-workshop-api".to_string(),
            out_dir: root.join("cdk.out"),
            source_root: root,
        }
    }

    fn workshop_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let api = dir.path().join("workshop/src/apps/Minimal.Api");
        fs::create_dir_all(&api).unwrap();
        fs::write(api.join("Dockerfile"), "FROM mcr.microsoft.com/dotnet/aspnet:9.0\n").unwrap();
        dir
    }

    #[test]
    fn test_builds_function_then_gateway() {
        let dir = workshop_tree();
        let paths = ModulePaths::workshop(dir.path());
        let part = ProductionBackend::new(&props(dir.path().to_path_buf()), &paths);

        let units = part.build().unwrap();
        let ids: Vec<String> = units.iter().map(DeployableUnit::id).collect();
        assert_eq!(
            ids,
            vec![
                "m47-cdk-intro-workshop-apilambda-production-stack",
                "m47-cdk-intro-workshop-apigateway-production-stack",
            ]
        );

        let function = units[0].resource("Function").unwrap();
        assert_eq!(
            function.property("FunctionName"),
            Some(&json!("cdk-intro-workshop-api-production"))
        );
        assert_eq!(function.property("Timeout"), Some(&json!(29)));
        assert_eq!(function.property("MemorySize"), Some(&json!(1024)));

        assert_eq!(
            units[1].dependencies().collect::<Vec<_>>(),
            vec!["m47-cdk-intro-workshop-apilambda-production-stack"]
        );
    }

    #[test]
    fn test_missing_dockerfile_is_recoverable() {
        let dir = TempDir::new().unwrap();
        let paths = ModulePaths::workshop(dir.path());
        let part = ProductionBackend::new(&props(dir.path().to_path_buf()), &paths);

        let err = part.build().unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_gateway_needs_account() {
        let dir = workshop_tree();
        let paths = ModulePaths::workshop(dir.path());
        let mut props = props(dir.path().to_path_buf());
        props.deployment.account = None;

        let err = ProductionBackend::new(&props, &paths).build().unwrap_err();
        assert!(matches!(err, StackError::Configuration(_)));
    }
}
