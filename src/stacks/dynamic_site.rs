// Copyright (c) 2025 - Cowboy AI, Inc.
//! Server-rendered website behind a proxy API

use serde_json::json;
use std::collections::BTreeMap;

use super::dns::HostedZone;
use super::gateway::{add_proxy_api, ProxyApiSpec, ProxyTarget};
use super::network::VpcReference;
use super::security::{PolicyDocument, PolicyStatement, RoleSpec, SecurityGroupSpec};
use super::ResourceStack;
use crate::asset::AssetSource;
use crate::construct::{fn_get_att, DeployableUnit, Resource, ResourceHandle};
use crate::domain::invariants::{
    require_non_empty, require_non_empty_list, validate_function_timeout, validate_memory_size,
};
use crate::domain::{AppEnvironment, Peer, PortRange, ResourceType, StackIdentity};
use crate::errors::StackResult;

/// Headers allowed on cross-origin requests to the site
const SITE_ALLOW_HEADERS: &[&str] = &[
    "Cache-Control",
    "Content-Language",
    "Content-Type",
    "Expires",
    "Last-Modified",
    "Pragma",
    "Authorization",
    "X-Amz-Date",
    "X-Api-Key",
    "X-Forwarded-For",
];

#[derive(Debug, Clone)]
pub struct DynamicSiteProps {
    pub vpc: VpcReference,
    pub subdomain: String,
    pub domain_name: String,
    pub hosted_zone_id: String,
    pub certificate_arn: String,
    pub image: AssetSource,
    pub memory_size_mb: u32,
    pub timeout_seconds: u32,
    pub environment_variables: BTreeMap<String, String>,
}

impl DynamicSiteProps {
    pub fn new(
        vpc: VpcReference,
        subdomain: impl Into<String>,
        domain_name: impl Into<String>,
        hosted_zone_id: impl Into<String>,
        certificate_arn: impl Into<String>,
        image: AssetSource,
    ) -> Self {
        Self {
            vpc,
            subdomain: subdomain.into(),
            domain_name: domain_name.into(),
            hosted_zone_id: hosted_zone_id.into(),
            certificate_arn: certificate_arn.into(),
            image,
            memory_size_mb: 1024,
            timeout_seconds: 30,
            environment_variables: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("subdomain", &self.subdomain)?;
        require_non_empty("domain_name", &self.domain_name)?;
        require_non_empty("hosted_zone_id", &self.hosted_zone_id)?;
        require_non_empty("certificate_arn", &self.certificate_arn)?;
        require_non_empty_list("vpc.private_subnets", &self.vpc.private_subnets)?;
        validate_memory_size(self.memory_size_mb)?;
        validate_function_timeout(self.timeout_seconds)?;
        Ok(())
    }

    fn zone(&self) -> HostedZone {
        HostedZone::Attributes {
            domain: self.domain_name.clone(),
            zone_id: self.hosted_zone_id.clone(),
        }
    }
}

pub struct DynamicSiteStack {
    unit: DeployableUnit,
    function: ResourceHandle,
    rest_api: ResourceHandle,
}

impl DynamicSiteStack {
    pub fn new(identity: StackIdentity, props: &DynamicSiteProps) -> StackResult<Self> {
        props.validate()?;
        let image = props.image.resolve()?;

        let mut unit = DeployableUnit::new(identity).with_description("Server-side rendered website");
        props.vpc.bind(&mut unit);
        let environment = unit.identity().environment();
        let stack_id = unit.id();

        let group_name = format!("{}-SecurityGroup", stack_id);
        let security_group =
            SecurityGroupSpec::new(group_name.clone(), group_name, props.vpc.vpc_id.clone())
                .allow_all_outbound(false)
                .egress(Peer::any_ipv4(), PortRange::https(), "Allow HTTPS outbound")
                .egress(Peer::any_ipv4(), PortRange::http(), "Allow HTTP outbound")
                .add_to(&mut unit, "SsrSecurityGroup")?;
        let security_group_id = unit.reference(&security_group, "GroupId")?;

        let role = RoleSpec::assumed_by("lambda.amazonaws.com")
            .inline_policy(
                "SsrFunctionPolicy",
                PolicyDocument::new(vec![
                    PolicyStatement::allow(
                        &["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
                        vec![json!("arn:aws:logs:*:*:*")],
                    ),
                    PolicyStatement::allow(
                        &[
                            "ec2:CreateNetworkInterface",
                            "ec2:DescribeNetworkInterfaces",
                            "ec2:DeleteNetworkInterface",
                        ],
                        vec![json!("*")],
                    ),
                ]),
            )
            .add_to(&mut unit, "LambdaRole")?;

        let mut variables = serde_json::Map::new();
        variables.insert("NODE_ENV".to_string(), json!(node_env(environment)));
        for (key, value) in &props.environment_variables {
            variables.insert(key.clone(), json!(value));
        }

        let function = unit.add(
            Resource::new("SsrLambdaFunction", ResourceType::LambdaFunction)
                .with_properties(json!({
                    "FunctionName": format!("{}-ssr-{}", props.subdomain, environment).to_lowercase(),
                    "PackageType": "Image",
                    "Code": { "ImageUri": image.image_uri() },
                    "MemorySize": props.memory_size_mb,
                    "Timeout": props.timeout_seconds,
                    "Role": fn_get_att(role.logical_id(), "Arn"),
                    "Environment": { "Variables": variables },
                    "VpcConfig": {
                        "SecurityGroupIds": [security_group_id],
                        "SubnetIds": props.vpc.private_subnets
                    }
                }))
                .with_depends_on(role.logical_id()),
        )?;
        let function_arn = unit.reference(&function, "Arn")?;

        let zone = props.zone();
        let api = add_proxy_api(
            &mut unit,
            ProxyApiSpec {
                name: format!("SsrRestApi-{}", stack_id),
                description: None,
                target: ProxyTarget::Function { arn: function_arn },
                binary_media_types: &["*/*"],
                allow_headers: SITE_ALLOW_HEADERS,
                zone: &zone,
                record_name: zone.record_name(&props.subdomain),
                certificate_arn: &props.certificate_arn,
            },
        )?;

        Ok(Self {
            unit,
            function,
            rest_api: api.rest_api,
        })
    }

    pub fn function(&self) -> &ResourceHandle {
        &self.function
    }

    pub fn rest_api(&self) -> &ResourceHandle {
        &self.rest_api
    }
}

impl ResourceStack for DynamicSiteStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}

fn node_env(environment: AppEnvironment) -> &'static str {
    if environment.is_production() {
        "production"
    } else {
        "development"
    }
}
