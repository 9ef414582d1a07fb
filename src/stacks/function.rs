// Copyright (c) 2025 - Cowboy AI, Inc.
//! Container-image function stack

use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

use super::network::VpcReference;
use super::security::{PolicyDocument, PolicyStatement, RoleSpec, SecurityGroupSpec};
use super::ResourceStack;
use crate::asset::AssetSource;
use crate::construct::{fn_get_att, DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::{
    require_non_empty, require_positive, validate_function_timeout, validate_memory_size,
};
use crate::domain::{CidrBlock, Peer, PortRange, ResourceType, StackIdentity};
use crate::errors::StackResult;

/// Messages handed to the function per invocation when triggered by a queue
pub const QUEUE_TRIGGER_BATCH_SIZE: u32 = 10;

const API_ACTIONS: &[&str] = &[
    "dynamodb:PutItem",
    "dynamodb:UpdateItem",
    "dynamodb:DeleteItem",
    "dynamodb:GetItem",
    "dynamodb:BatchGetItem",
    "dynamodb:BatchWriteItem",
    "dynamodb:Query",
    "dynamodb:Scan",
    "lambda:InvokeFunction",
    "lambda:InvokeAsync",
    "rds-data:*",
    "ec2:CreateNetworkInterface",
    "ec2:DescribeNetworkInterfaces",
    "ec2:DeleteNetworkInterface",
    "logs:CreateLogGroup",
    "logs:DescribeLogGroups",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
    "ds:CreateComputer",
    "ds:DescribeDirectories",
    "ssm:GetParameter",
    "ssm:GetParameters",
    "ssm:GetParameterHistory",
    "ssm:GetParametersByPath",
    "sqs:ReceiveMessage",
    "sqs:DeleteMessage",
    "sqs:SendMessage",
    "sqs:GetQueueAttributes",
    "sqs:GetQueueUrl",
    "sqs:ListQueues",
    "sns:Publish",
    "cloudformation:DescribeStacks",
    "cloudformation:ListStackResources",
    "cloudwatch:ListMetrics",
    "cloudwatch:GetMetricData",
    "ec2:DescribeSecurityGroups",
    "ec2:DescribeSubnets",
    "ec2:DescribeVpcs",
    "kms:ListAliases",
    "iam:GetPolicy",
    "iam:GetPolicyVersion",
    "iam:GetRole",
    "iam:GetRolePolicy",
    "iam:ListAttachedRolePolicies",
    "iam:ListRolePolicies",
    "iam:ListRoles",
    "lambda:*",
    "states:DescribeStateMachine",
    "states:ListStateMachines",
    "tag:GetResources",
    "xray:GetTraceSummaries",
    "xray:BatchGetTraces",
];

/// Permissions granted to API functions
pub fn api_function_policy() -> PolicyDocument {
    PolicyDocument::new(vec![
        PolicyStatement::allow(API_ACTIONS, vec![json!("*")]),
        PolicyStatement::allow(&["iam:PassRole"], vec![json!("*")]).with_condition(json!({
            "StringEquals": { "iam:PassedToService": "lambda.amazonaws.com" }
        })),
        PolicyStatement::allow(
            &[
                "logs:DescribeLogStreams",
                "logs:GetLogEvents",
                "logs:FilterLogEvents",
            ],
            vec![json!("arn:aws:logs:*:*:log-group:/aws/lambda/*")],
        ),
        PolicyStatement::allow(
            &[
                "secretsmanager:GetSecretValue",
                "secretsmanager:DescribeSecret",
                "secretsmanager:TagResource",
            ],
            vec![json!("arn:aws:secretsmanager:*:*:secret:rds-db-credentials/*")],
        ),
        PolicyStatement::allow(&["s3:*", "s3-object-lambda:*"], vec![json!("*")]),
    ])
}

/// Function settings
#[derive(Debug, Clone)]
pub struct FunctionProps {
    pub function_name: String,
    pub timeout_seconds: u32,
    pub memory_size_mb: u32,
    pub image: AssetSource,
    pub vpc: VpcReference,
    /// ARN of a queue whose messages invoke the function
    pub queue_trigger_arn: Option<Value>,
    pub reserved_concurrent_executions: Option<u32>,
    pub environment_variables: BTreeMap<String, String>,
}

impl FunctionProps {
    pub fn new(
        function_name: impl Into<String>,
        image: AssetSource,
        vpc: VpcReference,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            timeout_seconds: 30,
            memory_size_mb: 512,
            image,
            vpc,
            queue_trigger_arn: None,
            reserved_concurrent_executions: None,
            environment_variables: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("function_name", &self.function_name)?;
        validate_function_timeout(self.timeout_seconds)?;
        validate_memory_size(self.memory_size_mb)?;
        if let Some(reserved) = self.reserved_concurrent_executions {
            require_positive("reserved_concurrent_executions", i64::from(reserved))?;
        }
        Ok(())
    }
}

/// Docker image function in private subnets
pub struct FunctionStack {
    unit: DeployableUnit,
    function: ResourceHandle,
}

impl FunctionStack {
    pub fn new(identity: StackIdentity, props: &FunctionProps) -> StackResult<Self> {
        props.validate()?;
        let image = props.image.resolve()?;

        let mut unit = DeployableUnit::new(identity);
        props.vpc.bind(&mut unit);
        let environment = unit.identity().environment();
        let stack_id = unit.id();

        let role = RoleSpec::assumed_by("lambda.amazonaws.com")
            .named(format!("Role{}{}", props.function_name, environment))
            .managed_policy(
                "arn:aws:iam::aws:policy/service-role/AWSLambdaVPCAccessExecutionRole",
            )
            .inline_policy("ApiFunctionPolicy", api_function_policy())
            .add_to(&mut unit, "LambdaRole")?;

        let security_group = function_security_group(&stack_id, &props.vpc)
            .add_to(&mut unit, "FunctionSecurityGroup")?;

        let mut variables = serde_json::Map::new();
        variables.insert("ASPNETCORE_ENVIRONMENT".to_string(), json!(environment.as_str()));
        for (key, value) in &props.environment_variables {
            variables.insert(key.clone(), json!(value));
        }

        let security_group_id = unit.reference(&security_group, "GroupId")?;
        let mut function = Resource::new("Function", ResourceType::LambdaFunction)
            .with_properties(json!({
                "FunctionName": format!("{}-{}", props.function_name, environment).to_lowercase(),
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
            .with_depends_on(role.logical_id());
        if let Some(reserved) = props.reserved_concurrent_executions {
            function = function.with_property("ReservedConcurrentExecutions", reserved);
        }
        let mut function = unit.add(function)?;

        if let Some(queue_arn) = &props.queue_trigger_arn {
            let function_name = unit.reference(&function, REF)?;
            unit.add(
                Resource::new("QueueEventSource", ResourceType::EventSourceMapping)
                    .with_properties(json!({
                        "EventSourceArn": queue_arn,
                        "FunctionName": function_name,
                        "BatchSize": QUEUE_TRIGGER_BATCH_SIZE
                    })),
            )?;
        }

        unit.export(&mut function, "Arn", "FunctionArn")?;
        unit.export(&mut function, REF, "FunctionName")?;

        debug!(stack_id = %stack_id, image = %image.fingerprint(), "Function stack defined");
        Ok(Self { unit, function })
    }

    /// Function handle with `Arn` and `Ref` exported
    pub fn function(&self) -> &ResourceHandle {
        &self.function
    }
}

impl ResourceStack for FunctionStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}

/// HTTPS and HTTP out anywhere, PostgreSQL out to the VPC and the legacy network
pub fn function_security_group(stack_id: &str, vpc: &VpcReference) -> SecurityGroupSpec {
    let name = format!("{}-SecurityGroup", stack_id);
    let postgres = PortRange::postgres();
    SecurityGroupSpec::new(name.clone(), name, vpc.vpc_id.clone())
        .allow_all_outbound(false)
        .egress(Peer::any_ipv4(), PortRange::https(), "Allow HTTPS outbound")
        .egress(Peer::any_ipv4(), PortRange::http(), "Allow HTTP outbound")
        .egress(
            Peer::Ipv4(vpc.cidr_block.clone()),
            postgres,
            "Allow PostgreSQL outbound to VPC",
        )
        .egress(
            Peer::Ipv4(CidrBlock::legacy()),
            postgres,
            "Allow PostgreSQL outbound to legacy VPC",
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AppEnvironment;
    use crate::errors::StackError;
    use std::fs;
    use tempfile::TempDir;

    fn image_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM public.ecr.aws/lambda/provided\n").unwrap();
        dir
    }

    fn props(dir: &TempDir) -> FunctionProps {
        let mut props = FunctionProps::new(
            "demo-api",
            AssetSource::docker_image(dir.path(), "Dockerfile"),
            VpcReference::lookup(
                "vpc-1",
                CidrBlock::new("172.31.0.0/16").unwrap(),
                &["subnet-a".to_string()],
                &[],
            ),
        );
        props.timeout_seconds = 29;
        props.memory_size_mb = 1024;
        props
    }

    fn identity() -> StackIdentity {
        StackIdentity::new("M47", "demo", "ApiLambda", AppEnvironment::Production).unwrap()
    }

    #[test]
    fn test_function_resources() {
        let dir = image_dir();
        let stack = FunctionStack::new(identity(), &props(&dir)).unwrap();
        let function = stack.unit().resource("Function").unwrap();

        assert_eq!(function.property("FunctionName"), Some(&json!("demo-api-production")));
        assert_eq!(function.property("Timeout"), Some(&json!(29)));
        assert_eq!(
            function.property("Environment").unwrap()["Variables"]["ASPNETCORE_ENVIRONMENT"],
            "production"
        );
        assert_eq!(
            stack.function().export_name("Arn"),
            Some("m47-demo-apilambda-production-stack-FunctionArn")
        );
        assert!(stack.unit().resource("QueueEventSource").is_none());
    }

    #[test]
    fn test_queue_trigger_batch_size() {
        let dir = image_dir();
        let mut props = props(&dir);
        props.queue_trigger_arn = Some(json!("arn:aws:sqs:eu-west-1:1:jobs"));
        let stack = FunctionStack::new(identity(), &props).unwrap();
        let mapping = stack.unit().resource("QueueEventSource").unwrap();
        assert_eq!(mapping.property("BatchSize"), Some(&json!(10)));
    }

    #[test]
    fn test_missing_image_is_recoverable() {
        let dir = TempDir::new().unwrap();
        let err = FunctionStack::new(identity(), &props(&dir)).err().unwrap();
        assert!(matches!(err, StackError::MissingAsset { .. }));
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let dir = image_dir();
        let mut props = props(&dir);
        props.timeout_seconds = 0;
        let err = FunctionStack::new(identity(), &props).err().unwrap();
        assert!(matches!(err, StackError::Validation(_)));
    }

    #[test]
    fn test_security_group_egress() {
        let spec = function_security_group(
            "stack",
            &VpcReference::lookup("vpc-1", CidrBlock::new("172.31.0.0/16").unwrap(), &[], &[]),
        );
        let mut unit = DeployableUnit::new(identity());
        spec.add_to(&mut unit, "Sg").unwrap();
        let egress = unit.resource("Sg").unwrap().property("SecurityGroupEgress").unwrap();
        assert_eq!(egress.as_array().unwrap().len(), 4);
        assert_eq!(egress[2]["CidrIp"], "172.31.0.0/16");
        assert_eq!(egress[3]["CidrIp"], "10.0.0.0/16");
    }
}
