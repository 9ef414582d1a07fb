// Copyright (c) 2025 - Cowboy AI, Inc.
//! Fargate container service stack
//!
//! One task definition built from a local Docker image, run on spot capacity
//! in private subnets. Optional extras: a telemetry sidecar, queue-depth
//! autoscaling and attachment to an existing network load balancer.

use serde_json::{json, Map, Value};
use tracing::debug;

use super::network::VpcReference;
use super::security::{PolicyDocument, PolicyStatement, RoleSpec, SecurityGroupSpec};
use super::ResourceStack;
use crate::asset::AssetSource;
use crate::construct::{aws_region, fn_join, DeletionPolicy, DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::{require_companion, require_non_empty, validate_fargate_size};
use crate::domain::{Peer, PortRange, ResourceType, StackIdentity};
use crate::errors::StackResult;
use crate::scaling::queue_depth_policies;

const LOG_RETENTION_DAYS: u32 = 365;
const TELEMETRY_IMAGE: &str = "amazon/aws-otel-collector";
const TELEMETRY_ENDPOINT: &str = "http://localhost:4318";

/// Existing load balancer the service registers with
#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancerAttachment {
    pub load_balancer_arn: Value,
    pub certificate_arn: String,
}

/// Container service settings
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerServiceProps {
    pub vpc: VpcReference,
    pub service_name: String,
    pub cluster_name: String,
    pub image: AssetSource,
    pub cpu: u32,
    pub memory_limit_mib: u32,
    /// Queue whose depth drives the task count
    pub scaling_queue_name: Option<Value>,
    pub max_capacity: Option<u32>,
    pub rds_security_group_id: Option<Value>,
    pub container_port: Option<u16>,
    pub load_balancer: Option<LoadBalancerAttachment>,
    /// Exposed to the container as `BUCKET_NAME`
    pub storage_bucket: Option<Value>,
    pub include_telemetry: bool,
}

impl ContainerServiceProps {
    pub fn new(
        vpc: VpcReference,
        service_name: impl Into<String>,
        cluster_name: impl Into<String>,
        image: AssetSource,
    ) -> Self {
        Self {
            vpc,
            service_name: service_name.into(),
            cluster_name: cluster_name.into(),
            image,
            cpu: 256,
            memory_limit_mib: 512,
            scaling_queue_name: None,
            max_capacity: None,
            rds_security_group_id: None,
            container_port: None,
            load_balancer: None,
            storage_bucket: None,
            include_telemetry: false,
        }
    }

    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("service_name", &self.service_name)?;
        require_non_empty("cluster_name", &self.cluster_name)?;
        validate_fargate_size(self.cpu, self.memory_limit_mib)?;
        require_companion(
            "load_balancer",
            &self.load_balancer,
            "container_port",
            &self.container_port,
        )?;
        require_companion(
            "max_capacity",
            &self.max_capacity,
            "scaling_queue_name",
            &self.scaling_queue_name,
        )?;
        Ok(())
    }
}

pub struct ContainerServiceStack {
    unit: DeployableUnit,
    cluster: ResourceHandle,
    service: ResourceHandle,
}

impl ContainerServiceStack {
    pub fn new(identity: StackIdentity, props: &ContainerServiceProps) -> StackResult<Self> {
        props.validate()?;
        let image = props.image.resolve()?;

        let mut unit = DeployableUnit::new(identity);
        props.vpc.bind(&mut unit);
        let stack_id = unit.id();
        let environment = unit.identity().environment();
        let unit_name = unit.identity().unit_name().to_string();
        let scoped = format!(
            "{}-{}-{}",
            unit.identity().project_id(),
            unit_name,
            environment
        )
        .to_lowercase();

        let role = RoleSpec::assumed_by("ecs-tasks.amazonaws.com")
            .named(format!("{}-TaskRole-{}", unit_name, environment))
            .inline_policy(
                "TaskPolicy",
                PolicyDocument::new(vec![PolicyStatement::allow(&["*"], vec![json!("*")])]),
            )
            .add_to(&mut unit, "FargateContainerRole")?;
        let role_arn = unit.reference(&role, "Arn")?;

        let log_group = unit.add(
            Resource::new("ContainerLogGroup", ResourceType::LogGroup)
                .with_property("LogGroupName", scoped.as_str())
                .with_property("RetentionInDays", LOG_RETENTION_DAYS)
                .with_deletion_policy(DeletionPolicy::Delete),
        )?;
        let log_group_name = unit.reference(&log_group, REF)?;

        let container_name = format!("{}Container", unit_name);
        let mut environment_variables = vec![
            json!({ "Name": "ASPNETCORE_ENVIRONMENT", "Value": environment.as_str() }),
        ];
        environment_variables.push(json!({
            "Name": "BUCKET_NAME",
            "Value": props.storage_bucket.clone().unwrap_or_else(|| json!(""))
        }));

        let mut container = json!({
            "Name": container_name,
            "Image": image.image_uri(),
            "Essential": true,
            "Environment": environment_variables,
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": log_group_name,
                    "awslogs-stream-prefix": format!(
                        "aws/ecs/{}/{}/{}",
                        unit.identity().project_id(),
                        environment,
                        unit_name
                    ).to_lowercase(),
                    "awslogs-region": aws_region()
                }
            }
        });
        if let Some(port) = props.container_port {
            container["PortMappings"] = json!([{ "ContainerPort": port, "Protocol": "tcp" }]);
        }

        let mut containers = vec![container];
        if props.include_telemetry {
            containers.push(json!({
                "Name": format!("{}Sidecar", unit_name),
                "Image": TELEMETRY_IMAGE,
                "Essential": true,
                "Environment": [{ "Name": "OTEL_EXPORTER_OTLP_ENDPOINT", "Value": TELEMETRY_ENDPOINT }]
            }));
        }

        let task_definition = unit.add(
            Resource::new("TaskDefinition", ResourceType::TaskDefinition).with_properties(json!({
                "Family": scoped,
                "Cpu": props.cpu.to_string(),
                "Memory": props.memory_limit_mib.to_string(),
                "NetworkMode": "awsvpc",
                "RequiresCompatibilities": ["FARGATE"],
                "ExecutionRoleArn": role_arn,
                "TaskRoleArn": role_arn,
                "ContainerDefinitions": containers
            })),
        )?;

        let mut cluster = unit.add(
            Resource::new("Cluster", ResourceType::EcsCluster).with_properties(json!({
                "ClusterName": props.cluster_name,
                "CapacityProviders": ["FARGATE", "FARGATE_SPOT"],
                "ClusterSettings": [{ "Name": "containerInsights", "Value": "enabled" }]
            })),
        )?;

        let service_group = SecurityGroupSpec::new(
            format!("{}-sg", stack_id),
            "Allow all traffic",
            props.vpc.vpc_id.clone(),
        )
        .ingress(
            Peer::Ipv4(props.vpc.cidr_block.clone()),
            PortRange::all_traffic(),
            "Allow all traffic from VPC",
        )
        .add_to(&mut unit, "ServiceSecurityGroup")?;

        let mut security_groups = vec![unit.reference(&service_group, "GroupId")?];
        if let Some(rds_group) = &props.rds_security_group_id {
            security_groups.push(rds_group.clone());
        }

        let mut service = Resource::new("Service", ResourceType::FargateService).with_properties(
            json!({
                "ServiceName": props.service_name,
                "Cluster": unit.reference(&cluster, REF)?,
                "TaskDefinition": unit.reference(&task_definition, REF)?,
                "PlatformVersion": "LATEST",
                "DeploymentConfiguration": {
                    "MinimumHealthyPercent": 100,
                    "MaximumPercent": 200
                },
                "CapacityProviderStrategy": [{ "CapacityProvider": "FARGATE_SPOT", "Weight": 1 }],
                "NetworkConfiguration": {
                    "AwsvpcConfiguration": {
                        "AssignPublicIp": "DISABLED",
                        "SecurityGroups": security_groups,
                        "Subnets": props.vpc.private_subnets
                    }
                }
            }),
        );

        if let (Some(attachment), Some(port)) = (&props.load_balancer, props.container_port) {
            let (target_group_arn, listeners) =
                attach_load_balancer(&mut unit, props, attachment, port)?;
            service = service.with_property(
                "LoadBalancers",
                json!([{
                    "ContainerName": container_name,
                    "ContainerPort": port,
                    "TargetGroupArn": target_group_arn
                }]),
            );
            for listener in listeners {
                service = service.with_depends_on(listener);
            }
        }
        let mut service = unit.add(service)?;

        if let Some(queue_name) = &props.scaling_queue_name {
            let cluster_ref = unit.reference(&cluster, REF)?;
            let service_name = unit.reference(&service, "Name")?;
            queue_depth_policies(queue_name.clone(), props.max_capacity).add_to(
                &mut unit,
                "Service",
                fn_join("/", vec![json!("service"), cluster_ref, service_name]),
            )?;
        }

        unit.export(&mut cluster, REF, "ClusterName")?;
        unit.export(&mut service, "Name", "ServiceName")?;

        debug!(
            stack_id = %stack_id,
            image = %image.fingerprint(),
            autoscaling = props.scaling_queue_name.is_some(),
            "Container service defined"
        );

        Ok(Self {
            unit,
            cluster,
            service,
        })
    }

    pub fn cluster(&self) -> &ResourceHandle {
        &self.cluster
    }

    /// Service handle with `Name` exported
    pub fn service(&self) -> &ResourceHandle {
        &self.service
    }
}

/// Target group plus TCP and TLS listeners on the attached load balancer
///
/// Returns the target group ARN and the listener logical ids, which the
/// service has to wait for.
fn attach_load_balancer(
    unit: &mut DeployableUnit,
    props: &ContainerServiceProps,
    attachment: &LoadBalancerAttachment,
    port: u16,
) -> StackResult<(Value, Vec<String>)> {
    let target_group = unit.add(
        Resource::new("TargetGroup", ResourceType::TargetGroup).with_properties(json!({
            "Protocol": "TCP",
            "Port": port,
            "TargetType": "ip",
            "VpcId": props.vpc.vpc_id
        })),
    )?;
    let target_group_arn = unit.reference(&target_group, REF)?;

    let forward = json!([{ "Type": "forward", "TargetGroupArn": &target_group_arn }]);
    let mut listeners = Vec::new();
    for (id, listener_port, protocol) in [("HttpListener", 80, "TCP"), ("HttpsListener", 443, "TLS")] {
        let mut properties = Map::new();
        properties.insert("LoadBalancerArn".to_string(), attachment.load_balancer_arn.clone());
        properties.insert("Port".to_string(), json!(listener_port));
        properties.insert("Protocol".to_string(), json!(protocol));
        properties.insert("DefaultActions".to_string(), forward.clone());
        if protocol == "TLS" {
            properties.insert(
                "Certificates".to_string(),
                json!([{ "CertificateArn": attachment.certificate_arn }]),
            );
        }
        let listener = unit.add(
            Resource::new(id, ResourceType::Listener).with_properties(Value::Object(properties)),
        )?;
        listeners.push(listener.logical_id().to_string());
    }
    Ok((target_group_arn, listeners))
}

impl ResourceStack for ContainerServiceStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AppEnvironment, CidrBlock};
    use crate::errors::StackError;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn image_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM mcr.microsoft.com/dotnet/aspnet:8.0\n")
            .unwrap();
        dir
    }

    fn props(dir: &TempDir) -> ContainerServiceProps {
        ContainerServiceProps::new(
            VpcReference::lookup(
                "vpc-1",
                CidrBlock::new("172.31.0.0/16").unwrap(),
                &["subnet-a".to_string()],
                &[],
            ),
            "worker",
            "workers",
            AssetSource::docker_image(dir.path(), "Dockerfile"),
        )
    }

    fn identity() -> StackIdentity {
        StackIdentity::new("M47", "Demo", "Worker", AppEnvironment::Staging).unwrap()
    }

    #[test]
    fn test_task_definition_and_container() {
        let dir = image_dir();
        let stack = ContainerServiceStack::new(identity(), &props(&dir)).unwrap();
        let task = stack.unit().resource("TaskDefinition").unwrap();

        assert_eq!(task.property("Family"), Some(&json!("demo-worker-staging")));
        let container = &task.property("ContainerDefinitions").unwrap()[0];
        assert_eq!(container["Name"], "WorkerContainer");
        assert_eq!(
            container["Environment"],
            json!([
                { "Name": "ASPNETCORE_ENVIRONMENT", "Value": "staging" },
                { "Name": "BUCKET_NAME", "Value": "" }
            ])
        );
        assert_eq!(
            container["LogConfiguration"]["Options"]["awslogs-stream-prefix"],
            "aws/ecs/demo/staging/worker"
        );
        assert!(container.get("PortMappings").is_none());

        let log_group = stack.unit().resource("ContainerLogGroup").unwrap();
        assert_eq!(log_group.property("RetentionInDays"), Some(&json!(365)));
    }

    #[test]
    fn test_spot_service_in_private_subnets() {
        let dir = image_dir();
        let stack = ContainerServiceStack::new(identity(), &props(&dir)).unwrap();
        let service = stack.unit().resource("Service").unwrap();

        assert_eq!(
            service.property("CapacityProviderStrategy"),
            Some(&json!([{ "CapacityProvider": "FARGATE_SPOT", "Weight": 1 }]))
        );
        assert_eq!(
            service.property("NetworkConfiguration").unwrap()["AwsvpcConfiguration"]["AssignPublicIp"],
            "DISABLED"
        );
        assert!(stack.unit().resource("ServiceScalableTarget").is_none());
    }

    #[test]
    fn test_telemetry_sidecar_and_port() {
        let dir = image_dir();
        let mut props = props(&dir);
        props.include_telemetry = true;
        props.container_port = Some(8080);
        let stack = ContainerServiceStack::new(identity(), &props).unwrap();

        let containers = stack
            .unit()
            .resource("TaskDefinition")
            .unwrap()
            .property("ContainerDefinitions")
            .unwrap();
        assert_eq!(containers[0]["PortMappings"][0]["ContainerPort"], 8080);
        assert_eq!(containers[1]["Name"], "WorkerSidecar");
        assert_eq!(containers[1]["Image"], "amazon/aws-otel-collector");
    }

    #[test]
    fn test_queue_scaling_and_rds_group() {
        let dir = image_dir();
        let mut props = props(&dir);
        props.scaling_queue_name = Some(json!("jobs"));
        props.max_capacity = Some(4);
        props.rds_security_group_id = Some(json!("sg-rds"));
        let stack = ContainerServiceStack::new(identity(), &props).unwrap();
        let unit = stack.unit();

        let target = unit.resource("ServiceScalableTarget").unwrap();
        assert_eq!(target.property("MaxCapacity"), Some(&json!(4)));
        assert!(unit.resource("ServiceScaleOutPolicy").is_some());
        assert!(unit.resource("ServiceScaleInAlarm").is_some());

        let groups = &unit.resource("Service").unwrap().property("NetworkConfiguration").unwrap()
            ["AwsvpcConfiguration"]["SecurityGroups"];
        assert_eq!(groups.as_array().unwrap().len(), 2);
        assert_eq!(groups[1], "sg-rds");
    }

    #[test]
    fn test_load_balancer_attachment() {
        let dir = image_dir();
        let mut props = props(&dir);
        props.container_port = Some(8080);
        props.load_balancer = Some(LoadBalancerAttachment {
            load_balancer_arn: json!("arn:aws:elasticloadbalancing:nlb"),
            certificate_arn: "arn:aws:acm:cert".to_string(),
        });
        let stack = ContainerServiceStack::new(identity(), &props).unwrap();
        let unit = stack.unit();

        assert_eq!(
            unit.resource("HttpsListener").unwrap().property("Protocol"),
            Some(&json!("TLS"))
        );
        let service = unit.resource("Service").unwrap();
        assert_eq!(
            service.depends_on().collect::<Vec<_>>(),
            vec!["HttpListener", "HttpsListener"]
        );
    }

    #[test]
    fn test_load_balancer_requires_port() {
        let dir = image_dir();
        let mut props = props(&dir);
        props.load_balancer = Some(LoadBalancerAttachment {
            load_balancer_arn: json!("arn"),
            certificate_arn: "cert".to_string(),
        });
        let err = ContainerServiceStack::new(identity(), &props).err().unwrap();
        assert!(matches!(err, StackError::Validation(_)));
    }

    #[test]
    fn test_missing_dockerfile() {
        let dir = TempDir::new().unwrap();
        let err = ContainerServiceStack::new(identity(), &props(&dir)).err().unwrap();
        assert!(err.is_recoverable());
    }
}
