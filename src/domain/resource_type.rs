// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provider Resource Type Taxonomy
//!
//! The complete set of provider-managed resource types the stack definitions
//! emit. Each type maps to its CloudFormation type name and a category.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider resource type taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    // Network
    Vpc,
    Subnet,
    InternetGateway,
    VpcGatewayAttachment,
    RouteTable,
    Route,
    SubnetRouteTableAssociation,
    NatGateway,
    ElasticIp,
    VpcPeeringConnection,
    SecurityGroup,
    SecurityGroupIngress,
    NetworkLoadBalancer,
    TargetGroup,
    Listener,
    RecordSet,

    // Compute
    EcsCluster,
    TaskDefinition,
    FargateService,
    LambdaFunction,
    EventSourceMapping,
    LambdaPermission,
    ScalableTarget,
    ScalingPolicy,
    Instance,
    KeyPair,
    ContainerRepository,
    StateMachine,

    // Database
    DbInstance,
    DbSubnetGroup,
    DbParameterGroup,

    // Storage
    Bucket,
    BucketPolicy,
    BucketDeployment,

    // Messaging
    Queue,
    QueuePolicy,
    Topic,
    SlackChannelConfiguration,
    NotificationRule,
    EventRule,

    // Security
    Role,
    InstanceProfile,
    Secret,
    KmsKey,
    OriginAccessIdentity,

    // Website / Edge
    Distribution,
    CloudFrontFunction,
    RestApi,
    ApiDeployment,
    ApiStage,
    ApiDomainName,
    ApiBasePathMapping,
    ApiVpcLink,

    // Monitoring
    LogGroup,
    Alarm,

    // Configuration
    SsmParameter,

    // Developer tools
    Pipeline,
    CodeBuildProject,
    PipelineWebhook,
}

impl ResourceType {
    /// CloudFormation type name
    pub fn cfn_type(&self) -> &'static str {
        match self {
            Self::Vpc => "AWS::EC2::VPC",
            Self::Subnet => "AWS::EC2::Subnet",
            Self::InternetGateway => "AWS::EC2::InternetGateway",
            Self::VpcGatewayAttachment => "AWS::EC2::VPCGatewayAttachment",
            Self::RouteTable => "AWS::EC2::RouteTable",
            Self::Route => "AWS::EC2::Route",
            Self::SubnetRouteTableAssociation => "AWS::EC2::SubnetRouteTableAssociation",
            Self::NatGateway => "AWS::EC2::NatGateway",
            Self::ElasticIp => "AWS::EC2::EIP",
            Self::VpcPeeringConnection => "AWS::EC2::VPCPeeringConnection",
            Self::SecurityGroup => "AWS::EC2::SecurityGroup",
            Self::SecurityGroupIngress => "AWS::EC2::SecurityGroupIngress",
            Self::NetworkLoadBalancer => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            Self::TargetGroup => "AWS::ElasticLoadBalancingV2::TargetGroup",
            Self::Listener => "AWS::ElasticLoadBalancingV2::Listener",
            Self::RecordSet => "AWS::Route53::RecordSet",
            Self::EcsCluster => "AWS::ECS::Cluster",
            Self::TaskDefinition => "AWS::ECS::TaskDefinition",
            Self::FargateService => "AWS::ECS::Service",
            Self::LambdaFunction => "AWS::Lambda::Function",
            Self::EventSourceMapping => "AWS::Lambda::EventSourceMapping",
            Self::LambdaPermission => "AWS::Lambda::Permission",
            Self::ScalableTarget => "AWS::ApplicationAutoScaling::ScalableTarget",
            Self::ScalingPolicy => "AWS::ApplicationAutoScaling::ScalingPolicy",
            Self::Instance => "AWS::EC2::Instance",
            Self::KeyPair => "AWS::EC2::KeyPair",
            Self::ContainerRepository => "AWS::ECR::Repository",
            Self::StateMachine => "AWS::StepFunctions::StateMachine",
            Self::DbInstance => "AWS::RDS::DBInstance",
            Self::DbSubnetGroup => "AWS::RDS::DBSubnetGroup",
            Self::DbParameterGroup => "AWS::RDS::DBParameterGroup",
            Self::Bucket => "AWS::S3::Bucket",
            Self::BucketPolicy => "AWS::S3::BucketPolicy",
            Self::BucketDeployment => "Custom::CDKBucketDeployment",
            Self::Queue => "AWS::SQS::Queue",
            Self::QueuePolicy => "AWS::SQS::QueuePolicy",
            Self::Topic => "AWS::SNS::Topic",
            Self::SlackChannelConfiguration => "AWS::Chatbot::SlackChannelConfiguration",
            Self::NotificationRule => "AWS::CodeStarNotifications::NotificationRule",
            Self::EventRule => "AWS::Events::Rule",
            Self::Role => "AWS::IAM::Role",
            Self::InstanceProfile => "AWS::IAM::InstanceProfile",
            Self::Secret => "AWS::SecretsManager::Secret",
            Self::KmsKey => "AWS::KMS::Key",
            Self::OriginAccessIdentity => "AWS::CloudFront::CloudFrontOriginAccessIdentity",
            Self::Distribution => "AWS::CloudFront::Distribution",
            Self::CloudFrontFunction => "AWS::CloudFront::Function",
            Self::RestApi => "AWS::ApiGateway::RestApi",
            Self::ApiDeployment => "AWS::ApiGateway::Deployment",
            Self::ApiStage => "AWS::ApiGateway::Stage",
            Self::ApiDomainName => "AWS::ApiGateway::DomainName",
            Self::ApiBasePathMapping => "AWS::ApiGateway::BasePathMapping",
            Self::ApiVpcLink => "AWS::ApiGateway::VpcLink",
            Self::LogGroup => "AWS::Logs::LogGroup",
            Self::Alarm => "AWS::CloudWatch::Alarm",
            Self::SsmParameter => "AWS::SSM::Parameter",
            Self::Pipeline => "AWS::CodePipeline::Pipeline",
            Self::CodeBuildProject => "AWS::CodeBuild::Project",
            Self::PipelineWebhook => "AWS::CodePipeline::Webhook",
        }
    }

    /// Primary category for this resource type
    pub fn category(&self) -> ResourceCategory {
        match self {
            Self::Vpc
            | Self::Subnet
            | Self::InternetGateway
            | Self::VpcGatewayAttachment
            | Self::RouteTable
            | Self::Route
            | Self::SubnetRouteTableAssociation
            | Self::NatGateway
            | Self::ElasticIp
            | Self::VpcPeeringConnection
            | Self::SecurityGroup
            | Self::SecurityGroupIngress
            | Self::NetworkLoadBalancer
            | Self::TargetGroup
            | Self::Listener
            | Self::RecordSet => ResourceCategory::Network,

            Self::EcsCluster
            | Self::TaskDefinition
            | Self::FargateService
            | Self::LambdaFunction
            | Self::EventSourceMapping
            | Self::LambdaPermission
            | Self::ScalableTarget
            | Self::ScalingPolicy
            | Self::Instance
            | Self::KeyPair
            | Self::ContainerRepository
            | Self::StateMachine => ResourceCategory::Compute,

            Self::DbInstance | Self::DbSubnetGroup | Self::DbParameterGroup => {
                ResourceCategory::Database
            }

            Self::Bucket | Self::BucketPolicy | Self::BucketDeployment => ResourceCategory::Storage,

            Self::Queue
            | Self::QueuePolicy
            | Self::Topic
            | Self::SlackChannelConfiguration
            | Self::NotificationRule
            | Self::EventRule => ResourceCategory::Messaging,

            Self::Role
            | Self::InstanceProfile
            | Self::Secret
            | Self::KmsKey
            | Self::OriginAccessIdentity => ResourceCategory::Security,

            Self::Distribution
            | Self::CloudFrontFunction
            | Self::RestApi
            | Self::ApiDeployment
            | Self::ApiStage
            | Self::ApiDomainName
            | Self::ApiBasePathMapping
            | Self::ApiVpcLink => ResourceCategory::Edge,

            Self::LogGroup | Self::Alarm => ResourceCategory::Monitoring,

            Self::SsmParameter => ResourceCategory::Configuration,

            Self::Pipeline | Self::CodeBuildProject | Self::PipelineWebhook => {
                ResourceCategory::DeveloperTools
            }
        }
    }

    /// Whether the provider accepts a `Tags` property on this type
    pub fn supports_tags(&self) -> bool {
        !matches!(
            self,
            Self::SecurityGroupIngress
                | Self::VpcGatewayAttachment
                | Self::Route
                | Self::SubnetRouteTableAssociation
                | Self::EventRule
                | Self::InstanceProfile
                | Self::Listener
                | Self::RecordSet
                | Self::EventSourceMapping
                | Self::LambdaPermission
                | Self::ScalableTarget
                | Self::ScalingPolicy
                | Self::BucketPolicy
                | Self::BucketDeployment
                | Self::QueuePolicy
                | Self::OriginAccessIdentity
                | Self::CloudFrontFunction
                | Self::Alarm
                | Self::SsmParameter
                | Self::NotificationRule
                | Self::ApiDeployment
                | Self::ApiBasePathMapping
                | Self::PipelineWebhook
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cfn_type())
    }
}

/// Resource category (high-level grouping)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceCategory {
    Network,
    Compute,
    Database,
    Storage,
    Messaging,
    Security,
    Edge,
    Monitoring,
    Configuration,
    DeveloperTools,
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "Network"),
            Self::Compute => write!(f, "Compute"),
            Self::Database => write!(f, "Database"),
            Self::Storage => write!(f, "Storage"),
            Self::Messaging => write!(f, "Messaging"),
            Self::Security => write!(f, "Security"),
            Self::Edge => write!(f, "Edge/Website"),
            Self::Monitoring => write!(f, "Monitoring"),
            Self::Configuration => write!(f, "Configuration"),
            Self::DeveloperTools => write!(f, "Developer Tools"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cfn_types() {
        assert_eq!(ResourceType::Vpc.cfn_type(), "AWS::EC2::VPC");
        assert_eq!(ResourceType::DbInstance.cfn_type(), "AWS::RDS::DBInstance");
        assert_eq!(ResourceType::SsmParameter.to_string(), "AWS::SSM::Parameter");
    }

    #[test]
    fn test_categories() {
        assert_eq!(ResourceType::Queue.category(), ResourceCategory::Messaging);
        assert_eq!(ResourceType::FargateService.category(), ResourceCategory::Compute);
        assert_eq!(ResourceType::Distribution.category(), ResourceCategory::Edge);
        assert_eq!(ResourceType::Role.category(), ResourceCategory::Security);
    }

    #[test]
    fn test_tag_support() {
        assert!(ResourceType::LambdaFunction.supports_tags());
        assert!(ResourceType::DbInstance.supports_tags());
        assert!(!ResourceType::RecordSet.supports_tags());
        assert!(!ResourceType::SsmParameter.supports_tags());
        assert!(ResourceType::NatGateway.supports_tags());
        assert!(!ResourceType::Route.supports_tags());
        assert!(!ResourceType::InstanceProfile.supports_tags());
    }
}
