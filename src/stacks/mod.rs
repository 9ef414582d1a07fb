// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Stack Definitions
//!
//! One definition per infrastructure concern. Each takes a
//! [`StackIdentity`](crate::domain::StackIdentity) plus typed props, validates
//! them, and declares its resources into a fresh
//! [`DeployableUnit`]. Every resource is tagged through the identity on the
//! way in. Definitions never catch their own errors; triage happens in the
//! stack builder.

pub mod bastion;
pub mod container_service;
pub mod coverage_site;
pub mod database;
pub mod dns;
pub mod dynamic_site;
pub mod ecr;
pub mod function;
pub mod gateway;
pub mod gateway_ecs;
pub mod load_balancer;
pub mod network;
pub mod notification;
pub mod pipeline;
pub mod queue;
pub mod security;
pub mod static_site;
pub mod step_functions;
pub mod storage;
pub mod vpc_peering;

use crate::construct::DeployableUnit;

pub use bastion::{BastionProps, BastionStack};
pub use container_service::{ContainerServiceProps, ContainerServiceStack, LoadBalancerAttachment};
pub use coverage_site::{CoverageSiteProps, CoverageSiteStack};
pub use database::{ConnectionString, DatabaseProps, DatabaseStack, PasswordPolicy};
pub use dns::{alias_record, HostedZone};
pub use dynamic_site::{DynamicSiteProps, DynamicSiteStack};
pub use ecr::{repository_uri, EcrProps, EcrStack, RepositorySource};
pub use function::{api_function_policy, FunctionProps, FunctionStack};
pub use gateway::{GatewayProps, GatewayStack, CORS_ALLOW_HEADERS};
pub use gateway_ecs::{GatewayEcsProps, GatewayEcsStack};
pub use load_balancer::{LoadBalancerProps, LoadBalancerStack};
pub use network::{NetworkStack, SubnetConfiguration, SubnetType, VpcProps, VpcReference};
pub use notification::{ChatbotLogging, NotificationProps, NotificationStack, SlackChannel};
pub use pipeline::{pipeline_policy, repository_url, PipelineProps, PipelineStack};
pub use queue::{QueueProps, QueueStack};
pub use security::{PolicyDocument, PolicyStatement, RoleSpec, SecurityGroupSpec, SecurityRule};
pub use static_site::{
    rewrite_uri, url_rewrite_function_code, StaticSiteProps, StaticSiteStack, STATIC_FILE_EXTENSIONS,
};
pub use step_functions::{StepFunctionsProps, StepFunctionsStack};
pub use storage::{StorageProps, StorageStack};
pub use vpc_peering::{VpcPeeringProps, VpcPeeringStack};

/// A constructed stack definition
pub trait ResourceStack {
    /// The unit holding every declared resource
    fn unit(&self) -> &DeployableUnit;

    /// Give up the typed wrapper, keeping the unit
    fn into_unit(self) -> DeployableUnit;

    /// Canonical stack id
    fn id(&self) -> String {
        self.unit().id()
    }
}
