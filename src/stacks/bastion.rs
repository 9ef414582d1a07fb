// Copyright (c) 2025 - Cowboy AI, Inc.
//! Windows bastion host
//!
//! One instance in the first public subnet, reachable over RDP with a key
//! pair generated by the provider. Instance metadata requires session tokens.

use serde_json::json;

use super::network::VpcReference;
use super::security::{RoleSpec, SecurityGroupSpec};
use super::ResourceStack;
use crate::construct::{DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::{require_non_empty, require_non_empty_list};
use crate::domain::{Peer, PortRange, ResourceType, StackIdentity, Tag, Taggable, DEFAULT_TAG_PRIORITY};
use crate::errors::StackResult;

pub const DEFAULT_INSTANCE_TYPE: &str = "t3.micro";

const RDP_PORT: u16 = 3389;

/// Latest Windows Server 2022 base image, resolved at deploy time
const WINDOWS_IMAGE: &str =
    "{{resolve:ssm:/aws/service/ami-windows-latest/Windows_Server-2022-English-Full-Base}}";

#[derive(Debug, Clone, PartialEq)]
pub struct BastionProps {
    pub vpc: VpcReference,
    pub instance_type: String,
}

impl BastionProps {
    pub fn new(vpc: VpcReference) -> Self {
        Self {
            vpc,
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
        }
    }

    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("instance_type", &self.instance_type)?;
        require_non_empty_list("vpc.public_subnets", &self.vpc.public_subnets)?;
        Ok(())
    }
}

pub struct BastionStack {
    unit: DeployableUnit,
    instance: ResourceHandle,
}

impl BastionStack {
    pub fn new(identity: StackIdentity, props: &BastionProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity).with_description("Windows bastion");
        props.vpc.bind(&mut unit);
        let host_name = format!(
            "{}-{}",
            unit.identity().project_id(),
            unit.identity().environment()
        )
        .to_lowercase();

        let role = RoleSpec::assumed_by("ec2.amazonaws.com").add_to(&mut unit, "BastionRole")?;
        let role_name = unit.reference(&role, REF)?;
        let profile = unit.add(
            Resource::new("BastionInstanceProfile", ResourceType::InstanceProfile)
                .with_property("Roles", json!([role_name])),
        )?;
        let profile_name = unit.reference(&profile, REF)?;

        let security_group = SecurityGroupSpec::new(
            format!("bastion-sg-{}", unit.id()),
            "Allow RDP",
            props.vpc.vpc_id.clone(),
        )
        .allow_all_outbound(true)
        .ingress(Peer::any_ipv4(), PortRange::tcp(RDP_PORT)?, "open RDP port")
        .add_to(&mut unit, "BastionSecurityGroup")?;
        let group_id = unit.reference(&security_group, "GroupId")?;

        let key_pair = unit.add(
            Resource::new("BastionKeyPair", ResourceType::KeyPair).with_properties(json!({
                "KeyName": format!("keyname-{}", host_name),
                "KeyType": "rsa",
                "KeyFormat": "pem"
            })),
        )?;
        let key_name = unit.reference(&key_pair, REF)?;

        let mut instance = Resource::new("BastionInstance", ResourceType::Instance)
            .with_properties(json!({
                "ImageId": WINDOWS_IMAGE,
                "InstanceType": props.instance_type,
                "KeyName": key_name,
                "IamInstanceProfile": profile_name,
                "SubnetId": props.vpc.public_subnets[0],
                "SecurityGroupIds": [group_id],
                "MetadataOptions": { "HttpTokens": "required" }
            }));
        instance
            .tags_mut()
            .apply(Tag::new("Name", host_name, DEFAULT_TAG_PRIORITY));
        let mut instance = unit.add(instance)?;

        unit.export(&mut instance, REF, "InstanceId")?;
        Ok(Self { unit, instance })
    }

    /// Instance handle with `Ref` exported
    pub fn instance(&self) -> &ResourceHandle {
        &self.instance
    }
}

impl ResourceStack for BastionStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}
