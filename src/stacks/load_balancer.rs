// Copyright (c) 2025 - Cowboy AI, Inc.
//! Internet-facing network load balancer stack

use serde_json::json;

use super::dns::{alias_record, HostedZone};
use super::network::VpcReference;
use super::security::SecurityGroupSpec;
use super::ResourceStack;
use crate::construct::{DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::{require_non_empty, require_non_empty_list};
use crate::domain::{Peer, PortRange, ResourceType, StackIdentity};
use crate::errors::StackResult;

/// Load balancer settings
#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancerProps {
    pub vpc: VpcReference,
    pub zone: HostedZone,
    pub subdomain: String,
}

impl LoadBalancerProps {
    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("domain", self.zone.domain())?;
        require_non_empty("subdomain", &self.subdomain)?;
        require_non_empty_list("vpc.public_subnets", &self.vpc.public_subnets)?;
        Ok(())
    }

    pub fn record_name(&self) -> String {
        self.zone.record_name(&self.subdomain)
    }
}

pub struct LoadBalancerStack {
    unit: DeployableUnit,
    load_balancer: ResourceHandle,
}

impl LoadBalancerStack {
    pub fn new(identity: StackIdentity, props: &LoadBalancerProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity);
        props.vpc.bind(&mut unit);
        let stack_id = unit.id();

        let security_group = SecurityGroupSpec::new(
            format!("nlb-sg-{}", stack_id),
            "Security group for NLB to allow traffic on port 80",
            props.vpc.vpc_id.clone(),
        )
        .ingress(
            Peer::any_ipv4(),
            PortRange::all_traffic(),
            "Allow all traffic from anywhere",
        )
        .add_to(&mut unit, "NlbSecurityGroup")?;
        let group_id = unit.reference(&security_group, "GroupId")?;

        let mut load_balancer = unit.add(
            Resource::new("NetworkLoadBalancer", ResourceType::NetworkLoadBalancer)
                .with_properties(json!({
                    "Name": format!("{}-nlb", props.subdomain),
                    "Type": "network",
                    "Scheme": "internet-facing",
                    "Subnets": props.vpc.public_subnets,
                    "SecurityGroups": [group_id]
                })),
        )?;

        let dns_name = unit.reference(&load_balancer, "DNSName")?;
        let zone_id = unit.reference(&load_balancer, "CanonicalHostedZoneID")?;
        unit.add(alias_record(
            "AliasRecord",
            &props.zone,
            &props.record_name(),
            dns_name,
            zone_id,
        ))?;

        unit.export(&mut load_balancer, REF, "LoadBalancerArn")?;
        unit.export(&mut load_balancer, "DNSName", "LoadBalancerDnsName")?;

        Ok(Self {
            unit,
            load_balancer,
        })
    }

    /// Load balancer handle with `Ref` (ARN) exported
    pub fn load_balancer(&self) -> &ResourceHandle {
        &self.load_balancer
    }
}

impl ResourceStack for LoadBalancerStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}
