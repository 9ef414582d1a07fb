// Copyright (c) 2025 - Cowboy AI, Inc.
//! VPC stack and network references
//!
//! Public subnets route to an internet gateway. Private subnets with egress
//! route through NAT gateways placed in the public subnets, spread across
//! zones round robin.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

use super::ResourceStack;
use crate::construct::{fn_import_value, logical_id, DeployableUnit, Resource, REF};
use crate::domain::{CidrBlock, ResourceType, StackIdentity, Tag, Taggable, DEFAULT_TAG_PRIORITY};
use crate::errors::{StackError, StackResult};

/// Export holding the id of the provisioned VPC
pub const VPC_ID_EXPORT: &str = "VpcStack:vpcId";

const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// Kind of subnet in the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubnetType {
    Public,
    PrivateWithEgress,
    PrivateIsolated,
}

/// One subnet group, repeated in every availability zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetConfiguration {
    pub name: String,
    pub subnet_type: SubnetType,
    pub cidr_mask: u8,
}

/// VPC settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcProps {
    pub vpc_name: String,
    pub cidr_block: CidrBlock,
    #[serde(default = "default_max_azs")]
    pub max_azs: u8,
    /// NAT gateways for private subnets with egress, at most one per zone
    #[serde(default = "default_nat_gateways")]
    pub nat_gateways: u8,
    #[serde(default = "default_true")]
    pub enable_dns_hostnames: bool,
    #[serde(default = "default_true")]
    pub enable_dns_support: bool,
    pub subnets: Vec<SubnetConfiguration>,
}

fn default_max_azs() -> u8 {
    2
}

fn default_nat_gateways() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

impl VpcProps {
    /// One public and one private /24 per zone
    pub fn standard(vpc_name: impl Into<String>, cidr_block: CidrBlock) -> Self {
        Self {
            vpc_name: vpc_name.into(),
            cidr_block,
            max_azs: default_max_azs(),
            nat_gateways: default_nat_gateways(),
            enable_dns_hostnames: true,
            enable_dns_support: true,
            subnets: vec![
                SubnetConfiguration {
                    name: "Public".to_string(),
                    subnet_type: SubnetType::Public,
                    cidr_mask: 24,
                },
                SubnetConfiguration {
                    name: "Private".to_string(),
                    subnet_type: SubnetType::PrivateWithEgress,
                    cidr_mask: 24,
                },
            ],
        }
    }
}

/// Read-only view of a network other stacks deploy into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcReference {
    pub vpc_id: Value,
    pub cidr_block: CidrBlock,
    pub private_subnets: Vec<Value>,
    pub public_subnets: Vec<Value>,
    /// Route tables of the public subnets, empty when unknown
    #[serde(default)]
    pub public_route_tables: Vec<Value>,
    /// Route tables of the private subnets, empty when unknown
    #[serde(default)]
    pub private_route_tables: Vec<Value>,
    /// Owning unit when the network is provisioned in this run
    pub stack_id: Option<String>,
}

impl VpcReference {
    /// Existing network, referenced by identifier only
    pub fn lookup(
        vpc_id: &str,
        cidr_block: CidrBlock,
        private_subnet_ids: &[String],
        public_subnet_ids: &[String],
    ) -> Self {
        Self {
            vpc_id: json!(vpc_id),
            cidr_block,
            private_subnets: private_subnet_ids.iter().map(|id| json!(id)).collect(),
            public_subnets: public_subnet_ids.iter().map(|id| json!(id)).collect(),
            public_route_tables: Vec::new(),
            private_route_tables: Vec::new(),
            stack_id: None,
        }
    }

    /// Attach known route table ids to a looked up network
    pub fn with_route_tables(mut self, public: &[String], private: &[String]) -> Self {
        self.public_route_tables = public.iter().map(|id| json!(id)).collect();
        self.private_route_tables = private.iter().map(|id| json!(id)).collect();
        self
    }

    /// Every route table, public first
    pub fn route_tables(&self) -> impl Iterator<Item = &Value> {
        self.public_route_tables
            .iter()
            .chain(self.private_route_tables.iter())
    }

    /// Record that `unit` consumes this network
    pub fn bind(&self, unit: &mut DeployableUnit) {
        if let Some(stack_id) = &self.stack_id {
            unit.add_dependency(stack_id.clone());
        }
    }

    pub fn vpc_cidr(&self) -> String {
        self.cidr_block.to_string()
    }
}

/// Provisioned VPC with its subnet layout
pub struct NetworkStack {
    unit: DeployableUnit,
    reference: VpcReference,
}

impl NetworkStack {
    pub fn new(identity: StackIdentity, props: &VpcProps) -> StackResult<Self> {
        let mut unit = DeployableUnit::new(identity).with_description("Shared VPC");
        let environment = unit.identity().environment();

        let mut vpc_resource = Resource::new("Vpc", ResourceType::Vpc)
            .with_property("CidrBlock", props.cidr_block.to_string())
            .with_property("EnableDnsHostnames", props.enable_dns_hostnames)
            .with_property("EnableDnsSupport", props.enable_dns_support);
        vpc_resource.tags_mut().apply(Tag::new(
            "Name",
            format!("{}-{}", props.vpc_name, environment),
            DEFAULT_TAG_PRIORITY,
        ));
        let vpc = unit.add(vpc_resource)?;
        let vpc_token = unit.reference(&vpc, REF)?;
        unit.output(
            "VpcId",
            vpc_token.clone(),
            Some("Created VPC ID"),
            Some(VPC_ID_EXPORT.to_string()),
        );

        let blocks = allocate_subnets(&props.cidr_block, props)?;
        let has_public = blocks
            .iter()
            .any(|(_, config, _)| config.subnet_type == SubnetType::Public);
        let needs_egress = blocks
            .iter()
            .any(|(_, config, _)| config.subnet_type == SubnetType::PrivateWithEgress);
        if needs_egress && (props.nat_gateways == 0 || !has_public) {
            return Err(StackError::configuration(format!(
                "VPC '{}' has private subnets with egress but no NAT gateway in a public subnet",
                props.vpc_name
            )));
        }

        let gateway = if has_public {
            let gateway = unit.add(Resource::new("InternetGateway", ResourceType::InternetGateway))?;
            let gateway_id = unit.reference(&gateway, REF)?;
            unit.add(
                Resource::new("VpcGatewayAttachment", ResourceType::VpcGatewayAttachment)
                    .with_property("VpcId", vpc_token.clone())
                    .with_property("InternetGatewayId", gateway_id.clone()),
            )?;
            Some(gateway_id)
        } else {
            None
        };

        let mut subnets = Vec::with_capacity(blocks.len());
        for (zone, config, block) in blocks {
            let id = logical_id(&[&config.name, "Subnet", &(zone + 1).to_string()]);
            let mut subnet = unit.add(
                Resource::new(id.clone(), ResourceType::Subnet).with_properties(json!({
                    "VpcId": vpc_token,
                    "CidrBlock": block.to_string(),
                    "AvailabilityZone": { "Fn::Select": [zone, { "Fn::GetAZs": "" }] },
                    "MapPublicIpOnLaunch": config.subnet_type == SubnetType::Public
                })),
            )?;
            let subnet_id = unit.reference(&subnet, REF)?;
            let subnet_export = unit.export(&mut subnet, REF, &format!("{}Id", id))?;

            let mut route_table = unit.add(
                Resource::new(logical_id(&[&id, "RouteTable"]), ResourceType::RouteTable)
                    .with_property("VpcId", vpc_token.clone()),
            )?;
            let route_table_id = unit.reference(&route_table, REF)?;
            unit.add(
                Resource::new(
                    logical_id(&[&id, "RouteTableAssociation"]),
                    ResourceType::SubnetRouteTableAssociation,
                )
                .with_property("RouteTableId", route_table_id.clone())
                .with_property("SubnetId", subnet_id.clone()),
            )?;
            let route_table_export =
                unit.export(&mut route_table, REF, &format!("{}RouteTableId", id))?;

            subnets.push(PlacedSubnet {
                id,
                zone,
                subnet_type: config.subnet_type,
                subnet_id,
                route_table_id,
                subnet_export,
                route_table_export,
            });
        }

        if let Some(gateway_id) = &gateway {
            for subnet in subnets.iter().filter(|s| s.subnet_type == SubnetType::Public) {
                unit.add(
                    Resource::new(logical_id(&[&subnet.id, "DefaultRoute"]), ResourceType::Route)
                        .with_properties(json!({
                            "RouteTableId": subnet.route_table_id,
                            "DestinationCidrBlock": DEFAULT_ROUTE,
                            "GatewayId": gateway_id
                        }))
                        .with_depends_on("VpcGatewayAttachment"),
                )?;
            }
        }

        let nat_gateways = add_nat_gateways(&mut unit, &subnets, props.nat_gateways)?;
        if !nat_gateways.is_empty() {
            for subnet in subnets
                .iter()
                .filter(|s| s.subnet_type == SubnetType::PrivateWithEgress)
            {
                let nat = &nat_gateways[subnet.zone % nat_gateways.len()];
                unit.add(
                    Resource::new(logical_id(&[&subnet.id, "DefaultRoute"]), ResourceType::Route)
                        .with_properties(json!({
                            "RouteTableId": subnet.route_table_id,
                            "DestinationCidrBlock": DEFAULT_ROUTE,
                            "NatGatewayId": nat
                        })),
                )?;
            }
        }

        let mut reference = VpcReference {
            vpc_id: fn_import_value(VPC_ID_EXPORT),
            cidr_block: props.cidr_block.clone(),
            private_subnets: Vec::new(),
            public_subnets: Vec::new(),
            public_route_tables: Vec::new(),
            private_route_tables: Vec::new(),
            stack_id: Some(unit.id()),
        };
        for subnet in &subnets {
            let subnet_id = fn_import_value(&subnet.subnet_export);
            let route_table_id = fn_import_value(&subnet.route_table_export);
            if subnet.subnet_type == SubnetType::Public {
                reference.public_subnets.push(subnet_id);
                reference.public_route_tables.push(route_table_id);
            } else {
                reference.private_subnets.push(subnet_id);
                reference.private_route_tables.push(route_table_id);
            }
        }

        debug!(
            stack_id = %unit.id(),
            subnets = subnets.len(),
            nat_gateways = nat_gateways.len(),
            "VPC defined"
        );

        Ok(Self { unit, reference })
    }

    pub fn reference(&self) -> &VpcReference {
        &self.reference
    }
}

/// A subnet declared in the unit, with its route table
struct PlacedSubnet {
    id: String,
    zone: usize,
    subnet_type: SubnetType,
    subnet_id: Value,
    route_table_id: Value,
    subnet_export: String,
    route_table_export: String,
}

/// One NAT gateway with its address in each of the first `count` public subnets
///
/// Only the first public subnet group of every zone hosts a gateway.
fn add_nat_gateways(
    unit: &mut DeployableUnit,
    subnets: &[PlacedSubnet],
    count: u8,
) -> StackResult<Vec<Value>> {
    let mut hosts: Vec<&PlacedSubnet> = Vec::new();
    for subnet in subnets.iter().filter(|s| s.subnet_type == SubnetType::Public) {
        if !hosts.iter().any(|host| host.zone == subnet.zone) {
            hosts.push(subnet);
        }
    }

    let mut gateways = Vec::new();
    for host in hosts.into_iter().take(usize::from(count)) {
        let address = unit.add(
            Resource::new(logical_id(&[&host.id, "Eip"]), ResourceType::ElasticIp)
                .with_property("Domain", "vpc")
                .with_depends_on("VpcGatewayAttachment"),
        )?;
        let allocation_id = unit.reference(&address, "AllocationId")?;
        let nat = unit.add(
            Resource::new(logical_id(&[&host.id, "NatGateway"]), ResourceType::NatGateway)
                .with_property("SubnetId", host.subnet_id.clone())
                .with_property("AllocationId", allocation_id),
        )?;
        gateways.push(unit.reference(&nat, REF)?);
    }
    Ok(gateways)
}

impl ResourceStack for NetworkStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}

/// Carve consecutive blocks for every (zone, subnet group) out of `vpc`
fn allocate_subnets<'a>(
    vpc: &CidrBlock,
    props: &'a VpcProps,
) -> StackResult<Vec<(usize, &'a SubnetConfiguration, CidrBlock)>> {
    let base = match vpc.address() {
        IpAddr::V4(address) => u64::from(u32::from(address)),
        IpAddr::V6(_) => {
            return Err(StackError::configuration("VPC CIDR block must be IPv4"))
        }
    };
    let end = base + (1u64 << (32 - u32::from(vpc.prefix_length())));

    let mut next = base;
    let mut blocks = Vec::new();
    for zone in 0..usize::from(props.max_azs) {
        for config in &props.subnets {
            if config.cidr_mask < vpc.prefix_length() || config.cidr_mask > 28 {
                return Err(StackError::configuration(format!(
                    "Subnet '{}' mask /{} does not fit in {}",
                    config.name, config.cidr_mask, vpc
                )));
            }
            let size = 1u64 << (32 - u32::from(config.cidr_mask));
            let start = next.div_ceil(size) * size;
            if start + size > end {
                return Err(StackError::configuration(format!(
                    "Subnet layout exceeds VPC block {}",
                    vpc
                )));
            }

            let address = Ipv4Addr::from(start as u32);
            blocks.push((
                zone,
                config,
                CidrBlock::new(format!("{}/{}", address, config.cidr_mask))?,
            ));
            next = start + size;
        }
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AppEnvironment;

    fn identity() -> StackIdentity {
        StackIdentity::new("M47", "demo", "Vpc", AppEnvironment::Production).unwrap()
    }

    #[test]
    fn test_subnets_allocated_per_zone() {
        let props = VpcProps::standard("main", CidrBlock::new("10.20.0.0/16").unwrap());
        let stack = NetworkStack::new(identity(), &props).unwrap();

        let unit = stack.unit();
        assert_eq!(
            unit.resource("PublicSubnet1").unwrap().property("CidrBlock"),
            Some(&json!("10.20.0.0/24"))
        );
        assert_eq!(
            unit.resource("PrivateSubnet1").unwrap().property("CidrBlock"),
            Some(&json!("10.20.1.0/24"))
        );
        assert_eq!(
            unit.resource("PrivateSubnet2").unwrap().property("CidrBlock"),
            Some(&json!("10.20.3.0/24"))
        );

        let reference = stack.reference();
        assert_eq!(reference.private_subnets.len(), 2);
        assert_eq!(reference.public_subnets.len(), 2);
        assert_eq!(reference.private_route_tables.len(), 2);
        assert_eq!(reference.vpc_id, fn_import_value(VPC_ID_EXPORT));

        let output = unit.outputs().iter().find(|o| o.logical_id == "VpcId").unwrap();
        assert_eq!(output.export_name.as_deref(), Some("VpcStack:vpcId"));
        assert_eq!(output.value, json!({ "Ref": "Vpc" }));
    }

    #[test]
    fn test_subnets_stay_inside_vpc_block() {
        let vpc = CidrBlock::new("10.20.0.0/16").unwrap();
        let mut props = VpcProps::standard("main", vpc.clone());
        props.max_azs = 3;
        let stack = NetworkStack::new(identity(), &props).unwrap();

        let subnets: Vec<CidrBlock> = stack
            .unit()
            .resources()
            .iter()
            .filter(|r| r.resource_type() == ResourceType::Subnet)
            .map(|r| CidrBlock::new(r.property("CidrBlock").unwrap().as_str().unwrap()).unwrap())
            .collect();
        assert_eq!(subnets.len(), 6);
        assert!(subnets.iter().all(|subnet| vpc.contains(subnet)));
    }

    #[test]
    fn test_host_bits_in_vpc_block_rejected() {
        let err = CidrBlock::new("10.20.255.1/16").unwrap_err();
        assert!(err.to_string().contains("10.20.0.0/16"));
        assert!(serde_json::from_value::<VpcProps>(json!({
            "vpc_name": "main",
            "cidr_block": "10.20.255.1/16",
            "subnets": []
        }))
        .is_err());
    }

    #[test]
    fn test_public_subnets_route_to_internet_gateway() {
        let props = VpcProps::standard("main", CidrBlock::new("10.20.0.0/16").unwrap());
        let stack = NetworkStack::new(identity(), &props).unwrap();
        let template = stack.unit().template();
        let resources = &template["Resources"];

        assert_eq!(resources["InternetGateway"]["Type"], "AWS::EC2::InternetGateway");
        assert_eq!(
            resources["VpcGatewayAttachment"]["Properties"]["InternetGatewayId"],
            json!({ "Ref": "InternetGateway" })
        );
        for zone in ["1", "2"] {
            let route = &resources[format!("PublicSubnet{}DefaultRoute", zone)];
            assert_eq!(route["Type"], "AWS::EC2::Route");
            assert_eq!(route["Properties"]["DestinationCidrBlock"], "0.0.0.0/0");
            assert_eq!(route["Properties"]["GatewayId"], json!({ "Ref": "InternetGateway" }));
            assert_eq!(route["DependsOn"], json!(["VpcGatewayAttachment"]));

            let association = &resources[format!("PublicSubnet{}RouteTableAssociation", zone)];
            assert_eq!(
                association["Properties"]["SubnetId"],
                json!({ "Ref": format!("PublicSubnet{}", zone) })
            );
        }
    }

    #[test]
    fn test_private_subnets_share_single_nat_gateway() {
        let props = VpcProps::standard("main", CidrBlock::new("10.20.0.0/16").unwrap());
        let stack = NetworkStack::new(identity(), &props).unwrap();
        let unit = stack.unit();

        let nats: Vec<&str> = unit
            .resources()
            .iter()
            .filter(|r| r.resource_type() == ResourceType::NatGateway)
            .map(|r| r.logical_id())
            .collect();
        assert_eq!(nats, vec!["PublicSubnet1NatGateway"]);
        assert_eq!(
            unit.resource("PublicSubnet1NatGateway").unwrap().property("AllocationId"),
            Some(&json!({ "Fn::GetAtt": ["PublicSubnet1Eip", "AllocationId"] }))
        );
        for zone in ["1", "2"] {
            let route = unit
                .resource(&format!("PrivateSubnet{}DefaultRoute", zone))
                .unwrap();
            assert_eq!(
                route.property("NatGatewayId"),
                Some(&json!({ "Ref": "PublicSubnet1NatGateway" }))
            );
        }
    }

    #[test]
    fn test_nat_gateway_per_zone() {
        let mut props = VpcProps::standard("main", CidrBlock::new("10.20.0.0/16").unwrap());
        props.nat_gateways = 5;
        let stack = NetworkStack::new(identity(), &props).unwrap();
        let unit = stack.unit();

        let count = unit
            .resources()
            .iter()
            .filter(|r| r.resource_type() == ResourceType::NatGateway)
            .count();
        assert_eq!(count, 2);
        assert_eq!(
            unit.resource("PrivateSubnet2DefaultRoute").unwrap().property("NatGatewayId"),
            Some(&json!({ "Ref": "PublicSubnet2NatGateway" }))
        );
    }

    #[test]
    fn test_egress_without_nat_rejected() {
        let mut props = VpcProps::standard("main", CidrBlock::new("10.20.0.0/16").unwrap());
        props.nat_gateways = 0;
        assert!(NetworkStack::new(identity(), &props).is_err());

        props.subnets[1].subnet_type = SubnetType::PrivateIsolated;
        let stack = NetworkStack::new(identity(), &props).unwrap();
        assert!(stack.unit().resource("PrivateSubnet1DefaultRoute").is_none());
        assert!(stack.unit().resource("PrivateSubnet1RouteTable").is_some());
    }

    #[test]
    fn test_layout_overflow_rejected() {
        let mut props = VpcProps::standard("tiny", CidrBlock::new("10.0.0.0/24").unwrap());
        props.max_azs = 3;
        assert!(NetworkStack::new(identity(), &props).is_err());
    }

    #[test]
    fn test_bind_records_dependency_only_for_provisioned_network() {
        let mut consumer = DeployableUnit::new(identity().for_unit("Api").unwrap());
        let lookup = VpcReference::lookup("vpc-1", CidrBlock::legacy(), &[], &[]);
        lookup.bind(&mut consumer);
        assert_eq!(consumer.dependencies().count(), 0);

        let provisioned = NetworkStack::new(
            identity(),
            &VpcProps::standard("main", CidrBlock::legacy()),
        )
        .unwrap();
        provisioned.reference().bind(&mut consumer);
        assert_eq!(
            consumer.dependencies().collect::<Vec<_>>(),
            vec!["m47-demo-vpc-production-stack"]
        );
    }
}
