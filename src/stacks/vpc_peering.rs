// Copyright (c) 2025 - Cowboy AI, Inc.
//! Peering between two networks
//!
//! Every route table on each side gets a route to the other side's block
//! through the peering connection.

use serde_json::{json, Value};

use super::network::VpcReference;
use super::ResourceStack;
use crate::construct::{aws_region, DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::require_non_empty_list;
use crate::domain::{ResourceType, StackIdentity, ValidationError};
use crate::errors::StackResult;

/// Peering settings
#[derive(Debug, Clone, PartialEq)]
pub struct VpcPeeringProps {
    /// Requester side
    pub source: VpcReference,
    /// Accepter side
    pub destination: VpcReference,
    /// Region of the accepter, current region when absent
    pub peer_region: Option<String>,
}

impl VpcPeeringProps {
    pub fn validate(&self) -> StackResult<()> {
        if self.source.vpc_id == self.destination.vpc_id {
            return Err(ValidationError::BusinessRule(format!(
                "Cannot peer VPC {} with itself",
                self.source.vpc_id
            ))
            .into());
        }
        if self.source.cidr_block.contains(&self.destination.cidr_block)
            || self.destination.cidr_block.contains(&self.source.cidr_block)
        {
            return Err(ValidationError::BusinessRule(format!(
                "Peered blocks {} and {} overlap",
                self.source.cidr_block, self.destination.cidr_block
            ))
            .into());
        }
        let source_tables: Vec<_> = self.source.route_tables().collect();
        let destination_tables: Vec<_> = self.destination.route_tables().collect();
        require_non_empty_list("source.route_tables", &source_tables)?;
        require_non_empty_list("destination.route_tables", &destination_tables)?;
        Ok(())
    }
}

pub struct VpcPeeringStack {
    unit: DeployableUnit,
    connection: ResourceHandle,
}

impl VpcPeeringStack {
    pub fn new(identity: StackIdentity, props: &VpcPeeringProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity).with_description("VPC peering");
        props.source.bind(&mut unit);
        props.destination.bind(&mut unit);

        let peer_region = props
            .peer_region
            .as_ref()
            .map_or_else(aws_region, |region| json!(region));
        let mut connection = unit.add(
            Resource::new("VpcPeeringConnection", ResourceType::VpcPeeringConnection)
                .with_properties(json!({
                    "VpcId": props.source.vpc_id,
                    "PeerVpcId": props.destination.vpc_id,
                    "PeerRegion": peer_region
                })),
        )?;
        let connection_id = unit.reference(&connection, REF)?;

        let directions = [
            ("SourceToDestination", &props.source, &props.destination),
            ("DestinationToSource", &props.destination, &props.source),
        ];
        for (direction, from, to) in directions {
            let destination_cidr = to.vpc_cidr();
            for (kind, tables) in [
                ("Public", &from.public_route_tables),
                ("Private", &from.private_route_tables),
            ] {
                add_routes(
                    &mut unit,
                    &format!("{}Route{}", direction, kind),
                    tables,
                    &destination_cidr,
                    &connection_id,
                )?;
            }
        }

        unit.export(&mut connection, REF, "VpcPeeringConnectionId")?;
        Ok(Self { unit, connection })
    }

    /// Connection handle with `Ref` exported
    pub fn connection(&self) -> &ResourceHandle {
        &self.connection
    }
}

fn add_routes(
    unit: &mut DeployableUnit,
    prefix: &str,
    route_tables: &[Value],
    destination_cidr: &str,
    connection_id: &Value,
) -> StackResult<()> {
    for (index, route_table) in route_tables.iter().enumerate() {
        unit.add(
            Resource::new(format!("{}{}", prefix, index), ResourceType::Route).with_properties(
                json!({
                    "RouteTableId": route_table,
                    "DestinationCidrBlock": destination_cidr,
                    "VpcPeeringConnectionId": connection_id
                }),
            ),
        )?;
    }
    Ok(())
}

impl ResourceStack for VpcPeeringStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}
