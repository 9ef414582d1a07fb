// Copyright (c) 2025 - Cowboy AI, Inc.
//! Route 53 alias records

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::construct::Resource;
use crate::domain::ResourceType;

/// CloudFront's fixed hosted zone id, shared by every distribution and edge API
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// Hosted zone a record is written into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostedZone {
    /// Resolved by the provider from the domain name
    Lookup { domain: String },
    /// Known zone id
    Attributes { domain: String, zone_id: String },
}

impl HostedZone {
    pub fn lookup(domain: impl Into<String>) -> Self {
        Self::Lookup {
            domain: domain.into(),
        }
    }

    pub fn domain(&self) -> &str {
        match self {
            Self::Lookup { domain } | Self::Attributes { domain, .. } => domain,
        }
    }

    /// `{subdomain}.{domain}`, lowercase
    pub fn record_name(&self, subdomain: &str) -> String {
        format!("{}.{}", subdomain, self.domain()).to_lowercase()
    }

    fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        match self {
            Self::Lookup { domain } => {
                fields.insert(
                    "HostedZoneName".to_string(),
                    json!(format!("{}.", domain.trim_end_matches('.'))),
                );
            }
            Self::Attributes { zone_id, .. } => {
                fields.insert("HostedZoneId".to_string(), json!(zone_id));
            }
        }
        fields
    }
}

/// A record aliasing `record_name` to a load balancer, distribution or API
pub fn alias_record(
    logical_id: &str,
    zone: &HostedZone,
    record_name: &str,
    dns_name: Value,
    target_zone_id: Value,
) -> Resource {
    let mut properties = zone.fields();
    properties.insert("Name".to_string(), json!(record_name));
    properties.insert("Type".to_string(), json!("A"));
    properties.insert(
        "AliasTarget".to_string(),
        json!({ "DNSName": dns_name, "HostedZoneId": target_zone_id }),
    );
    Resource::new(logical_id, ResourceType::RecordSet).with_properties(Value::Object(properties))
}
