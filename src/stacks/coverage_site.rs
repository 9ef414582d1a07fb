// Copyright (c) 2025 - Cowboy AI, Inc.
//! Coverage report website
//!
//! A private bucket the pipeline uploads reports into, served through
//! CloudFront. Unknown paths fall back to `index.html`.

use serde_json::json;

use super::dns::{alias_record, HostedZone, CLOUDFRONT_HOSTED_ZONE_ID};
use super::static_site::add_private_origin;
use super::ResourceStack;
use crate::construct::{DeployableUnit, Resource, ResourceHandle};
use crate::domain::invariants::require_non_empty;
use crate::domain::{ResourceType, StackIdentity};
use crate::errors::StackResult;

const ERROR_CACHING_MIN_TTL: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageSiteProps {
    pub bucket_name: String,
    pub subdomain: String,
    pub domain_name: String,
    pub hosted_zone_id: String,
    pub certificate_arn: String,
}

impl CoverageSiteProps {
    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("bucket_name", &self.bucket_name)?;
        require_non_empty("subdomain", &self.subdomain)?;
        require_non_empty("domain_name", &self.domain_name)?;
        require_non_empty("hosted_zone_id", &self.hosted_zone_id)?;
        require_non_empty("certificate_arn", &self.certificate_arn)?;
        Ok(())
    }

    fn zone(&self) -> HostedZone {
        HostedZone::Attributes {
            domain: self.domain_name.clone(),
            zone_id: self.hosted_zone_id.clone(),
        }
    }
}

pub struct CoverageSiteStack {
    unit: DeployableUnit,
    bucket: ResourceHandle,
}

impl CoverageSiteStack {
    pub fn new(identity: StackIdentity, props: &CoverageSiteProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity).with_description("Coverage report website");
        let zone = props.zone();
        let full_domain = zone.record_name(&props.subdomain);

        let origin = add_private_origin(&mut unit, "CoverageReport", &props.bucket_name)?;

        let error_responses: Vec<_> = [403, 404]
            .iter()
            .map(|status| {
                json!({
                    "ErrorCode": status,
                    "ResponseCode": 200,
                    "ResponsePagePath": "/index.html",
                    "ErrorCachingMinTTL": ERROR_CACHING_MIN_TTL
                })
            })
            .collect();

        let distribution = unit.add(
            Resource::new("CoverageReportDistribution", ResourceType::Distribution).with_property(
                "DistributionConfig",
                json!({
                    "Enabled": true,
                    "Aliases": [full_domain],
                    "DefaultRootObject": "index.html",
                    "Origins": [{
                        "Id": "CoverageReportOrigin",
                        "DomainName": origin.regional_domain,
                        "S3OriginConfig": { "OriginAccessIdentity": origin.access_identity_path }
                    }],
                    "DefaultCacheBehavior": {
                        "TargetOriginId": "CoverageReportOrigin",
                        "ViewerProtocolPolicy": "redirect-to-https",
                        "CachePolicyId": "658327ea-f89d-4fab-a63d-7e88639e58f6",
                        "Compress": true
                    },
                    "CustomErrorResponses": error_responses,
                    "ViewerCertificate": {
                        "AcmCertificateArn": props.certificate_arn,
                        "SslSupportMethod": "sni-only",
                        "MinimumProtocolVersion": "TLSv1.2_2021"
                    },
                    "HttpVersion": "http2"
                }),
            ),
        )?;
        let distribution_domain = unit.reference(&distribution, "DomainName")?;

        unit.add(alias_record(
            "CoverageReportRecord",
            &zone,
            &full_domain,
            distribution_domain.clone(),
            json!(CLOUDFRONT_HOSTED_ZONE_ID),
        ))?;

        // Exports use the project name without dashes
        let project = unit.identity().cloud_formation_project().replace('-', "");
        unit.output(
            "CoverageReportCdn",
            distribution_domain,
            Some("Coverage report distribution domain"),
            Some(format!("{}CoverageReportCdn", project)),
        );
        unit.output(
            "CoverageReportDns",
            json!(full_domain),
            Some("Coverage report DNS record"),
            Some(format!("{}CoverageReportDns", project)),
        );

        Ok(Self {
            unit,
            bucket: origin.bucket,
        })
    }

    pub fn bucket(&self) -> &ResourceHandle {
        &self.bucket
    }
}

impl ResourceStack for CoverageSiteStack {
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
    use crate::construct::DeletionPolicy;
    use crate::domain::AppEnvironment;
    use pretty_assertions::assert_eq;

    fn props() -> CoverageSiteProps {
        CoverageSiteProps {
            bucket_name: "m47-coverage-report".to_string(),
            subdomain: "Coverage".to_string(),
            domain_name: "m47.io".to_string(),
            hosted_zone_id: "Z123".to_string(),
            certificate_arn: "arn:aws:acm:us-east-1:1:certificate/abc".to_string(),
        }
    }

    fn stack() -> CoverageSiteStack {
        let identity = StackIdentity::new(
            "M47",
            "cdk-intro-workshop",
            "Coverage",
            AppEnvironment::Production,
        )
        .unwrap();
        CoverageSiteStack::new(identity, &props()).unwrap()
    }

    #[test]
    fn test_private_bucket_served_through_distribution() {
        let stack = stack();
        let unit = stack.unit();

        let bucket = unit.resource("CoverageReportBucket").unwrap();
        assert_eq!(bucket.property("BucketName"), Some(&json!("m47-coverage-report")));
        assert_eq!(bucket.deletion_policy(), Some(DeletionPolicy::Delete));
        assert!(unit.resource("CoverageReportBucketPolicy").is_some());

        let config = unit
            .resource("CoverageReportDistribution")
            .unwrap()
            .property("DistributionConfig")
            .unwrap();
        assert_eq!(config["Aliases"], json!(["coverage.m47.io"]));
        assert_eq!(config["CustomErrorResponses"][1]["ResponsePagePath"], json!("/index.html"));
        assert_eq!(config["CustomErrorResponses"][0]["ResponseCode"], json!(200));
    }

    #[test]
    fn test_exports_drop_dashes() {
        let stack = stack();
        let exports: Vec<_> = stack
            .unit()
            .outputs()
            .iter()
            .filter_map(|o| o.export_name.as_deref())
            .collect();

        assert_eq!(
            exports,
            vec!["cdkintroworkshopCoverageReportCdn", "cdkintroworkshopCoverageReportDns"]
        );
        let record = stack.unit().resource("CoverageReportRecord").unwrap();
        assert_eq!(record.property("HostedZoneId"), Some(&json!("Z123")));
    }

    #[test]
    fn test_blank_bucket_rejected() {
        let mut props = props();
        props.bucket_name = " ".to_string();
        let identity =
            StackIdentity::new("M47", "demo", "Coverage", AppEnvironment::Test).unwrap();
        assert!(CoverageSiteStack::new(identity, &props).is_err());
    }
}
