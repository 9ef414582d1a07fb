// Copyright (c) 2025 - Cowboy AI, Inc.
//! Static website on a private bucket behind CloudFront
//!
//! Paths without a known file extension are rewritten at the edge so
//! `/about/` and `/about` both serve `/about.html`.

use serde_json::{json, Value};

use super::dns::{alias_record, HostedZone, CLOUDFRONT_HOSTED_ZONE_ID};
use super::ResourceStack;
use crate::asset::AssetSource;
use crate::construct::{fn_join, fn_sub, DeletionPolicy, DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::require_non_empty;
use crate::domain::{ResourceType, StackIdentity};
use crate::errors::StackResult;

/// Extensions served as-is by the URL rewrite
pub const STATIC_FILE_EXTENSIONS: &[&str] = &[
    ".html", ".js", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2",
    ".ttf", ".otf", ".eot", ".json", ".xml",
];

/// Seconds CloudFront caches the custom error pages
const ERROR_CACHING_MIN_TTL: u32 = 10;

const URL_REWRITE_FUNCTION: &str = r#"function handler(event) {
  var request = event.request;
  var uri = request.uri;
  var staticFileExtensions = ['.html', '.js', '.css', '.png', '.jpg', '.jpeg', '.gif', '.svg', '.ico', '.woff', '.woff2', '.ttf', '.otf', '.eot', '.json', '.xml'];
  function hasKnownExtension(uri) {
    return staticFileExtensions.some(function (extension) { return uri.endsWith(extension); });
  }
  if (uri.endsWith('/') && uri !== '/') {
    uri = uri.slice(0, -1);
  }
  if (uri !== '/' && !hasKnownExtension(uri)) {
    uri += '.html';
  }
  request.uri = uri;
  return request;
}
"#;

/// Viewer-request function source attached to the distribution
pub fn url_rewrite_function_code() -> &'static str {
    URL_REWRITE_FUNCTION
}

/// The rewrite [`url_rewrite_function_code`] applies at the edge
///
/// ```rust
/// use iac_stacks::stacks::rewrite_uri;
///
/// assert_eq!(rewrite_uri("/"), "/");
/// assert_eq!(rewrite_uri("/about/"), "/about.html");
/// assert_eq!(rewrite_uri("/app.js"), "/app.js");
/// ```
pub fn rewrite_uri(uri: &str) -> String {
    let uri = match uri.strip_suffix('/') {
        Some(stripped) if uri != "/" => stripped,
        _ => uri,
    };
    if uri == "/" || STATIC_FILE_EXTENSIONS.iter().any(|ext| uri.ends_with(ext)) {
        uri.to_string()
    } else {
        format!("{}.html", uri)
    }
}

/// Private bucket readable only through a CloudFront origin access identity
pub(crate) struct PrivateOrigin {
    pub bucket: ResourceHandle,
    pub bucket_name: Value,
    pub regional_domain: Value,
    /// `origin-access-identity/cloudfront/{id}` for the distribution origin
    pub access_identity_path: Value,
}

/// Encrypted private bucket plus the access identity CloudFront reads it with
pub(crate) fn add_private_origin(
    unit: &mut DeployableUnit,
    prefix: &str,
    bucket_name: &str,
) -> StackResult<PrivateOrigin> {
    let bucket = unit.add(
        Resource::new(format!("{}Bucket", prefix), ResourceType::Bucket)
            .with_properties(json!({
                "BucketName": bucket_name,
                "AccessControl": "Private",
                "PublicAccessBlockConfiguration": {
                    "BlockPublicAcls": true,
                    "BlockPublicPolicy": true,
                    "IgnorePublicAcls": true,
                    "RestrictPublicBuckets": true
                },
                "BucketEncryption": {
                    "ServerSideEncryptionConfiguration": [{
                        "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" }
                    }]
                },
                "CorsConfiguration": {
                    "CorsRules": [{
                        "AllowedMethods": ["GET", "HEAD"],
                        "AllowedOrigins": ["*"],
                        "AllowedHeaders": ["*"]
                    }]
                }
            }))
            .with_deletion_policy(DeletionPolicy::Delete),
    )?;
    let bucket_ref = unit.reference(&bucket, REF)?;
    let bucket_arn = unit.reference(&bucket, "Arn")?;
    let regional_domain = unit.reference(&bucket, "RegionalDomainName")?;

    let access_identity = unit.add(
        Resource::new("OriginAccessIdentity", ResourceType::OriginAccessIdentity).with_property(
            "CloudFrontOriginAccessIdentityConfig",
            json!({
                "Comment": format!("Setup access from CloudFront to the bucket {} (read)", bucket_name)
            }),
        ),
    )?;
    let identity_id = unit.reference(&access_identity, REF)?;
    let canonical_user = unit.reference(&access_identity, "S3CanonicalUserId")?;
    let objects = fn_join("", vec![bucket_arn.clone(), json!("/*")]);

    unit.add(
        Resource::new(format!("{}BucketPolicy", prefix), ResourceType::BucketPolicy).with_properties(
            json!({
                "Bucket": bucket_ref,
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [
                        {
                            "Effect": "Deny",
                            "Principal": { "AWS": "*" },
                            "Action": "s3:*",
                            "Condition": { "Bool": { "aws:SecureTransport": "false" } },
                            "Resource": [bucket_arn, objects]
                        },
                        {
                            "Effect": "Allow",
                            "Principal": { "CanonicalUser": canonical_user },
                            "Action": ["s3:GetObject*", "s3:GetBucket*", "s3:List*"],
                            "Resource": [bucket_arn, objects]
                        }
                    ]
                }
            }),
        ),
    )?;

    Ok(PrivateOrigin {
        bucket,
        bucket_name: bucket_ref,
        regional_domain,
        access_identity_path: fn_join(
            "",
            vec![json!("origin-access-identity/cloudfront/"), identity_id],
        ),
    })
}

#[derive(Debug, Clone)]
pub struct StaticSiteProps {
    pub record_name: String,
    pub domain_name: String,
    pub hosted_zone_id: String,
    pub certificate_arn: String,
    pub dist_folder: AssetSource,
}

impl StaticSiteProps {
    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("record_name", &self.record_name)?;
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

pub struct StaticSiteStack {
    unit: DeployableUnit,
    bucket: ResourceHandle,
    distribution: ResourceHandle,
}

impl StaticSiteStack {
    pub fn new(identity: StackIdentity, props: &StaticSiteProps) -> StackResult<Self> {
        props.validate()?;
        let bundle = props.dist_folder.resolve()?;

        let mut unit = DeployableUnit::new(identity).with_description("Static website");
        let zone = props.zone();
        let full_domain = zone.record_name(&props.record_name);

        let origin = add_private_origin(&mut unit, "StaticWebsite", &full_domain)?;
        let bucket_name = origin.bucket_name.clone();

        let rewrite = unit.add(
            Resource::new("UrlRewriteFunction", ResourceType::CloudFrontFunction).with_properties(
                json!({
                    "Name": format!("{}-url-rewrite", full_domain.replace('.', "-")),
                    "AutoPublish": true,
                    "FunctionCode": URL_REWRITE_FUNCTION,
                    "FunctionConfig": {
                        "Comment": format!("{}-url-rewrite", full_domain),
                        "Runtime": "cloudfront-js-1.0"
                    }
                }),
            ),
        )?;
        let rewrite_arn = unit.reference(&rewrite, "FunctionARN")?;

        let error_responses: Vec<_> = [403, 404]
            .iter()
            .map(|status| {
                json!({
                    "ErrorCode": status,
                    "ResponseCode": 200,
                    "ResponsePagePath": format!("/{}.html", status),
                    "ErrorCachingMinTTL": ERROR_CACHING_MIN_TTL
                })
            })
            .collect();

        let mut distribution = unit.add(
            Resource::new("Distribution", ResourceType::Distribution).with_property(
                "DistributionConfig",
                json!({
                    "Enabled": true,
                    "Aliases": [full_domain],
                    "DefaultRootObject": "index.html",
                    "Origins": [{
                        "Id": "StaticWebsiteOrigin",
                        "DomainName": origin.regional_domain,
                        "S3OriginConfig": { "OriginAccessIdentity": origin.access_identity_path }
                    }],
                    "DefaultCacheBehavior": {
                        "TargetOriginId": "StaticWebsiteOrigin",
                        "ViewerProtocolPolicy": "redirect-to-https",
                        "CachePolicyId": "658327ea-f89d-4fab-a63d-7e88639e58f6",
                        "Compress": true,
                        "FunctionAssociations": [{
                            "EventType": "viewer-request",
                            "FunctionARN": rewrite_arn
                        }]
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
        let distribution_id = unit.reference(&distribution, REF)?;
        let distribution_domain = unit.reference(&distribution, "DomainName")?;

        unit.add(
            Resource::new("DeployStaticWebsite", ResourceType::BucketDeployment).with_properties(
                json!({
                    "ServiceToken": fn_sub(
                        "arn:${AWS::Partition}:lambda:${AWS::Region}:${AWS::AccountId}:function:cdk-bucket-deployment"
                    ),
                    "SourceBucketNames": [fn_sub("cdk-assets-${AWS::AccountId}-${AWS::Region}")],
                    "SourceObjectKeys": [bundle.object_key()],
                    "DestinationBucketName": bucket_name,
                    "DistributionId": distribution_id,
                    "DistributionPaths": ["/*"],
                    "Prune": true
                }),
            ),
        )?;

        unit.add(alias_record(
            "WebDomainRecord",
            &zone,
            &full_domain,
            distribution_domain.clone(),
            json!(CLOUDFRONT_HOSTED_ZONE_ID),
        ))?;

        let project = unit.identity().cloud_formation_project();
        unit.output(
            "CloudFrontDistributionDomainName",
            distribution_domain,
            Some("CloudFront distribution domain"),
            Some(format!("{}-CloudFrontDistributionDomainName", project)),
        );
        unit.output(
            "DnsRecordName",
            json!(full_domain),
            Some("The DNS record name"),
            Some(format!("{}-AliasRecord", project)),
        );
        unit.export(&mut distribution, REF, "DistributionId")?;

        Ok(Self {
            unit,
            bucket: origin.bucket,
            distribution,
        })
    }

    pub fn bucket(&self) -> &ResourceHandle {
        &self.bucket
    }

    /// Distribution handle with `Ref` exported
    pub fn distribution(&self) -> &ResourceHandle {
        &self.distribution
    }
}

impl ResourceStack for StaticSiteStack {
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
    use crate::domain::AppEnvironment;
    use crate::errors::StackError;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("/", "/" ; "home")]
    #[test_case("/about", "/about.html" ; "pretty path")]
    #[test_case("/about/", "/about.html" ; "trailing slash")]
    #[test_case("/fonts/a.woff2", "/fonts/a.woff2" ; "font")]
    #[test_case("/blog/index.html", "/blog/index.html" ; "explicit html")]
    #[test_case("/v1.2/notes", "/v1.2/notes.html" ; "dotted directory")]
    fn test_rewrite_uri(uri: &str, expected: &str) {
        assert_eq!(rewrite_uri(uri), expected);
    }

    fn props(dir: &TempDir) -> StaticSiteProps {
        StaticSiteProps {
            record_name: "Docs".to_string(),
            domain_name: "m47.io".to_string(),
            hosted_zone_id: "Z999".to_string(),
            certificate_arn: "arn:aws:acm:us-east-1:1:certificate/site".to_string(),
            dist_folder: AssetSource::directory(dir.path()),
        }
    }

    #[test]
    fn test_site_resources() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        let identity = StackIdentity::new("M47", "docs", "Website", AppEnvironment::Production).unwrap();
        let stack = StaticSiteStack::new(identity, &props(&dir)).unwrap();
        let unit = stack.unit();

        assert_eq!(
            unit.resource("StaticWebsiteBucket").unwrap().property("BucketName"),
            Some(&json!("docs.m47.io"))
        );
        let config = unit.resource("Distribution").unwrap().property("DistributionConfig").unwrap();
        assert_eq!(config["Aliases"], json!(["docs.m47.io"]));
        assert_eq!(config["CustomErrorResponses"][1]["ResponsePagePath"], "/404.html");
        assert_eq!(config["CustomErrorResponses"][0]["ResponseCode"], 200);

        let record = unit.resource("WebDomainRecord").unwrap();
        assert_eq!(record.property("AliasTarget").unwrap()["HostedZoneId"], CLOUDFRONT_HOSTED_ZONE_ID);

        let exports: Vec<_> = unit.outputs().iter().filter_map(|o| o.export_name.as_deref()).collect();
        assert!(exports.contains(&"docs-CloudFrontDistributionDomainName"));
        assert!(exports.contains(&"docs-AliasRecord"));
    }

    #[test]
    fn test_missing_dist_folder_is_recoverable() {
        let dir = TempDir::new().unwrap();
        let mut props = props(&dir);
        props.dist_folder = AssetSource::directory(dir.path().join("dist"));
        let identity = StackIdentity::new("M47", "docs", "Website", AppEnvironment::Test).unwrap();

        let err = StaticSiteStack::new(identity, &props).err().unwrap();
        assert!(matches!(err, StackError::MissingAsset { .. }));
        assert!(err.is_recoverable());
    }
}
