// Copyright (c) 2025 - Cowboy AI, Inc.
//! Object storage stack

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ResourceStack;
use crate::construct::{fn_join, DeletionPolicy, DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::{ResourceType, StackIdentity, ValidationError};
use crate::errors::StackResult;

/// Bucket settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProps {
    pub bucket_name: String,
}

impl StorageProps {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
        }
    }

    /// 3-63 characters of lowercase letters, digits, dots and hyphens
    pub fn validate(&self) -> StackResult<()> {
        let name = &self.bucket_name;
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
        let valid_edges = name
            .chars()
            .next()
            .zip(name.chars().last())
            .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

        if !(3..=63).contains(&name.len()) || !valid_chars || !valid_edges {
            return Err(ValidationError::BusinessRule(format!(
                "Invalid bucket name '{}'",
                name
            ))
            .into());
        }
        Ok(())
    }
}

/// Retained bucket with TLS-only access and browser CORS
pub struct StorageStack {
    unit: DeployableUnit,
    bucket: ResourceHandle,
}

impl StorageStack {
    pub fn new(identity: StackIdentity, props: &StorageProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity);

        let mut bucket = unit.add(
            Resource::new("S3Bucket", ResourceType::Bucket)
                .with_properties(json!({
                    "BucketName": props.bucket_name,
                    "CorsConfiguration": {
                        "CorsRules": [{
                            "AllowedOrigins": ["*"],
                            "AllowedMethods": ["GET", "PUT", "HEAD"],
                            "AllowedHeaders": ["*"]
                        }]
                    }
                }))
                .with_deletion_policy(DeletionPolicy::Retain),
        )?;

        let bucket_ref = unit.reference(&bucket, REF)?;
        let bucket_arn = unit.reference(&bucket, "Arn")?;
        unit.add(
            Resource::new("S3BucketPolicy", ResourceType::BucketPolicy).with_properties(json!({
                "Bucket": bucket_ref,
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Deny",
                        "Principal": { "AWS": "*" },
                        "Action": "s3:*",
                        "Condition": { "Bool": { "aws:SecureTransport": "false" } },
                        "Resource": [bucket_arn, fn_join("", vec![bucket_arn.clone(), json!("/*")])]
                    }]
                }
            })),
        )?;

        unit.export(&mut bucket, REF, "BucketName")?;
        unit.export(&mut bucket, "Arn", "BucketArn")?;

        Ok(Self { unit, bucket })
    }

    /// Bucket handle with `Ref` and `Arn` exported
    pub fn bucket(&self) -> &ResourceHandle {
        &self.bucket
    }
}

impl ResourceStack for StorageStack {
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
    use test_case::test_case;

    fn identity() -> StackIdentity {
        StackIdentity::new("M47", "my-repo", "Storage", AppEnvironment::Staging).unwrap()
    }

    #[test_case("my-bucket", true ; "plain")]
    #[test_case("my.bucket.1", true ; "dotted")]
    #[test_case("My-Bucket", false ; "uppercase")]
    #[test_case("-bucket", false ; "leading hyphen")]
    #[test_case("ab", false ; "too short")]
    fn test_bucket_name_rules(name: &str, valid: bool) {
        assert_eq!(StorageProps::new(name).validate().is_ok(), valid);
    }

    #[test]
    fn test_bucket_retained_with_cors() {
        let stack = StorageStack::new(identity(), &StorageProps::new("my-bucket")).unwrap();
        let bucket = stack.unit().resource("S3Bucket").unwrap();

        assert_eq!(bucket.deletion_policy(), Some(DeletionPolicy::Retain));
        assert_eq!(
            bucket.property("CorsConfiguration").unwrap()["CorsRules"][0]["AllowedMethods"],
            json!(["GET", "PUT", "HEAD"])
        );
        assert!(stack.unit().resource("S3BucketPolicy").is_some());
        assert_eq!(
            stack.bucket().export_name("Arn"),
            Some("m47-my-repo-storage-staging-stack-BucketArn")
        );
    }
}
