// Copyright (c) 2025 - Cowboy AI, Inc.
//! REST API in front of a container service
//!
//! Requests reach the private network load balancer through a VPC link; the
//! greedy path is forwarded as-is.

use serde_json::json;

use super::dns::HostedZone;
use super::gateway::{add_proxy_api, api_url, ProxyApiSpec, ProxyTarget, CORS_ALLOW_HEADERS};
use super::ResourceStack;
use crate::construct::{DeletionPolicy, DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::require_non_empty;
use crate::domain::{ResourceType, StackIdentity, ValidationError};
use crate::errors::StackResult;

/// Container API settings
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEcsProps {
    /// Load balancer handle exported by its stack (`Ref` and `DNSName`)
    pub load_balancer: ResourceHandle,
    pub subdomain: String,
    pub zone: HostedZone,
    pub certificate_arn: String,
}

impl GatewayEcsProps {
    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("subdomain", &self.subdomain)?;
        require_non_empty("domain", self.zone.domain())?;
        require_non_empty("certificate_arn", &self.certificate_arn)?;
        if self.load_balancer.resource_type() != ResourceType::NetworkLoadBalancer {
            return Err(ValidationError::BusinessRule(format!(
                "VPC link target '{}' is not a network load balancer",
                self.load_balancer.logical_id()
            ))
            .into());
        }
        Ok(())
    }
}

pub struct GatewayEcsStack {
    unit: DeployableUnit,
    rest_api: ResourceHandle,
    vpc_link: ResourceHandle,
}

impl GatewayEcsStack {
    pub fn new(identity: StackIdentity, props: &GatewayEcsProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity).with_description("Container REST API");
        let stack_id = unit.id();
        let record_name = props.zone.record_name(&props.subdomain);

        let load_balancer_arn = unit.reference(&props.load_balancer, REF)?;
        let load_balancer_dns = unit.reference(&props.load_balancer, "DNSName")?;

        let vpc_link = unit.add(
            Resource::new("VpcLink", ResourceType::ApiVpcLink)
                .with_properties(json!({
                    "Name": format!("VpcLink-{}", stack_id),
                    "Description": "VPC Link to the NLB",
                    "TargetArns": [load_balancer_arn]
                }))
                .with_deletion_policy(DeletionPolicy::Delete),
        )?;
        let link_id = unit.reference(&vpc_link, REF)?;

        let api_name = format!("EcsRestApi-{}", stack_id);
        let api = add_proxy_api(
            &mut unit,
            ProxyApiSpec {
                name: api_name.clone(),
                description: Some("API Gateway ECS Fargate"),
                target: ProxyTarget::VpcLink {
                    link_id,
                    dns_name: load_balancer_dns,
                },
                binary_media_types: &["multipart/form-data"],
                allow_headers: CORS_ALLOW_HEADERS,
                zone: &props.zone,
                record_name: record_name.clone(),
                certificate_arn: &props.certificate_arn,
            },
        )?;

        let topic = unit.add(
            Resource::new("ApiGatewayErrorTopic", ResourceType::Topic)
                .with_property("DisplayName", "API Gateway Error Topic"),
        )?;
        let topic_arn = unit.reference(&topic, REF)?;
        let stage_name = unit.reference(&api.stage, REF)?;

        unit.add(
            Resource::new("ApiGatewayErrorAlarm", ResourceType::Alarm).with_properties(json!({
                "AlarmDescription": "API Gateway Error Alarm",
                "Namespace": "AWS/ApiGateway",
                "MetricName": "5XXError",
                "Dimensions": [
                    { "Name": "ApiName", "Value": api_name },
                    { "Name": "Stage", "Value": stage_name }
                ],
                "Statistic": "Sum",
                "Period": 300,
                "Threshold": 1,
                "EvaluationPeriods": 1,
                "ComparisonOperator": "GreaterThanOrEqualToThreshold",
                "ActionsEnabled": true,
                "AlarmActions": [topic_arn]
            })),
        )?;

        let api_id = unit.reference(&api.rest_api, REF)?;
        unit.output("apiUrl", api_url(api_id), None, None);
        unit.output("recordUrl", json!(format!("https://{}", record_name)), None, None);

        Ok(Self {
            unit,
            rest_api: api.rest_api,
            vpc_link,
        })
    }

    pub fn rest_api(&self) -> &ResourceHandle {
        &self.rest_api
    }

    pub fn vpc_link(&self) -> &ResourceHandle {
        &self.vpc_link
    }
}

impl ResourceStack for GatewayEcsStack {
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
    use crate::construct::fn_import_value;
    use crate::domain::AppEnvironment;
    use pretty_assertions::assert_eq;

    fn load_balancer() -> ResourceHandle {
        let identity =
            StackIdentity::new("M47", "demo", "Nlb", AppEnvironment::Production).unwrap();
        let mut producer = DeployableUnit::new(identity);
        let mut nlb = producer
            .add(Resource::new("NetworkLoadBalancer", ResourceType::NetworkLoadBalancer))
            .unwrap();
        producer.export(&mut nlb, REF, "LoadBalancerArn").unwrap();
        producer.export(&mut nlb, "DNSName", "LoadBalancerDnsName").unwrap();
        nlb
    }

    fn props() -> GatewayEcsProps {
        GatewayEcsProps {
            load_balancer: load_balancer(),
            subdomain: "Orders".to_string(),
            zone: HostedZone::lookup("m47.io"),
            certificate_arn: "arn:aws:acm:us-east-1:1:certificate/abc".to_string(),
        }
    }

    fn identity() -> StackIdentity {
        StackIdentity::new("M47", "demo", "OrdersApi", AppEnvironment::Production).unwrap()
    }

    #[test]
    fn test_vpc_link_targets_imported_load_balancer() {
        let stack = GatewayEcsStack::new(identity(), &props()).unwrap();
        let unit = stack.unit();

        let link = unit.resource("VpcLink").unwrap();
        assert_eq!(
            link.property("TargetArns"),
            Some(&json!([fn_import_value("m47-demo-nlb-production-stack-LoadBalancerArn")]))
        );
        assert_eq!(
            link.property("Name"),
            Some(&json!("VpcLink-m47-demo-ordersapi-production-stack"))
        );
        assert_eq!(link.deletion_policy(), Some(DeletionPolicy::Delete));
        assert_eq!(
            unit.dependencies().collect::<Vec<_>>(),
            vec!["m47-demo-nlb-production-stack"]
        );
    }

    #[test]
    fn test_proxy_forwards_path_through_link() {
        let stack = GatewayEcsStack::new(identity(), &props()).unwrap();
        let unit = stack.unit();
        let body = unit.resource("RestApi").unwrap().property("Body").unwrap();
        let integration =
            &body["paths"]["/{proxy+}"]["x-amazon-apigateway-any-method"]["x-amazon-apigateway-integration"];

        assert_eq!(integration["type"], json!("http_proxy"));
        assert_eq!(integration["connectionType"], json!("VPC_LINK"));
        assert_eq!(integration["connectionId"], json!({ "Ref": "VpcLink" }));
        assert_eq!(
            integration["uri"],
            json!({ "Fn::Join": ["", [
                "http://",
                fn_import_value("m47-demo-nlb-production-stack-LoadBalancerDnsName"),
                "/{proxy}"
            ]] })
        );
        assert!(body["paths"].get("/").is_none());
        assert!(unit.resource("ApiInvokePermission").is_none());
    }

    #[test]
    fn test_domain_alarm_and_outputs() {
        let stack = GatewayEcsStack::new(identity(), &props()).unwrap();
        let unit = stack.unit();

        assert_eq!(
            unit.resource("ApiDomainName").unwrap().property("DomainName"),
            Some(&json!("orders.m47.io"))
        );
        assert_eq!(
            unit.resource("ApiGatewayErrorAlarm").unwrap().property("AlarmActions"),
            Some(&json!([{ "Ref": "ApiGatewayErrorTopic" }]))
        );
        let ids: Vec<_> = unit.outputs().iter().map(|o| o.logical_id.as_str()).collect();
        assert!(ids.contains(&"ApiUrl"));
        assert!(ids.contains(&"RecordUrl"));
    }

    #[test]
    fn test_rejects_non_load_balancer_target() {
        let identity =
            StackIdentity::new("M47", "demo", "ApiLambda", AppEnvironment::Production).unwrap();
        let mut producer = DeployableUnit::new(identity);
        let function = producer
            .add(Resource::new("Function", ResourceType::LambdaFunction))
            .unwrap();
        let mut props = props();
        props.load_balancer = function;

        assert!(GatewayEcsStack::new(self::identity(), &props).is_err());
    }
}
