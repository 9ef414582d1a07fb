// Copyright (c) 2025 - Cowboy AI, Inc.
//! REST API in front of a function
//!
//! The API is a greedy proxy: every path and method is forwarded to the
//! function. [`add_proxy_api`] is shared with the dynamic site stack and the
//! container API behind a VPC link.

use serde_json::{json, Value};

use super::dns::{alias_record, HostedZone};
use super::ResourceStack;
use crate::construct::{
    aws_account_id, aws_region, fn_join, fn_ref, DeletionPolicy, DeployableUnit, Resource,
    ResourceHandle, REF,
};
use crate::domain::invariants::require_non_empty;
use crate::domain::{ResourceType, StackIdentity, ValidationError};
use crate::errors::StackResult;

/// Deployment stage name
pub const STAGE_NAME: &str = "prod";

const ACCESS_LOG_RETENTION_DAYS: u32 = 365;

/// Common log format for access logs
const ACCESS_LOG_FORMAT: &str = "$context.identity.sourceIp $context.identity.caller $context.identity.user [$context.requestTime] \"$context.httpMethod $context.resourcePath $context.protocol\" $context.status $context.responseLength $context.requestId";

/// Headers browsers may send on cross-origin requests
pub const CORS_ALLOW_HEADERS: &[&str] = &[
    "Cache-Control",
    "Content-Language",
    "Content-Type",
    "Expires",
    "Last-Modified",
    "Pragma",
    "Acceptencoding",
    "Authorization",
    "X-Amz-Date",
    "X-Api-Key",
    "X-Forwarded-For",
];

/// Where the proxy forwards requests
pub(crate) enum ProxyTarget {
    /// Lambda proxy integration
    Function { arn: Value },
    /// HTTP proxy to a private load balancer through a VPC link
    VpcLink { link_id: Value, dns_name: Value },
}

/// Everything needed to put a proxy API in front of a target
pub(crate) struct ProxyApiSpec<'a> {
    pub name: String,
    pub description: Option<&'a str>,
    pub target: ProxyTarget,
    pub binary_media_types: &'a [&'a str],
    pub allow_headers: &'a [&'a str],
    pub zone: &'a HostedZone,
    pub record_name: String,
    pub certificate_arn: &'a str,
}

/// Handles of the API pieces other resources point at
pub(crate) struct ProxyApi {
    pub rest_api: ResourceHandle,
    pub stage: ResourceHandle,
}

/// Integration URI invoking `function_arn`
fn invocation_uri(function_arn: &Value) -> Value {
    fn_join(
        "",
        vec![
            json!("arn:aws:apigateway:"),
            aws_region(),
            json!(":lambda:path/2015-03-31/functions/"),
            function_arn.clone(),
            json!("/invocations"),
        ],
    )
}

/// OpenAPI body for `target`
///
/// Functions get `ANY` on `/` and `/{proxy+}` plus CORS preflight. A VPC link
/// only proxies `/{proxy+}`, passing the path through.
fn proxy_definition(name: &str, target: &ProxyTarget, allow_headers: &[&str]) -> Value {
    let paths = match target {
        ProxyTarget::Function { arn } => function_paths(arn, allow_headers),
        ProxyTarget::VpcLink { link_id, dns_name } => json!({
            "/{proxy+}": {
                "parameters": [{
                    "name": "proxy",
                    "in": "path",
                    "required": true,
                    "schema": { "type": "string" }
                }],
                "x-amazon-apigateway-any-method": {
                    "x-amazon-apigateway-integration": {
                        "type": "http_proxy",
                        "httpMethod": "ANY",
                        "connectionType": "VPC_LINK",
                        "connectionId": link_id,
                        "uri": fn_join("", vec![
                            json!("http://"),
                            dns_name.clone(),
                            json!("/{proxy}"),
                        ]),
                        "requestParameters": {
                            "integration.request.path.proxy": "method.request.path.proxy"
                        }
                    }
                }
            }
        }),
    };

    json!({
        "openapi": "3.0.1",
        "info": { "title": name, "version": "1.0" },
        "paths": paths
    })
}

fn function_paths(function_arn: &Value, allow_headers: &[&str]) -> Value {
    let integration = json!({
        "type": "aws_proxy",
        "httpMethod": "POST",
        "uri": invocation_uri(function_arn)
    });
    let preflight = json!({
        "responses": { "204": { "description": "CORS preflight" } },
        "x-amazon-apigateway-integration": {
            "type": "mock",
            "requestTemplates": { "application/json": "{ statusCode: 200 }" },
            "responses": {
                "default": {
                    "statusCode": "204",
                    "responseParameters": {
                        "method.response.header.Access-Control-Allow-Headers":
                            format!("'{}'", allow_headers.join(",")),
                        "method.response.header.Access-Control-Allow-Origin": "'*'",
                        "method.response.header.Access-Control-Allow-Methods":
                            "'OPTIONS,GET,PUT,POST,DELETE,PATCH,HEAD'",
                        "method.response.header.Access-Control-Allow-Credentials": "'true'"
                    }
                }
            }
        }
    });
    let path = json!({
        "x-amazon-apigateway-any-method": { "x-amazon-apigateway-integration": integration },
        "options": preflight
    });

    json!({ "/": path, "/{proxy+}": path })
}

/// Add a greedy proxy API with access logs, edge domain and alias record
pub(crate) fn add_proxy_api(unit: &mut DeployableUnit, spec: ProxyApiSpec<'_>) -> StackResult<ProxyApi> {
    let log_group = unit.add(
        Resource::new("ApiGatewayAccessLogs", ResourceType::LogGroup)
            .with_property("RetentionInDays", ACCESS_LOG_RETENTION_DAYS)
            .with_deletion_policy(DeletionPolicy::Delete),
    )?;
    let log_group_arn = unit.reference(&log_group, "Arn")?;

    let mut api = Resource::new("RestApi", ResourceType::RestApi).with_properties(json!({
        "Name": spec.name,
        "BinaryMediaTypes": spec.binary_media_types,
        "EndpointConfiguration": { "Types": ["EDGE"] },
        "Body": proxy_definition(&spec.name, &spec.target, spec.allow_headers)
    }));
    if let Some(description) = spec.description {
        api = api.with_property("Description", description);
    }
    let rest_api = unit.add(api)?;
    let api_id = unit.reference(&rest_api, REF)?;

    if let ProxyTarget::Function { arn } = &spec.target {
        unit.add(
            Resource::new("ApiInvokePermission", ResourceType::LambdaPermission).with_properties(
                json!({
                    "Action": "lambda:InvokeFunction",
                    "FunctionName": arn,
                    "Principal": "apigateway.amazonaws.com",
                    "SourceArn": fn_join("", vec![
                        json!("arn:aws:execute-api:"),
                        aws_region(),
                        json!(":"),
                        aws_account_id(),
                        json!(":"),
                        api_id.clone(),
                        json!("/*/*"),
                    ])
                }),
            ),
        )?;
    }

    let deployment = unit.add(
        Resource::new("ApiDeployment", ResourceType::ApiDeployment)
            .with_property("RestApiId", api_id.clone())
            .with_property("Description", "Automatically created by the RestApi construct"),
    )?;

    let stage = unit.add(
        Resource::new("ApiStage", ResourceType::ApiStage).with_properties(json!({
            "RestApiId": api_id,
            "StageName": STAGE_NAME,
            "DeploymentId": fn_ref(deployment.logical_id()),
            "AccessLogSetting": {
                "DestinationArn": log_group_arn,
                "Format": ACCESS_LOG_FORMAT
            }
        })),
    )?;

    let domain = unit.add(
        Resource::new("ApiDomainName", ResourceType::ApiDomainName).with_properties(json!({
            "DomainName": spec.record_name,
            "CertificateArn": spec.certificate_arn,
            "EndpointConfiguration": { "Types": ["EDGE"] }
        })),
    )?;

    unit.add(
        Resource::new("ApiBasePathMapping", ResourceType::ApiBasePathMapping)
            .with_properties(json!({
                "DomainName": fn_ref(domain.logical_id()),
                "RestApiId": api_id,
                "Stage": fn_ref(stage.logical_id())
            })),
    )?;

    let dns_name = unit.reference(&domain, "DistributionDomainName")?;
    let zone_id = unit.reference(&domain, "DistributionHostedZoneId")?;
    unit.add(alias_record(
        "AliasRecord",
        spec.zone,
        &spec.record_name,
        dns_name,
        zone_id,
    ))?;

    Ok(ProxyApi { rest_api, stage })
}

/// Invoke URL of the deployed stage
pub(crate) fn api_url(api_id: Value) -> Value {
    fn_join(
        "",
        vec![
            json!("https://"),
            api_id,
            json!(".execute-api."),
            aws_region(),
            json!("."),
            json!({ "Ref": "AWS::URLSuffix" }),
            json!(format!("/{}/", STAGE_NAME)),
        ],
    )
}

/// Gateway settings
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayProps {
    /// Function handle exported by the function stack (`Arn` and `Ref`)
    pub function: ResourceHandle,
    pub subdomain: String,
    pub zone: HostedZone,
    pub certificate_arn: String,
}

impl GatewayProps {
    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("subdomain", &self.subdomain)?;
        require_non_empty("domain", self.zone.domain())?;
        require_non_empty("certificate_arn", &self.certificate_arn)?;
        if self.function.resource_type() != ResourceType::LambdaFunction {
            return Err(ValidationError::BusinessRule(format!(
                "Gateway target '{}' is not a function",
                self.function.logical_id()
            ))
            .into());
        }
        Ok(())
    }
}

pub struct GatewayStack {
    unit: DeployableUnit,
    rest_api: ResourceHandle,
    alarm_topic: ResourceHandle,
}

impl GatewayStack {
    pub fn new(identity: StackIdentity, props: &GatewayProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity).with_description("Function REST API");
        let record_name = props.zone.record_name(&props.subdomain);

        let function_arn = unit.reference(&props.function, "Arn")?;
        let function_name = unit.reference(&props.function, REF)?;
        let api_name = format!("LambdaRestApi-{}", unit.id());

        let api = add_proxy_api(
            &mut unit,
            ProxyApiSpec {
                name: api_name.clone(),
                description: None,
                target: ProxyTarget::Function { arn: function_arn },
                binary_media_types: &["multipart/form-data"],
                allow_headers: CORS_ALLOW_HEADERS,
                zone: &props.zone,
                record_name: record_name.clone(),
                certificate_arn: &props.certificate_arn,
            },
        )?;

        let mut alarm_topic = unit.add(
            Resource::new("ApiGatewayErrorTopic", ResourceType::Topic)
                .with_property("DisplayName", "API Gateway Error Topic"),
        )?;
        let topic_arn = unit.reference(&alarm_topic, REF)?;
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
        unit.add(
            Resource::new("LambdaFunctionErrorAlarm", ResourceType::Alarm).with_properties(json!({
                "AlarmDescription": "Lambda Function Error Alarm",
                "Namespace": "AWS/Lambda",
                "MetricName": "Errors",
                "Dimensions": [{ "Name": "FunctionName", "Value": function_name }],
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
        unit.export(&mut alarm_topic, REF, "ErrorTopicArn")?;

        Ok(Self {
            unit,
            rest_api: api.rest_api,
            alarm_topic,
        })
    }

    pub fn rest_api(&self) -> &ResourceHandle {
        &self.rest_api
    }

    /// Topic receiving the error alarms, `Ref` exported
    pub fn alarm_topic(&self) -> &ResourceHandle {
        &self.alarm_topic
    }
}

impl ResourceStack for GatewayStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}
