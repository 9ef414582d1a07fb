// Copyright (c) 2025 - Cowboy AI, Inc.
//! Continuous delivery pipeline
//!
//! GitHub source (webhook), optional manual approval, then one CodeBuild
//! project per test buildspec and per deploy buildspec.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use super::network::VpcReference;
use super::notification::{add_slack_channel, ChatbotLogging, SlackChannel};
use super::security::{PolicyDocument, PolicyStatement, RoleSpec, SecurityGroupSpec};
use super::ResourceStack;
use crate::construct::{fn_get_att, fn_ref, fn_sub, logical_id, DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::{require_non_empty, require_non_empty_list};
use crate::domain::{format_identifier, ResourceType, StackIdentity};
use crate::errors::{StackError, StackResult};

const BUILD_IMAGE: &str = "aws/codebuild/standard:7.0";
const TEST_TIMEOUT_MINUTES: u32 = 30;
const DEPLOY_TIMEOUT_MINUTES: u32 = 60;
const SOURCE_ARTIFACT: &str = "SourceOutput";

const EXECUTION_EVENTS: &[&str] = &[
    "codepipeline-pipeline-pipeline-execution-failed",
    "codepipeline-pipeline-pipeline-execution-canceled",
    "codepipeline-pipeline-pipeline-execution-started",
    "codepipeline-pipeline-pipeline-execution-resumed",
    "codepipeline-pipeline-pipeline-execution-succeeded",
    "codepipeline-pipeline-pipeline-execution-superseded",
];

const APPROVAL_EVENTS: &[&str] = &[
    "codepipeline-pipeline-manual-approval-failed",
    "codepipeline-pipeline-manual-approval-needed",
    "codepipeline-pipeline-manual-approval-succeeded",
];

/// Policy shared by the pipeline, test and deploy roles
pub fn pipeline_policy(domain: &str) -> PolicyDocument {
    PolicyDocument::new(vec![
        PolicyStatement::allow(
            &["sts:AssumeRole"],
            vec![fn_sub("arn:aws:iam::${AWS::AccountId}:role/*")],
        ),
        PolicyStatement::allow(
            &["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
            vec![fn_sub("arn:aws:logs:${AWS::Region}:${AWS::AccountId}:log-group:*")],
        ),
        PolicyStatement::allow(
            &[
                "codebuild:BatchPutCodeCoverages",
                "codebuild:BatchPutTestCases",
                "codebuild:CreateReport",
                "codebuild:CreateReportGroup",
                "codebuild:UpdateReport",
                "codebuild:StartBuild",
            ],
            vec![fn_sub("arn:aws:codebuild:${AWS::Region}:${AWS::AccountId}:project/*")],
        ),
        PolicyStatement::allow(
            &["s3:GetBucket*", "s3:GetObject*", "s3:List*"],
            vec![json!("arn:aws:s3:::*")],
        ),
        PolicyStatement::allow(
            &[
                "secretsmanager:GetResourcePolicy",
                "secretsmanager:GetSecretValue",
                "secretsmanager:DescribeSecret",
                "secretsmanager:ListSecretVersionIds",
            ],
            vec![json!("*")],
        ),
        PolicyStatement::allow(
            &["ses:SendEmail"],
            vec![fn_sub(&format!(
                "arn:aws:ses:${{AWS::Region}}:${{AWS::AccountId}}:identity/{}",
                domain
            ))],
        ),
        PolicyStatement::allow(
            &[
                "kms:Decrypt",
                "kms:DescribeKey",
                "kms:Encrypt",
                "kms:GenerateDataKey*",
                "kms:ReEncrypt*",
            ],
            vec![fn_sub("arn:aws:kms:${AWS::Region}:${AWS::AccountId}:*")],
        ),
        PolicyStatement::allow(
            &["sqs:*"],
            vec![fn_sub("arn:aws:sqs:${AWS::Region}:${AWS::AccountId}:*")],
        ),
        PolicyStatement::allow(
            &["ssm:GetParameter", "ssm:GetParameters", "ssm:GetParametersByPath"],
            vec![fn_sub("arn:aws:ssm:${AWS::Region}:${AWS::AccountId}:parameter/*")],
        ),
    ])
}

/// Browsable URL of `branch` on GitHub
pub fn repository_url(owner: &str, repo: &str, branch: &str) -> String {
    format!("https://github.com/{}/{}/tree/{}", owner, repo, branch)
}

#[derive(Debug, Clone)]
pub struct PipelineProps {
    pub github_repo: String,
    pub github_owner: String,
    pub branch: String,
    /// Verified SES identity approval mail is sent from
    pub domain: String,
    pub secret_token_arn: String,
    pub test_buildspecs: Vec<String>,
    pub deploy_buildspecs: Vec<String>,
    pub vpc: VpcReference,
    pub artifact_bucket: String,
    /// Extra deploy-time variables; `ASPNETCORE_ENVIRONMENT` always wins
    pub environment_variables: BTreeMap<String, String>,
    pub manual_approval: bool,
    pub slack: Option<SlackChannel>,
    pub approval_email: String,
}

impl PipelineProps {
    pub fn new(
        github_repo: impl Into<String>,
        github_owner: impl Into<String>,
        branch: impl Into<String>,
        secret_token_arn: impl Into<String>,
        vpc: VpcReference,
    ) -> Self {
        Self {
            github_repo: github_repo.into(),
            github_owner: github_owner.into(),
            branch: branch.into(),
            domain: String::new(),
            secret_token_arn: secret_token_arn.into(),
            test_buildspecs: Vec::new(),
            deploy_buildspecs: Vec::new(),
            vpc,
            artifact_bucket: "workshop-codepipeline-artifact".to_string(),
            environment_variables: BTreeMap::new(),
            manual_approval: false,
            slack: None,
            approval_email: "developers@m47labs.com".to_string(),
        }
    }

    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("github_repo", &self.github_repo)?;
        require_non_empty("github_owner", &self.github_owner)?;
        require_non_empty("branch", &self.branch)?;
        require_non_empty("domain", &self.domain)?;
        require_non_empty("secret_token_arn", &self.secret_token_arn)?;
        require_non_empty("artifact_bucket", &self.artifact_bucket)?;
        require_non_empty_list("test_buildspecs", &self.test_buildspecs)?;
        require_non_empty_list("deploy_buildspecs", &self.deploy_buildspecs)?;
        if let Some(channel) = &self.slack {
            channel.validate()?;
        }
        Ok(())
    }
}

/// Build stage a CodeBuild project runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildStage {
    Test,
    Deploy,
}

impl BuildStage {
    fn label(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Deploy => "deploy",
        }
    }

    fn timeout_minutes(&self) -> u32 {
        match self {
            Self::Test => TEST_TIMEOUT_MINUTES,
            Self::Deploy => DEPLOY_TIMEOUT_MINUTES,
        }
    }
}

/// File name of a buildspec without its extension
fn buildspec_stem(buildspec: &str) -> StackResult<&str> {
    Path::new(buildspec)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| StackError::configuration(format!("Invalid buildspec path '{}'", buildspec)))
}

/// `{file stem}-{stage}-{formatted repo}`, lowercase
fn project_name(stem: &str, stage: BuildStage, repo: &str) -> String {
    format!("{}-{}-{}", stem, stage.label(), format_identifier(repo)).to_lowercase()
}

fn github_token(secret_arn: &str) -> String {
    format!("{{{{resolve:secretsmanager:{}:SecretString:::}}}}", secret_arn)
}

pub struct PipelineStack {
    unit: DeployableUnit,
    pipeline: ResourceHandle,
}

impl PipelineStack {
    pub fn new(identity: StackIdentity, props: &PipelineProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity).with_description("Delivery pipeline");
        props.vpc.bind(&mut unit);
        let environment = unit.identity().environment();
        let repo = &props.github_repo;

        let policy = pipeline_policy(&props.domain);
        let role = || {
            RoleSpec::assumed_by("lambda.amazonaws.com")
                .also_assumed_by("codepipeline.amazonaws.com")
                .also_assumed_by("codebuild.amazonaws.com")
                .described(format!(
                    "Role for CD pipeline in repo {} ({})",
                    repo, environment
                ))
                .inline_policy("customApiPolicyDocument", policy.clone())
        };
        let pipeline_role = role().add_to(&mut unit, "RolePipeline")?;
        let pipeline_role_arn = fn_get_att(pipeline_role.logical_id(), "Arn");
        let test_role = role()
            .trusted_by_arn(pipeline_role_arn.clone())
            .add_to(&mut unit, "RoleTest")?;
        let deploy_role = role()
            .trusted_by_arn(pipeline_role_arn.clone())
            .add_to(&mut unit, "RoleDeploy")?;

        let project_group = SecurityGroupSpec::new(
            format!("{}-codebuild", unit.id()),
            "Test projects",
            props.vpc.vpc_id.clone(),
        )
        .add_to(&mut unit, "TestProjectSecurityGroup")?;
        let project_group_id = unit.reference(&project_group, "GroupId")?;

        let mut test_actions = Vec::new();
        for buildspec in &props.test_buildspecs {
            let stem = buildspec_stem(buildspec)?;
            let name = project_name(stem, BuildStage::Test, repo);
            let project = build_project(stem, &name, buildspec, BuildStage::Test, &test_role)
                .with_property(
                    "VpcConfig",
                    json!({
                        "VpcId": props.vpc.vpc_id,
                        "Subnets": props.vpc.private_subnets,
                        "SecurityGroupIds": [project_group_id]
                    }),
                );
            let project = unit.add(project)?;
            test_actions.push(build_action(&name, &project, &test_role));
        }

        let mut variables = props.environment_variables.clone();
        variables.insert(
            "ASPNETCORE_ENVIRONMENT".to_string(),
            environment.as_str().to_string(),
        );
        let variables: Vec<Value> = variables
            .iter()
            .map(|(name, value)| json!({ "Name": name, "Value": value, "Type": "PLAINTEXT" }))
            .collect();

        let mut deploy_actions = Vec::new();
        for buildspec in &props.deploy_buildspecs {
            let stem = buildspec_stem(buildspec)?;
            let name = project_name(stem, BuildStage::Deploy, repo);
            let project = build_project(stem, &name, buildspec, BuildStage::Deploy, &deploy_role)
                .with_property("Environment", build_environment(variables.clone()));
            let project = unit.add(project)?;
            deploy_actions.push(build_action(&name, &project, &deploy_role));
        }

        let source_action = format!("checkout-{}-{}", environment, repo).to_lowercase();
        let mut stages = vec![json!({
            "Name": "Source",
            "Actions": [{
                "Name": source_action,
                "ActionTypeId": {
                    "Category": "Source",
                    "Owner": "ThirdParty",
                    "Provider": "GitHub",
                    "Version": "1"
                },
                "Configuration": {
                    "Owner": props.github_owner,
                    "Repo": repo,
                    "Branch": props.branch,
                    "OAuthToken": github_token(&props.secret_token_arn),
                    "PollForSourceChanges": false
                },
                "OutputArtifacts": [{ "Name": SOURCE_ARTIFACT }],
                "RunOrder": 1
            }]
        })];
        if props.manual_approval {
            let approval = format!("{}-ManualApproval-{}", repo, environment).to_lowercase();
            stages.push(json!({
                "Name": approval,
                "Actions": [{
                    "Name": approval,
                    "ActionTypeId": {
                        "Category": "Approval",
                        "Owner": "AWS",
                        "Provider": "Manual",
                        "Version": "1"
                    },
                    "RoleArn": pipeline_role_arn,
                    "RunOrder": 1
                }]
            }));
        }
        stages.push(json!({ "Name": "Test", "Actions": test_actions }));
        stages.push(json!({ "Name": "Deploy", "Actions": deploy_actions }));

        let mut pipeline = unit.add(
            Resource::new("Pipeline", ResourceType::Pipeline)
                .with_properties(json!({
                    "Name": format!("{}-{}", repo, environment).to_lowercase(),
                    "PipelineType": "V2",
                    "RoleArn": pipeline_role_arn,
                    "ArtifactStore": { "Type": "S3", "Location": props.artifact_bucket },
                    "Stages": stages
                }))
                .with_depends_on(pipeline_role.logical_id()),
        )?;

        let pipeline_name = unit.reference(&pipeline, REF)?;
        unit.add(
            Resource::new("PipelineWebhook", ResourceType::PipelineWebhook).with_properties(json!({
                "Authentication": "GITHUB_HMAC",
                "AuthenticationConfiguration": {
                    "SecretToken": github_token(&props.secret_token_arn)
                },
                "Filters": [{
                    "JsonPath": "$.ref",
                    "MatchEquals": "refs/heads/{Branch}"
                }],
                "TargetPipeline": pipeline_name,
                "TargetAction": source_action,
                "TargetPipelineVersion": 1,
                "RegisterWithThirdParty": true
            })),
        )?;

        if let Some(channel) = &props.slack {
            add_notifications(&mut unit, props, channel, &pipeline)?;
        }

        unit.output(
            "RepositoryUrl",
            json!(repository_url(&props.github_owner, repo, &props.branch)),
            Some("Source branch"),
            None,
        );
        unit.export(&mut pipeline, REF, "PipelineName")?;

        debug!(
            stack_id = %unit.id(),
            test_projects = props.test_buildspecs.len(),
            deploy_projects = props.deploy_buildspecs.len(),
            "Pipeline stack defined"
        );
        Ok(Self { unit, pipeline })
    }

    /// Pipeline handle with `Ref` (name) exported
    pub fn pipeline(&self) -> &ResourceHandle {
        &self.pipeline
    }
}

impl ResourceStack for PipelineStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}

fn build_environment(variables: Vec<Value>) -> Value {
    json!({
        "Type": "LINUX_CONTAINER",
        "Image": BUILD_IMAGE,
        "ComputeType": "BUILD_GENERAL1_LARGE",
        "PrivilegedMode": true,
        "EnvironmentVariables": variables
    })
}

fn build_project(
    stem: &str,
    name: &str,
    buildspec: &str,
    stage: BuildStage,
    role: &ResourceHandle,
) -> Resource {
    let id = match stage {
        BuildStage::Test => logical_id(&["Test", stem]),
        BuildStage::Deploy => logical_id(&["Deploy", stem]),
    };
    Resource::new(id, ResourceType::CodeBuildProject)
        .with_properties(json!({
            "Name": name,
            "ServiceRole": fn_get_att(role.logical_id(), "Arn"),
            "Artifacts": { "Type": "CODEPIPELINE" },
            "Source": { "Type": "CODEPIPELINE", "BuildSpec": buildspec },
            "Environment": build_environment(Vec::new()),
            "TimeoutInMinutes": stage.timeout_minutes()
        }))
}

fn build_action(name: &str, project: &ResourceHandle, role: &ResourceHandle) -> Value {
    json!({
        "Name": name,
        "ActionTypeId": {
            "Category": "Build",
            "Owner": "AWS",
            "Provider": "CodeBuild",
            "Version": "1"
        },
        "Configuration": { "ProjectName": fn_ref(project.logical_id()) },
        "InputArtifacts": [{ "Name": SOURCE_ARTIFACT }],
        "RoleArn": fn_get_att(role.logical_id(), "Arn"),
        "RunOrder": 1
    })
}

/// Encrypted topic; the key lets the account administer it
fn add_encrypted_topic(
    unit: &mut DeployableUnit,
    id: &str,
    display_name: &str,
    subscription: Option<Value>,
) -> StackResult<Value> {
    let key = unit.add(
        Resource::new(logical_id(&[id, "Key"]), ResourceType::KmsKey).with_property(
            "KeyPolicy",
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "AWS": fn_sub("arn:aws:iam::${AWS::AccountId}:root") },
                    "Action": "kms:*",
                    "Resource": "*"
                }]
            }),
        ),
    )?;
    let key_arn = unit.reference(&key, "Arn")?;

    let mut topic = Resource::new(id, ResourceType::Topic)
        .with_property("DisplayName", display_name)
        .with_property("KmsMasterKeyId", key_arn);
    if let Some(subscription) = subscription {
        topic = topic.with_property("Subscription", json!([subscription]));
    }
    let topic = unit.add(topic)?;
    unit.reference(&topic, REF)
}

fn notification_rule(
    id: &str,
    name: String,
    detail_type: &str,
    events: &[&str],
    pipeline: &ResourceHandle,
    target_type: &str,
    target: Value,
) -> Resource {
    Resource::new(id, ResourceType::NotificationRule).with_properties(json!({
        "Name": name,
        "DetailType": detail_type,
        "EventTypeIds": events,
        "Resource": fn_sub(&format!(
            "arn:${{AWS::Partition}}:codepipeline:${{AWS::Region}}:${{AWS::AccountId}}:${{{}}}",
            pipeline.logical_id()
        )),
        "Targets": [{ "TargetType": target_type, "TargetAddress": target }]
    }))
}

fn add_notifications(
    unit: &mut DeployableUnit,
    props: &PipelineProps,
    channel: &SlackChannel,
    pipeline: &ResourceHandle,
) -> StackResult<()> {
    let environment = unit.identity().environment();
    let repo = &props.github_repo;

    let topics = match channel {
        SlackChannel::Create { .. } => {
            vec![add_encrypted_topic(unit, "ChatbotTopic", "Chatbot SNS Topic", None)?]
        }
        SlackChannel::Import { .. } => Vec::new(),
    };
    let slack = add_slack_channel(unit, channel, topics, ChatbotLogging::None, 365)?;

    unit.add(notification_rule(
        "ExecutionStateChange",
        format!("{}-ActionChanged-{}", repo, environment).to_lowercase(),
        "BASIC",
        EXECUTION_EVENTS,
        pipeline,
        "AWSChatbotSlack",
        slack.clone(),
    ))?;

    if props.manual_approval {
        unit.add(notification_rule(
            "ManualApprovalSlack",
            format!("{}-ManualApproval-{}", repo, environment).to_lowercase(),
            "FULL",
            APPROVAL_EVENTS,
            pipeline,
            "AWSChatbotSlack",
            slack,
        ))?;

        let email_topic = add_encrypted_topic(
            unit,
            "ManualApprovalEmail",
            &format!("{} - Manual Approval", repo),
            Some(json!({ "Endpoint": props.approval_email, "Protocol": "email" })),
        )?;
        unit.add(notification_rule(
            "ManualApprovalEmailRule",
            format!("{}-ManualApproval-email-{}", repo, environment).to_lowercase(),
            "FULL",
            APPROVAL_EVENTS,
            pipeline,
            "SNS",
            email_topic,
        ))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AppEnvironment, CidrBlock};
    use pretty_assertions::assert_eq;

    fn props() -> PipelineProps {
        let mut props = PipelineProps::new(
            "cdk-intro-workshop",
            "m47ai",
            "main",
            "arn:aws:secretsmanager:eu-west-1:1:secret:github-token",
            VpcReference::lookup("vpc-1", CidrBlock::legacy(), &["subnet-a".to_string()], &[]),
        );
        props.domain = "workshop.com".to_string();
        props.test_buildspecs = vec![
            "workshop/src/iac/buildspecs/test/iac.yml".to_string(),
            "workshop/src/iac/buildspecs/test/backend.yml".to_string(),
        ];
        props.deploy_buildspecs =
            vec!["workshop/src/iac/buildspecs/production/backendApi.yml".to_string()];
        props
    }

    fn identity() -> StackIdentity {
        StackIdentity::new("M47", "cdk-intro-workshop", "Pipeline", AppEnvironment::Production)
            .unwrap()
    }

    #[test]
    fn test_project_names() {
        let stem = buildspec_stem("a/b/iac.yml").unwrap();
        assert_eq!(project_name(stem, BuildStage::Test, "My_Repo"), "iac-test-my-repo");
        assert_eq!(
            project_name("backendApi", BuildStage::Deploy, "cdk-intro-workshop"),
            "backendapi-deploy-cdk-intro-workshop"
        );
        assert!(buildspec_stem("").is_err());
    }

    #[test]
    fn test_stages_without_approval() {
        let stack = PipelineStack::new(identity(), &props()).unwrap();
        let pipeline = stack.unit().resource("Pipeline").unwrap();

        assert_eq!(pipeline.property("PipelineType"), Some(&json!("V2")));
        assert_eq!(
            pipeline.property("Name"),
            Some(&json!("cdk-intro-workshop-production"))
        );
        let stages = pipeline.property("Stages").unwrap().as_array().unwrap();
        let names: Vec<_> = stages.iter().map(|s| s["Name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Source", "Test", "Deploy"]);
        assert_eq!(stages[1]["Actions"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_project_timeouts_and_variables() {
        let stack = PipelineStack::new(identity(), &props()).unwrap();
        let unit = stack.unit();

        let test = unit.resource("TestIac").unwrap();
        assert_eq!(test.property("TimeoutInMinutes"), Some(&json!(30)));
        assert!(test.property("VpcConfig").is_some());

        let deploy = unit.resource("DeployBackendApi").unwrap();
        assert_eq!(deploy.property("TimeoutInMinutes"), Some(&json!(60)));
        assert_eq!(
            deploy.property("Environment").unwrap()["EnvironmentVariables"][0],
            json!({ "Name": "ASPNETCORE_ENVIRONMENT", "Value": "production", "Type": "PLAINTEXT" })
        );
    }

    #[test]
    fn test_manual_approval_with_slack() {
        let mut props = props();
        props.manual_approval = true;
        props.slack = Some(SlackChannel::team_default());
        let stack = PipelineStack::new(identity(), &props).unwrap();
        let unit = stack.unit();

        let stages = unit.resource("Pipeline").unwrap().property("Stages").unwrap();
        assert_eq!(stages[1]["Name"], "cdk-intro-workshop-manualapproval-production");
        assert!(unit.resource("SlackConfig").is_some());
        assert!(unit.resource("ManualApprovalSlack").is_some());
        let email = unit.resource("ManualApprovalEmail").unwrap();
        assert_eq!(
            email.property("Subscription").unwrap()[0]["Endpoint"],
            "developers@m47labs.com"
        );
    }

    #[test]
    fn test_requires_buildspecs() {
        let mut props = props();
        props.deploy_buildspecs.clear();
        assert!(PipelineStack::new(identity(), &props).is_err());
    }

    #[test]
    fn test_repository_url() {
        assert_eq!(
            repository_url("m47ai", "cdk-intro-workshop", "main"),
            "https://github.com/m47ai/cdk-intro-workshop/tree/main"
        );
    }
}
