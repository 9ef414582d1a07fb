// Copyright (c) 2025 - Cowboy AI, Inc.
//! Scheduled state machine invoking a function
//!
//! A schedule rule starts one execution every few minutes. An alarm fires when
//! a period passes with no execution started.

use serde_json::json;

use super::security::{PolicyDocument, PolicyStatement, RoleSpec};
use super::ResourceStack;
use crate::construct::{DeletionPolicy, DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::{require_non_empty, require_positive};
use crate::domain::{ResourceType, StackIdentity, ValidationError};
use crate::errors::StackResult;

const LOG_RETENTION_DAYS: u32 = 365;

/// Actions the service needs to deliver execution logs
const LOG_DELIVERY_ACTIONS: &[&str] = &[
    "logs:CreateLogDelivery",
    "logs:GetLogDelivery",
    "logs:UpdateLogDelivery",
    "logs:DeleteLogDelivery",
    "logs:ListLogDeliveries",
    "logs:PutResourcePolicy",
    "logs:DescribeResourcePolicies",
    "logs:DescribeLogGroups",
];

/// State machine settings
#[derive(Debug, Clone, PartialEq)]
pub struct StepFunctionsProps {
    pub name: String,
    /// Function handle with `Arn` exported
    pub function: ResourceHandle,
    pub schedule_minutes: u32,
    /// Subscribed to the alarm topic when set
    pub alarm_email: Option<String>,
}

impl StepFunctionsProps {
    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("name", &self.name)?;
        require_positive("schedule_minutes", i64::from(self.schedule_minutes))?;
        if self.function.resource_type() != ResourceType::LambdaFunction {
            return Err(ValidationError::BusinessRule(format!(
                "State machine task '{}' is not a function",
                self.function.logical_id()
            ))
            .into());
        }
        if let Some(email) = &self.alarm_email {
            if !email.contains('@') {
                return Err(ValidationError::BusinessRule(format!(
                    "Invalid alarm email '{}'",
                    email
                ))
                .into());
            }
        }
        Ok(())
    }

    /// `rate(1 minute)` or `rate(N minutes)`
    pub fn schedule_expression(&self) -> String {
        match self.schedule_minutes {
            1 => "rate(1 minute)".to_string(),
            minutes => format!("rate({} minutes)", minutes),
        }
    }
}

pub struct StepFunctionsStack {
    unit: DeployableUnit,
    state_machine: ResourceHandle,
    alarm_topic: ResourceHandle,
}

impl StepFunctionsStack {
    pub fn new(identity: StackIdentity, props: &StepFunctionsProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity).with_description("Scheduled state machine");
        let project = unit.identity().cloud_formation_project();
        let environment = unit.identity().environment();
        let log_group_name = unit.identity().scoped_name(&props.name);
        let function_arn = unit.reference(&props.function, "Arn")?;

        let log_group = unit.add(
            Resource::new("StateMachineLogGroup", ResourceType::LogGroup)
                .with_property("LogGroupName", log_group_name)
                .with_property("RetentionInDays", LOG_RETENTION_DAYS)
                .with_deletion_policy(DeletionPolicy::Retain),
        )?;
        let log_group_arn = unit.reference(&log_group, "Arn")?;

        let role = RoleSpec::assumed_by("states.amazonaws.com")
            .inline_policy(
                "StateMachinePolicy",
                PolicyDocument::new(vec![
                    PolicyStatement::allow(LOG_DELIVERY_ACTIONS, vec![json!("*")]),
                    PolicyStatement::allow(
                        &["logs:CreateLogStream", "logs:PutLogEvents"],
                        vec![log_group_arn.clone()],
                    ),
                    PolicyStatement::allow(&["lambda:InvokeFunction"], vec![function_arn.clone()]),
                ]),
            )
            .add_to(&mut unit, "StateMachineRole")?;
        let role_arn = unit.reference(&role, "Arn")?;

        let mut state_machine = unit.add(
            Resource::new("StateMachine", ResourceType::StateMachine).with_properties(json!({
                "StateMachineName": format!("{}-{}", project, props.name).to_lowercase(),
                "StateMachineType": "STANDARD",
                "RoleArn": role_arn,
                "Definition": {
                    "StartAt": "InvokeLambda",
                    "States": {
                        "InvokeLambda": {
                            "Type": "Task",
                            "Resource": "arn:aws:states:::lambda:invoke",
                            "Parameters": {
                                "FunctionName": "${FunctionArn}",
                                "Payload.$": "$"
                            },
                            "End": true
                        }
                    }
                },
                "DefinitionSubstitutions": { "FunctionArn": function_arn },
                "LoggingConfiguration": {
                    "Level": "ALL",
                    "IncludeExecutionData": true,
                    "Destinations": [{ "CloudWatchLogsLogGroup": { "LogGroupArn": log_group_arn } }]
                }
            })),
        )?;
        let state_machine_arn = unit.reference(&state_machine, REF)?;

        let schedule_role = RoleSpec::assumed_by("events.amazonaws.com")
            .inline_policy(
                "StartExecutionPolicy",
                PolicyDocument::new(vec![PolicyStatement::allow(
                    &["states:StartExecution"],
                    vec![state_machine_arn.clone()],
                )]),
            )
            .add_to(&mut unit, "ScheduleRole")?;
        let schedule_role_arn = unit.reference(&schedule_role, "Arn")?;

        unit.add(
            Resource::new("ScheduleRule", ResourceType::EventRule).with_properties(json!({
                "ScheduleExpression": props.schedule_expression(),
                "State": "ENABLED",
                "Targets": [{
                    "Id": "StateMachineTarget",
                    "Arn": state_machine_arn,
                    "RoleArn": schedule_role_arn
                }]
            })),
        )?;

        let mut topic = Resource::new("AlarmTopic", ResourceType::Topic)
            .with_property("DisplayName", "Step Functions Alarm Notifications");
        if let Some(email) = &props.alarm_email {
            topic = topic.with_property(
                "Subscription",
                json!([{ "Protocol": "email", "Endpoint": email }]),
            );
        }
        let alarm_topic = unit.add(topic)?;
        let topic_arn = unit.reference(&alarm_topic, REF)?;

        unit.add(
            Resource::new("ExecutionsStartedAlarm", ResourceType::Alarm).with_properties(json!({
                "AlarmDescription": format!("No {} execution started", props.name),
                "Namespace": "AWS/States",
                "MetricName": "ExecutionsStarted",
                "Dimensions": [{ "Name": "StateMachineArn", "Value": state_machine_arn }],
                "Statistic": "Sum",
                "Period": 300,
                "Threshold": 0,
                "EvaluationPeriods": 1,
                "ComparisonOperator": "LessThanOrEqualToThreshold",
                "ActionsEnabled": true,
                "AlarmActions": [topic_arn]
            })),
        )?;

        let description = format!(
            "The StepFunction {} {} {}",
            unit.identity().project_id(),
            props.name,
            environment
        );
        unit.output(
            "StateMachineArn",
            state_machine_arn,
            Some(&description),
            Some(format!("{}-{}-StateMachineArn", project, props.name)),
        );
        unit.export(&mut state_machine, "Name", "StateMachineName")?;

        Ok(Self {
            unit,
            state_machine,
            alarm_topic,
        })
    }

    pub fn state_machine(&self) -> &ResourceHandle {
        &self.state_machine
    }

    pub fn alarm_topic(&self) -> &ResourceHandle {
        &self.alarm_topic
    }
}

impl ResourceStack for StepFunctionsStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}
