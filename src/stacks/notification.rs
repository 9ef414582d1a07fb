// Copyright (c) 2025 - Cowboy AI, Inc.
//! Slack notification channel
//!
//! A channel is either created here and bound to SNS topics, or imported by
//! ARN. An imported channel keeps whatever topics it was configured with.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use super::security::RoleSpec;
use super::ResourceStack;
use crate::construct::{DeletionPolicy, DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::{require_non_empty, require_non_empty_list};
use crate::domain::{ResourceType, StackIdentity};
use crate::errors::StackResult;

const DEFAULT_CONFIGURATION_NAME: &str = "SlackConfig";
const DEFAULT_WORKSPACE_ID: &str = "T98UH2NLT";
const DEFAULT_CHANNEL_ID: &str = "CT9FRTMEH";

/// Chatbot log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChatbotLogging {
    Error,
    Info,
    None,
}

impl ChatbotLogging {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Info => "INFO",
            Self::None => "NONE",
        }
    }
}

/// Where notifications end up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlackChannel {
    Create {
        configuration_name: String,
        workspace_id: String,
        channel_id: String,
    },
    Import { arn: String },
}

impl SlackChannel {
    /// The team channel in the default workspace
    pub fn team_default() -> Self {
        Self::Create {
            configuration_name: DEFAULT_CONFIGURATION_NAME.to_string(),
            workspace_id: DEFAULT_WORKSPACE_ID.to_string(),
            channel_id: DEFAULT_CHANNEL_ID.to_string(),
        }
    }

    /// The already-deployed team channel in `account`
    pub fn existing(account: &str) -> Self {
        Self::Import {
            arn: format!(
                "arn:aws:chatbot::{}:chat-configuration/slack-channel/{}",
                account, DEFAULT_CONFIGURATION_NAME
            ),
        }
    }

    pub fn validate(&self) -> StackResult<()> {
        match self {
            Self::Create {
                configuration_name,
                workspace_id,
                channel_id,
            } => {
                require_non_empty("configuration_name", configuration_name)?;
                require_non_empty("workspace_id", workspace_id)?;
                require_non_empty("channel_id", channel_id)?;
            }
            Self::Import { arn } => require_non_empty("arn", arn)?,
        }
        Ok(())
    }
}

/// Add `channel` to `unit`, subscribed to `topics`, and return its ARN token
///
/// Shared with the pipeline stack, which creates its notification topic in
/// the same unit.
pub(crate) fn add_slack_channel(
    unit: &mut DeployableUnit,
    channel: &SlackChannel,
    topics: Vec<Value>,
    logging: ChatbotLogging,
    log_retention_days: u32,
) -> StackResult<Value> {
    let (configuration_name, workspace_id, channel_id) = match channel {
        SlackChannel::Import { arn } => {
            if !topics.is_empty() {
                warn!(
                    stack_id = %unit.id(),
                    arn = %arn,
                    "Imported Slack channel keeps its own topics"
                );
            }
            return Ok(json!(arn));
        }
        SlackChannel::Create {
            configuration_name,
            workspace_id,
            channel_id,
        } => (configuration_name, workspace_id, channel_id),
    };

    let role = RoleSpec::assumed_by("chatbot.amazonaws.com").add_to(unit, "SlackChannelRole")?;
    let role_arn = unit.reference(&role, "Arn")?;

    unit.add(
        Resource::new("SlackChannelLogGroup", ResourceType::LogGroup)
            .with_property("LogGroupName", format!("/aws/chatbot/{}", configuration_name))
            .with_property("RetentionInDays", log_retention_days)
            .with_deletion_policy(DeletionPolicy::Delete),
    )?;

    let configuration = unit.add(
        Resource::new("SlackConfig", ResourceType::SlackChannelConfiguration)
            .with_properties(json!({
                "ConfigurationName": configuration_name,
                "SlackWorkspaceId": workspace_id,
                "SlackChannelId": channel_id,
                "IamRoleArn": role_arn,
                "LoggingLevel": logging.as_str(),
                "SnsTopicArns": topics
            }))
            .with_deletion_policy(DeletionPolicy::Delete),
    )?;
    unit.reference(&configuration, REF)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationProps {
    pub channel: SlackChannel,
    /// Topics with their `Ref` exported, or owned by nobody else
    pub topics: Vec<ResourceHandle>,
    pub logging: ChatbotLogging,
    pub log_retention_days: u32,
}

impl NotificationProps {
    pub fn new(channel: SlackChannel, topics: Vec<ResourceHandle>) -> Self {
        Self {
            channel,
            topics,
            logging: ChatbotLogging::None,
            log_retention_days: 365,
        }
    }

    pub fn validate(&self) -> StackResult<()> {
        self.channel.validate()?;
        if matches!(self.channel, SlackChannel::Create { .. }) {
            require_non_empty_list("topics", &self.topics)?;
        }
        Ok(())
    }
}

pub struct NotificationStack {
    unit: DeployableUnit,
    channel_arn: Value,
}

impl NotificationStack {
    pub fn new(identity: StackIdentity, props: &NotificationProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity);

        let mut topics = Vec::with_capacity(props.topics.len());
        for topic in &props.topics {
            topics.push(unit.reference(topic, REF)?);
        }

        let channel_arn = add_slack_channel(
            &mut unit,
            &props.channel,
            topics,
            props.logging,
            props.log_retention_days,
        )?;
        unit.output("SlackChannelArn", channel_arn.clone(), None, None);

        Ok(Self { unit, channel_arn })
    }

    /// Notification target ARN, created or imported
    pub fn channel_arn(&self) -> &Value {
        &self.channel_arn
    }
}

impl ResourceStack for NotificationStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}
