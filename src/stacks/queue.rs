// Copyright (c) 2025 - Cowboy AI, Inc.
//! Message queue stack with optional dead-letter queue

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ResourceStack;
use crate::construct::{DeployableUnit, Resource, ResourceHandle, REF};
use crate::domain::invariants::{require_non_empty, require_range};
use crate::domain::{to_pascal_case, AppType, ResourceType, StackIdentity};
use crate::errors::StackResult;

const DELIVERY_DELAY_SECONDS: u32 = 5;
const DEFAULT_RETENTION_SECONDS: u32 = 14 * 24 * 60 * 60;
const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: u32 = 15 * 60;

/// Queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueProps {
    pub queue_name: String,
    pub dead_letter: bool,
    pub max_receive_count: u32,
    pub visibility_timeout_seconds: Option<u32>,
    pub retention_seconds: Option<u32>,
}

impl QueueProps {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            dead_letter: false,
            max_receive_count: 3,
            visibility_timeout_seconds: None,
            retention_seconds: None,
        }
    }

    pub fn with_dead_letter(mut self, max_receive_count: u32) -> Self {
        self.dead_letter = true;
        self.max_receive_count = max_receive_count;
        self
    }

    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("queue_name", &self.queue_name)?;
        if self.dead_letter {
            require_range("max_receive_count", i64::from(self.max_receive_count), 1, 1000)?;
        }
        if let Some(retention) = self.retention_seconds {
            require_range("retention_seconds", i64::from(retention), 60, 1_209_600)?;
        }
        if let Some(visibility) = self.visibility_timeout_seconds {
            require_range("visibility_timeout_seconds", i64::from(visibility), 0, 43_200)?;
        }
        Ok(())
    }
}

pub struct QueueStack {
    unit: DeployableUnit,
    queue: ResourceHandle,
    dead_letter_queue: Option<ResourceHandle>,
}

impl QueueStack {
    pub fn new(identity: StackIdentity, props: &QueueProps) -> StackResult<Self> {
        props.validate()?;
        let mut unit = DeployableUnit::new(identity);
        let retention = props.retention_seconds.unwrap_or(DEFAULT_RETENTION_SECONDS);

        let mut redrive = None;
        let dead_letter_queue = if props.dead_letter {
            let mut dlq = unit.add(
                Resource::new("DeadLetterQueue", ResourceType::Queue).with_properties(json!({
                    "QueueName": format!("{}-deadletter", props.queue_name),
                    "MessageRetentionPeriod": retention,
                    "VisibilityTimeout": 0
                })),
            )?;
            redrive = Some(json!({
                "deadLetterTargetArn": unit.reference(&dlq, "Arn")?,
                "maxReceiveCount": props.max_receive_count
            }));

            let dlq_url = unit.reference(&dlq, REF)?;
            let dlq_arn = unit.reference(&dlq, "Arn")?;
            unit.add(
                Resource::new("DeadLetterQueuePolicy", ResourceType::QueuePolicy).with_properties(
                    json!({
                        "Queues": [dlq_url],
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [{
                                "Effect": "Allow",
                                "Principal": { "Service": "sqs.amazonaws.com" },
                                "Action": ["sqs:SendMessage", "sqs:GetQueueAttributes", "sqs:GetQueueUrl"],
                                "Resource": dlq_arn
                            }]
                        }
                    }),
                ),
            )?;
            unit.export(&mut dlq, "Arn", "DeadLetterQueueArn")?;
            Some(dlq)
        } else {
            None
        };

        let mut main = Resource::new("MainQueue", ResourceType::Queue).with_properties(json!({
            "QueueName": props.queue_name,
            "DelaySeconds": DELIVERY_DELAY_SECONDS,
            "MessageRetentionPeriod": retention,
            "VisibilityTimeout": props
                .visibility_timeout_seconds
                .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT_SECONDS)
        }));
        if let Some(redrive) = redrive {
            main = main.with_property("RedrivePolicy", redrive);
        }
        let mut queue = unit.add(main)?;

        let queue_url = unit.reference(&queue, REF)?;
        let category = format!("{}/Aws", to_pascal_case(unit.identity().unit_name()));
        for app_type in AppType::ALL {
            let path = unit.identity().parameter_path(app_type, &category, "QueueUrl");
            let description = format!(
                "The SQS url {} {} {}",
                unit.identity().project_id(),
                props.queue_name,
                unit.identity().environment()
            );
            unit.publish_parameter(path, queue_url.clone(), &description)?;
        }

        unit.export(&mut queue, "Arn", "MainQueueArn")?;
        unit.export(&mut queue, "QueueName", "MainQueueName")?;

        Ok(Self {
            unit,
            queue,
            dead_letter_queue,
        })
    }

    /// Main queue, with `Arn` and `QueueName` exported
    pub fn queue(&self) -> &ResourceHandle {
        &self.queue
    }

    pub fn dead_letter_queue(&self) -> Option<&ResourceHandle> {
        self.dead_letter_queue.as_ref()
    }
}

impl ResourceStack for QueueStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}
