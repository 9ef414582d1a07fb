// Copyright (c) 2025 - Cowboy AI, Inc.
//! Queue-Depth Step Scaling
//!
//! Two independent step policies drive a service's task count from the depth
//! of a queue: fast scale-out on visible messages, and slow scale-in once
//! nothing is visible or in flight for three consecutive minutes.
//!
//! [`StepScalingPolicy::evaluate`] models how the provider's alarm plus step
//! adjustments react to a series of datapoints, so the policy shape can be
//! checked without deploying it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::construct::{fn_ref, logical_id, DeployableUnit, Resource};
use crate::domain::ResourceType;
use crate::errors::StackResult;

/// Default upper bound on task count
pub const DEFAULT_MAX_CAPACITY: u32 = 1;

const SQS_NAMESPACE: &str = "AWS/SQS";
const VISIBLE_MESSAGES: &str = "ApproximateNumberOfMessagesVisible";
const IN_FLIGHT_MESSAGES: &str = "ApproximateNumberOfMessagesNotVisible";

/// Aggregation applied to a metric within one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Average,
    Sum,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "Average",
            Self::Sum => "Sum",
        }
    }
}

/// One queue metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub metric_name: String,
    pub queue_name: Value,
    pub statistic: Statistic,
    pub period_seconds: u32,
}

impl MetricQuery {
    fn queue(metric_name: &str, queue_name: &Value, statistic: Statistic, period_seconds: u32) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            queue_name: queue_name.clone(),
            statistic,
            period_seconds,
        }
    }

    fn metric(&self) -> Value {
        json!({
            "Namespace": SQS_NAMESPACE,
            "MetricName": self.metric_name,
            "Dimensions": [{ "Name": "QueueName", "Value": self.queue_name }]
        })
    }
}

/// Metric an alarm watches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricSpec {
    Single(MetricQuery),
    Expression {
        expression: String,
        label: String,
        metrics: Vec<(String, MetricQuery)>,
        period_seconds: u32,
    },
}

impl MetricSpec {
    pub fn period_seconds(&self) -> u32 {
        match self {
            Self::Single(query) => query.period_seconds,
            Self::Expression { period_seconds, .. } => *period_seconds,
        }
    }

    fn alarm_fields(&self) -> Value {
        match self {
            Self::Single(query) => {
                let mut fields = query.metric();
                fields["Statistic"] = json!(query.statistic.as_str());
                fields["Period"] = json!(query.period_seconds);
                fields
            }
            Self::Expression {
                expression,
                label,
                metrics,
                ..
            } => {
                let mut queries = vec![json!({
                    "Id": "expr_1",
                    "Expression": expression,
                    "Label": label,
                    "ReturnData": true
                })];
                queries.extend(metrics.iter().map(|(id, query)| {
                    json!({
                        "Id": id,
                        "MetricStat": {
                            "Metric": query.metric(),
                            "Period": query.period_seconds,
                            "Stat": query.statistic.as_str()
                        },
                        "ReturnData": false
                    })
                }));
                json!({ "Metrics": queries })
            }
        }
    }
}

/// Capacity change applied while the metric is within `[lower, upper]`
///
/// `upper == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingStep {
    pub lower: f64,
    pub upper: Option<f64>,
    pub change: i32,
}

impl ScalingStep {
    pub fn new(lower: f64, upper: Option<f64>, change: i32) -> Self {
        Self {
            lower,
            upper,
            change,
        }
    }

    fn contains(&self, value: f64) -> bool {
        value >= self.lower && self.upper.map_or(true, |upper| value <= upper)
    }
}

/// Outcome of evaluating a policy against recent datapoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    /// Not enough datapoints to fill the evaluation window
    InsufficientData,
    /// Alarm not breached
    NoChange,
    /// Adjust capacity by this many tasks
    Change(i32),
}

/// Step scaling policy on one alarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepScalingPolicy {
    pub name: String,
    pub metric: MetricSpec,
    pub steps: Vec<ScalingStep>,
    pub cooldown_seconds: u32,
    pub evaluation_periods: u32,
    pub datapoints_to_alarm: u32,
}

impl StepScalingPolicy {
    fn change_for(&self, value: f64) -> i32 {
        self.steps
            .iter()
            .find(|step| step.contains(value))
            .map_or(0, |step| step.change)
    }

    /// React to datapoints ordered oldest first, one per period
    ///
    /// The last `evaluation_periods` datapoints form the window. The alarm
    /// fires when at least `datapoints_to_alarm` of them fall in a step with a
    /// non-zero change; the adjustment is that of the newest breaching one.
    pub fn evaluate(&self, datapoints: &[f64]) -> ScalingDecision {
        let window = self.evaluation_periods as usize;
        if window == 0 || datapoints.len() < window {
            return ScalingDecision::InsufficientData;
        }

        let changes: Vec<i32> = datapoints[datapoints.len() - window..]
            .iter()
            .map(|value| self.change_for(*value))
            .filter(|change| *change != 0)
            .collect();

        match changes.last() {
            Some(change) if changes.len() >= self.datapoints_to_alarm as usize => {
                ScalingDecision::Change(*change)
            }
            _ => ScalingDecision::NoChange,
        }
    }

    /// Alarm threshold and comparison derived from the non-zero steps
    fn alarm_threshold(&self) -> Option<(f64, &'static str)> {
        let scale_out = self.steps.iter().filter(|s| s.change > 0);
        let scale_in = self.steps.iter().filter(|s| s.change < 0);

        if let Some(threshold) = scale_out.map(|s| s.lower).reduce(f64::min) {
            return Some((threshold, "GreaterThanOrEqualToThreshold"));
        }
        scale_in
            .map(|s| s.upper.unwrap_or(s.lower))
            .reduce(f64::max)
            .map(|threshold| (threshold, "LessThanOrEqualToThreshold"))
    }

    fn step_adjustments(&self, threshold: f64) -> Vec<Value> {
        let lowest = self
            .steps
            .iter()
            .filter(|s| s.change != 0)
            .map(|s| s.lower)
            .reduce(f64::min);

        self.steps
            .iter()
            .filter(|s| s.change != 0)
            .map(|step| {
                let mut adjustment = json!({ "ScalingAdjustment": step.change });
                if step.change > 0 || Some(step.lower) != lowest {
                    adjustment["MetricIntervalLowerBound"] = json!(step.lower - threshold);
                }
                if let Some(upper) = step.upper {
                    if step.change < 0 {
                        adjustment["MetricIntervalUpperBound"] = json!(upper - threshold);
                    }
                }
                adjustment
            })
            .collect()
    }
}

/// Scalable target plus its two queue-depth policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDepthScaling {
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub scale_out: StepScalingPolicy,
    pub scale_in: StepScalingPolicy,
}

/// The asymmetric pair driven by the depth of `queue_name`
pub fn queue_depth_policies(queue_name: impl Into<Value>, max_capacity: Option<u32>) -> QueueDepthScaling {
    let queue_name = queue_name.into();

    let scale_out = StepScalingPolicy {
        name: "ScaleOut".to_string(),
        metric: MetricSpec::Single(MetricQuery::queue(
            VISIBLE_MESSAGES,
            &queue_name,
            Statistic::Average,
            10,
        )),
        steps: vec![
            ScalingStep::new(0.0, Some(0.0), 0),
            ScalingStep::new(1.0, None, 1),
        ],
        cooldown_seconds: 10,
        evaluation_periods: 1,
        datapoints_to_alarm: 1,
    };

    let label = match &queue_name {
        Value::String(name) => format!("ApproximateNumberOfMessages-{}", name),
        _ => "ApproximateNumberOfMessages".to_string(),
    };
    let scale_in = StepScalingPolicy {
        name: "ScaleIn".to_string(),
        metric: MetricSpec::Expression {
            expression: "IF(m1 + m2 > 0, 1, 0)".to_string(),
            label,
            metrics: vec![
                (
                    "m1".to_string(),
                    MetricQuery::queue(VISIBLE_MESSAGES, &queue_name, Statistic::Sum, 60),
                ),
                (
                    "m2".to_string(),
                    MetricQuery::queue(IN_FLIGHT_MESSAGES, &queue_name, Statistic::Sum, 60),
                ),
            ],
            period_seconds: 60,
        },
        steps: vec![
            ScalingStep::new(1.0, None, 0),
            ScalingStep::new(0.0, Some(0.0), -1),
        ],
        cooldown_seconds: 15 * 60,
        evaluation_periods: 3,
        datapoints_to_alarm: 3,
    };

    QueueDepthScaling {
        min_capacity: 0,
        max_capacity: max_capacity.unwrap_or(DEFAULT_MAX_CAPACITY),
        scale_out,
        scale_in,
    }
}

impl QueueDepthScaling {
    /// Add the scalable target, both policies and their alarms to `unit`
    ///
    /// `service_resource_id` is the `service/{cluster}/{service}` id of the
    /// scaled service.
    pub fn add_to(
        &self,
        unit: &mut DeployableUnit,
        prefix: &str,
        service_resource_id: Value,
    ) -> StackResult<()> {
        let target_id = logical_id(&[prefix, "ScalableTarget"]);
        unit.add(
            Resource::new(target_id.clone(), ResourceType::ScalableTarget).with_properties(json!({
                "MinCapacity": self.min_capacity,
                "MaxCapacity": self.max_capacity,
                "ResourceId": service_resource_id,
                "ScalableDimension": "ecs:service:DesiredCount",
                "ServiceNamespace": "ecs"
            })),
        )?;

        for policy in [&self.scale_out, &self.scale_in] {
            let Some((threshold, comparison)) = policy.alarm_threshold() else {
                continue;
            };

            let policy_id = logical_id(&[prefix, &policy.name, "Policy"]);
            unit.add(
                Resource::new(policy_id.clone(), ResourceType::ScalingPolicy).with_properties(
                    json!({
                        "PolicyName": format!("{}{}", prefix, policy.name),
                        "PolicyType": "StepScaling",
                        "ScalingTargetId": fn_ref(&target_id),
                        "StepScalingPolicyConfiguration": {
                            "AdjustmentType": "ChangeInCapacity",
                            "Cooldown": policy.cooldown_seconds,
                            "MetricAggregationType": "Average",
                            "StepAdjustments": policy.step_adjustments(threshold)
                        }
                    }),
                ),
            )?;

            unit.add(
                Resource::new(
                    logical_id(&[prefix, &policy.name, "Alarm"]),
                    ResourceType::Alarm,
                )
                .with_properties(policy.metric.alarm_fields())
                .with_properties(json!({
                    "ComparisonOperator": comparison,
                    "Threshold": threshold,
                    "EvaluationPeriods": policy.evaluation_periods,
                    "DatapointsToAlarm": policy.datapoints_to_alarm,
                    "AlarmActions": [fn_ref(&policy_id)]
                })),
            )?;
        }
        Ok(())
    }
}
