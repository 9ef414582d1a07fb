// Copyright (c) 2025 - Cowboy AI, Inc.
//! Build Observers
//!
//! The builder reports progress as [`BuildEvent`]s through an injected
//! [`BuildObserver`]; rendering is the caller's choice.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    RunStarted {
        project_id: String,
        environment: String,
        branch: String,
        repository_url: String,
    },
    AccountResolved {
        account: Option<String>,
        region: Option<String>,
    },
    NetworkResolved {
        vpc: String,
        provisioned: bool,
    },
    PartsOrdered {
        parts: Vec<String>,
    },
    PartStarted {
        part: String,
    },
    PartBuilt {
        part: String,
        stack_ids: Vec<String>,
    },
    /// The part raised a recoverable error and was left out
    PartSkipped {
        part: String,
        reason: String,
    },
    /// The part was left out because a part it depends on was
    DependencySkipped {
        part: String,
        dependency: String,
    },
    PartFailed {
        part: String,
        error: String,
    },
    RunCompleted {
        built: usize,
        skipped: usize,
    },
}

impl BuildEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::AccountResolved { .. } => "account_resolved",
            Self::NetworkResolved { .. } => "network_resolved",
            Self::PartsOrdered { .. } => "parts_ordered",
            Self::PartStarted { .. } => "part_started",
            Self::PartBuilt { .. } => "part_built",
            Self::PartSkipped { .. } => "part_skipped",
            Self::DependencySkipped { .. } => "dependency_skipped",
            Self::PartFailed { .. } => "part_failed",
            Self::RunCompleted { .. } => "run_completed",
        }
    }

    /// Part the event is about, if any
    pub fn part(&self) -> Option<&str> {
        match self {
            Self::PartStarted { part }
            | Self::PartBuilt { part, .. }
            | Self::PartSkipped { part, .. }
            | Self::DependencySkipped { part, .. }
            | Self::PartFailed { part, .. } => Some(part),
            _ => None,
        }
    }
}

impl fmt::Display for BuildEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted {
                project_id,
                environment,
                branch,
                repository_url,
            } => write!(
                f,
                "Building {} ({}) from branch {}: {}",
                project_id, environment, branch, repository_url
            ),
            Self::AccountResolved { account, region } => write!(
                f,
                "Target account {} in region {}",
                account.as_deref().unwrap_or("<provider default>"),
                region.as_deref().unwrap_or("<provider default>")
            ),
            Self::NetworkResolved { vpc, provisioned } => {
                if *provisioned {
                    write!(f, "Shared network provisioned by {}", vpc)
                } else {
                    write!(f, "Shared network {} looked up", vpc)
                }
            }
            Self::PartsOrdered { parts } => write!(f, "Requested parts: {}", parts.join(", ")),
            Self::PartStarted { part } => write!(f, "Building part {}", part),
            Self::PartBuilt { part, stack_ids } => {
                write!(f, "Part {} built {} stack(s)", part, stack_ids.len())
            }
            Self::PartSkipped { part, reason } => write!(f, "Skipped part {}: {}", part, reason),
            Self::DependencySkipped { part, dependency } => write!(
                f,
                "Skipped part {}: depends on skipped part {}",
                part, dependency
            ),
            Self::PartFailed { part, error } => write!(f, "Part {} failed: {}", part, error),
            Self::RunCompleted { built, skipped } => {
                write!(f, "Run completed: {} built, {} skipped", built, skipped)
            }
        }
    }
}

/// Severity an event was reported with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
}

/// Receives builder progress
pub trait BuildObserver: Send + Sync {
    fn info(&self, event: &BuildEvent);
    fn warn(&self, event: &BuildEvent);
}

/// Renders events as `tracing` records
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BuildObserver for TracingObserver {
    fn info(&self, event: &BuildEvent) {
        info!(event = event.name(), part = event.part(), "{}", event);
    }

    fn warn(&self, event: &BuildEvent) {
        warn!(event = event.name(), part = event.part(), "{}", event);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedEvent {
    pub level: EventLevel,
    pub event: BuildEvent,
}

/// Keeps every event in memory, optionally passing it on
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RecordedEvent>>,
    forward: Option<Arc<dyn BuildObserver>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and hand every event to `inner`
    pub fn forwarding(inner: Arc<dyn BuildObserver>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            forward: Some(inner),
        }
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().clone()
    }

    /// Events reported at warn level
    pub fn warnings(&self) -> Vec<BuildEvent> {
        self.lock()
            .iter()
            .filter(|recorded| recorded.level == EventLevel::Warn)
            .map(|recorded| recorded.event.clone())
            .collect()
    }

    fn record(&self, level: EventLevel, event: &BuildEvent) {
        self.lock().push(RecordedEvent {
            level,
            event: event.clone(),
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BuildObserver for RecordingObserver {
    fn info(&self, event: &BuildEvent) {
        self.record(EventLevel::Info, event);
        if let Some(inner) = &self.forward {
            inner.info(event);
        }
    }

    fn warn(&self, event: &BuildEvent) {
        self.record(EventLevel::Warn, event);
        if let Some(inner) = &self.forward {
            inner.warn(event);
        }
    }
}
