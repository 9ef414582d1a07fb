// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Builder
//!
//! Runs build parts strictly one after another. A part that fails with a
//! recoverable error ([`StackError::MissingAsset`]) is skipped along with
//! every part depending on it; any other error halts the run and is
//! returned as is. Nothing is retried and nothing already built is undone.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::observer::{BuildEvent, BuildObserver};
use super::ordering::build_order;
use super::{SharedNetwork, StackBuildPart, StackBuildProps};
use crate::config::{DeploymentConfig, DeploymentEnvironment};
use crate::construct::DeployableUnit;
use crate::domain::format_identifier;
use crate::errors::{StackError, StackResult};
use crate::stacks::repository_url;
use crate::state_machine::{BuildInput, BuildPhase, RecordedMachine};

/// What happened to one part
#[derive(Debug)]
pub enum PartOutcome {
    Built { units: Vec<DeployableUnit> },
    Skipped { reason: String },
}

#[derive(Debug)]
pub struct PartReport {
    pub name: String,
    pub outcome: PartOutcome,
}

impl PartReport {
    pub fn is_built(&self) -> bool {
        matches!(self.outcome, PartOutcome::Built { .. })
    }

    pub fn units(&self) -> &[DeployableUnit] {
        match &self.outcome {
            PartOutcome::Built { units } => units,
            PartOutcome::Skipped { .. } => &[],
        }
    }
}

/// Result of a completed run
#[derive(Debug)]
pub struct BuildReport {
    pub branch: String,
    pub deployment: DeploymentEnvironment,
    /// Units owned by the run rather than a part, such as a provisioned network
    pub shared_units: Vec<DeployableUnit>,
    /// Parts in the order they were attempted
    pub parts: Vec<PartReport>,
    pub phase: BuildPhase,
    /// Number of lifecycle transitions the run went through
    pub transitions: usize,
}

impl BuildReport {
    /// Every unit, shared units first, then parts in build order
    pub fn units(&self) -> impl Iterator<Item = &DeployableUnit> {
        self.shared_units
            .iter()
            .chain(self.parts.iter().flat_map(|part| part.units().iter()))
    }

    pub fn built_parts(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter(|part| part.is_built())
            .map(|part| part.name.as_str())
            .collect()
    }

    pub fn skipped_parts(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter(|part| !part.is_built())
            .map(|part| part.name.as_str())
            .collect()
    }
}

/// Orchestrates one synthesis run
pub struct StackBuilder {
    props: StackBuildProps,
    shared_units: Vec<DeployableUnit>,
    observer: Arc<dyn BuildObserver>,
    lifecycle: RecordedMachine<BuildPhase>,
}

impl StackBuilder {
    /// Resolve branch, account and region, and the shared network
    pub fn new(config: &DeploymentConfig, observer: Arc<dyn BuildObserver>) -> StackResult<Self> {
        config.validate()?;
        let mut lifecycle = RecordedMachine::new(BuildPhase::Initializing);

        let branch = config.branch().to_string();
        let github_owner = config.github_owner.clone();
        let repository_url = repository_url(&github_owner, &config.project_id, &branch);
        observer.info(&BuildEvent::RunStarted {
            project_id: config.project_id.clone(),
            environment: config.app_environment.to_string(),
            branch: branch.clone(),
            repository_url,
        });
        observer.info(&BuildEvent::AccountResolved {
            account: config.environment.account.clone(),
            region: config.environment.region.clone(),
        });

        let network = match SharedNetwork::resolve(config) {
            Ok(network) => network,
            Err(err) => {
                lifecycle.apply(
                    BuildInput::Fatal {
                        reason: err.to_string(),
                    },
                    Utc::now(),
                )?;
                return Err(err);
            }
        };
        let provisioned = network.is_provisioned();
        let (network, network_unit) = network.into_parts();
        observer.info(&BuildEvent::NetworkResolved {
            vpc: match &network_unit {
                Some(unit) => unit.id(),
                None => network
                    .vpc_id
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| network.vpc_id.to_string()),
            },
            provisioned,
        });

        lifecycle.apply(BuildInput::Resolved, Utc::now())?;

        let props = StackBuildProps {
            environment: config.app_environment,
            deployment: config.environment.clone(),
            org_prefix: config.org_prefix.clone(),
            project_id: config.project_id.clone(),
            subdomain: format!("{}-api", format_identifier(&config.project_id)),
            github_owner,
            branch,
            network,
            source_root: config.source_root.clone(),
            out_dir: config.out_dir.clone(),
        };

        Ok(Self {
            props,
            shared_units: network_unit.into_iter().collect(),
            observer,
            lifecycle,
        })
    }

    /// Props handed to every part of this run
    pub fn props(&self) -> &StackBuildProps {
        &self.props
    }

    pub fn phase(&self) -> &BuildPhase {
        self.lifecycle.current()
    }

    /// Build `parts` in dependency order
    pub fn build(mut self, parts: Vec<Box<dyn StackBuildPart>>) -> StackResult<BuildReport> {
        let order = match build_order(&parts) {
            Ok(order) => order,
            Err(err) => return Err(self.halt(err)),
        };
        self.observer.info(&BuildEvent::PartsOrdered {
            parts: order.iter().map(|&i| parts[i].name().to_string()).collect(),
        });

        let mut reports = Vec::with_capacity(parts.len());
        let mut skipped: HashSet<String> = HashSet::new();

        for index in order {
            let part = &parts[index];
            let name = part.name().to_string();

            if let Some(dependency) = part.depends_on().into_iter().find(|d| skipped.contains(d)) {
                self.observer.warn(&BuildEvent::DependencySkipped {
                    part: name.clone(),
                    dependency: dependency.clone(),
                });
                self.advance(BuildInput::PartSkipped { part: name.clone() })?;
                reports.push(PartReport {
                    name: name.clone(),
                    outcome: PartOutcome::Skipped {
                        reason: format!("Depends on skipped part '{}'", dependency),
                    },
                });
                skipped.insert(name);
                continue;
            }

            self.observer.info(&BuildEvent::PartStarted { part: name.clone() });
            match part.build() {
                Ok(units) => {
                    self.observer.info(&BuildEvent::PartBuilt {
                        part: name.clone(),
                        stack_ids: units.iter().map(DeployableUnit::id).collect(),
                    });
                    self.advance(BuildInput::PartBuilt { part: name.clone() })?;
                    reports.push(PartReport {
                        name,
                        outcome: PartOutcome::Built { units },
                    });
                }
                Err(err) if err.is_recoverable() => {
                    let reason = err.to_string();
                    self.observer.warn(&BuildEvent::PartSkipped {
                        part: name.clone(),
                        reason: reason.clone(),
                    });
                    self.advance(BuildInput::PartSkipped { part: name.clone() })?;
                    reports.push(PartReport {
                        name: name.clone(),
                        outcome: PartOutcome::Skipped { reason },
                    });
                    skipped.insert(name);
                }
                Err(err) => {
                    self.observer.warn(&BuildEvent::PartFailed {
                        part: name,
                        error: err.to_string(),
                    });
                    return Err(self.halt(err));
                }
            }
        }

        self.advance(BuildInput::Finish)?;
        let (built, skipped) = match self.lifecycle.current() {
            BuildPhase::Completed { built, skipped } => (*built, *skipped),
            _ => (0, 0),
        };
        self.observer.info(&BuildEvent::RunCompleted { built, skipped });

        Ok(BuildReport {
            branch: self.props.branch,
            deployment: self.props.deployment,
            shared_units: self.shared_units,
            parts: reports,
            phase: self.lifecycle.current().clone(),
            transitions: self.lifecycle.history().len(),
        })
    }

    fn advance(&mut self, input: BuildInput) -> StackResult<()> {
        let output = self.lifecycle.apply(input, Utc::now())?;
        for warning in output.warnings {
            debug!(phase = %self.lifecycle.current(), "{}", warning);
        }
        Ok(())
    }

    /// Move to `Halted` and hand back the error that caused it
    fn halt(&mut self, err: StackError) -> StackError {
        let input = BuildInput::Fatal {
            reason: err.to_string(),
        };
        if let Err(transition) = self.lifecycle.apply(input, Utc::now()) {
            debug!(error = %transition, "Run already terminal");
        }
        err
    }
}
