// Copyright (c) 2025 - Cowboy AI, Inc.
//! Orchestration Lifecycle State Machine
//!
//! Formal FSM for one stack builder run.
//!
//! # States
//!
//! - Initializing: resolving branch, environment and shared network
//! - Building: iterating build parts in dependency order
//! - Completed: every part attempted (terminal)
//! - Halted: a fatal error stopped the run (terminal)
//!
//! # Inputs
//!
//! - Resolved: Initializing → Building
//! - PartBuilt / PartSkipped: Building → Building
//! - Fatal: Initializing | Building → Halted
//! - Finish: Building → Completed

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Phase of a builder run (FSM state)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildPhase {
    Initializing,
    Building { built: usize, skipped: usize },
    Completed { built: usize, skipped: usize },
    Halted { reason: String },
}

impl BuildPhase {
    fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Building { .. } => "Building",
            Self::Completed { .. } => "Completed",
            Self::Halted { .. } => "Halted",
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builder event (FSM input)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildInput {
    /// Shared prerequisites resolved
    Resolved,

    /// A part built successfully
    PartBuilt { part: String },

    /// A part was skipped after a recoverable error
    PartSkipped { part: String },

    /// An unrecoverable error
    Fatal { reason: String },

    /// Every part attempted
    Finish,
}

/// Transition output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseOutput {
    /// Warnings generated during transition
    pub warnings: Vec<String>,
}

impl PhaseOutput {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            warnings: vec![message.into()],
        }
    }
}

impl StateMachine for BuildPhase {
    type Input = BuildInput;
    type Output = PhaseOutput;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use BuildInput::*;
        use BuildPhase::*;

        match (self, input) {
            (Initializing, Resolved) => Ok((
                Building {
                    built: 0,
                    skipped: 0,
                },
                PhaseOutput::ok(),
            )),

            (Building { built, skipped }, PartBuilt { .. }) => Ok((
                Building {
                    built: built + 1,
                    skipped: *skipped,
                },
                PhaseOutput::ok(),
            )),
            (Building { built, skipped }, PartSkipped { part }) => Ok((
                Building {
                    built: *built,
                    skipped: skipped + 1,
                },
                PhaseOutput::warning(format!("Skipped build part '{}'", part)),
            )),
            (Building { built, skipped }, Finish) => Ok((
                Completed {
                    built: *built,
                    skipped: *skipped,
                },
                PhaseOutput::ok(),
            )),

            (Initializing | Building { .. }, Fatal { reason }) => Ok((
                Halted {
                    reason: reason.clone(),
                },
                PhaseOutput::ok(),
            )),

            (Completed { .. } | Halted { .. }, _) => Err(TransitionError::Terminal {
                phase: self.to_string(),
            }),

            (Initializing, PartBuilt { .. } | PartSkipped { .. } | Finish) => {
                Err(TransitionError::OutOfOrder(
                    "Shared prerequisites must be resolved before building".to_string(),
                ))
            }
            (Building { .. }, Resolved) => Err(TransitionError::OutOfOrder(
                "Prerequisites already resolved".to_string(),
            )),
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Halted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::RecordedMachine;
    use chrono::Utc;

    fn built(part: &str) -> BuildInput {
        BuildInput::PartBuilt {
            part: part.to_string(),
        }
    }

    #[test]
    fn test_full_run() {
        let mut fsm = RecordedMachine::new(BuildPhase::Initializing);
        fsm.apply(BuildInput::Resolved, Utc::now()).unwrap();
        fsm.apply(built("backend"), Utc::now()).unwrap();
        let output = fsm
            .apply(
                BuildInput::PartSkipped {
                    part: "frontend".to_string(),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(output.warnings, vec!["Skipped build part 'frontend'"]);

        fsm.apply(BuildInput::Finish, Utc::now()).unwrap();
        assert_eq!(
            *fsm.current(),
            BuildPhase::Completed {
                built: 1,
                skipped: 1
            }
        );
        assert!(fsm.current().is_terminal());
        assert_eq!(fsm.history().len(), 4);
    }

    #[test]
    fn test_cannot_build_before_resolving() {
        let result = BuildPhase::Initializing.transition(&built("backend"));
        assert!(matches!(
            result,
            Err(TransitionError::OutOfOrder(_))
        ));
    }

    #[test]
    fn test_fatal_halts_from_any_active_phase() {
        let fatal = BuildInput::Fatal {
            reason: "Access Denied".to_string(),
        };
        for phase in [
            BuildPhase::Initializing,
            BuildPhase::Building {
                built: 2,
                skipped: 0,
            },
        ] {
            let (next, _) = phase.transition(&fatal).unwrap();
            assert_eq!(
                next,
                BuildPhase::Halted {
                    reason: "Access Denied".to_string()
                }
            );
        }
    }

    #[test]
    fn test_terminal_phases_reject_input() {
        let mut run = RecordedMachine::new(BuildPhase::Halted {
            reason: "x".to_string(),
        });
        assert_eq!(
            run.apply(BuildInput::Finish, Utc::now()).unwrap_err(),
            TransitionError::Terminal {
                phase: "Halted".to_string()
            }
        );
        assert!(run.history().is_empty());

        let completed = BuildPhase::Completed {
            built: 0,
            skipped: 0,
        };
        assert!(completed.transition(&built("late")).is_err());
    }

    #[test]
    fn test_history_records_each_phase_change() {
        let mut run = RecordedMachine::new(BuildPhase::Initializing);
        run.apply(BuildInput::Resolved, Utc::now()).unwrap();
        run.apply(built("backend"), Utc::now()).unwrap();

        let history = run.history();
        assert_eq!(history[0].from, BuildPhase::Initializing);
        assert_eq!(history[1].input, built("backend"));
        assert_eq!(
            history[1].to,
            BuildPhase::Building {
                built: 1,
                skipped: 0
            }
        );
        assert!(history[0].at <= history[1].at);
    }
}
