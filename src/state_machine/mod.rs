// Copyright (c) 2025 - Cowboy AI, Inc.
//! Builder Lifecycle State Machine
//!
//! A run moves through [`BuildPhase`]s as parts are built or skipped. Phase
//! changes are pure functions of `(phase, input)`; [`RecordedMachine`] keeps
//! the timestamped trail the build report counts.

pub mod build_lifecycle;

pub use build_lifecycle::{BuildInput, BuildPhase, PhaseOutput};

use chrono::{DateTime, Utc};

pub type TransitionResult<S> = Result<S, TransitionError>;

/// Input the current phase cannot accept
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Phase {phase} accepts no further input")]
    Terminal { phase: String },

    #[error("Out of order: {0}")]
    OutOfOrder(String),
}

/// Phases with typed inputs and per-transition output
pub trait StateMachine: Sized + Clone {
    type Input;
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Whether no input leads out of this phase
    fn is_terminal(&self) -> bool;
}

/// One applied input
#[derive(Debug, Clone)]
pub struct Transition<S, I> {
    pub from: S,
    pub to: S,
    pub input: I,
    pub at: DateTime<Utc>,
}

/// A machine plus every transition applied to it, oldest first
#[derive(Debug, Clone)]
pub struct RecordedMachine<M: StateMachine> {
    current: M,
    history: Vec<Transition<M, M::Input>>,
}

impl<M: StateMachine> RecordedMachine<M> {
    pub fn new(initial: M) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Apply `input`; a rejected input leaves phase and history untouched
    pub fn apply(&mut self, input: M::Input, at: DateTime<Utc>) -> TransitionResult<M::Output> {
        let (to, output) = self.current.transition(&input)?;
        let from = std::mem::replace(&mut self.current, to.clone());
        self.history.push(Transition { from, to, input, at });
        Ok(output)
    }

    pub fn current(&self) -> &M {
        &self.current
    }

    pub fn history(&self) -> &[Transition<M, M::Input>] {
        &self.history
    }
}
