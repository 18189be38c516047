//! Per-target ladder state machine.
//!
//! `Pending -> Attempting -> {Succeeded, Exhausted}`. The machine only decides;
//! submitting, polling and sleeping belong to the controller that drives it.

use crate::core::budget::RetryBudget;
use crate::core::classifier::failure_reason;
use crate::core::params::ParameterSet;
use crate::core::policy::{Branch, RelaxationPolicy, Step};
use crate::core::types::{FailureReason, Outcome, PrimerPair};

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerState {
    Pending,
    Attempting(Step),
    Succeeded {
        step: Step,
        primers: PrimerPair,
    },
    Exhausted {
        reason: FailureReason,
        /// Tier the ladder stopped at, if it started.
        last: Option<Step>,
    },
}

/// Decision taken after recording one outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Resubmit the same tier; `used` counts retries spent on it so far.
    Retry { used: u32 },
    /// Submit the next tier of the current branch.
    Advance,
    /// Switch to the intronless sub-ladder.
    Branch,
    Succeeded,
    Exhausted(FailureReason),
}

#[derive(Debug)]
pub struct Ladder<'a> {
    policy: &'a RelaxationPolicy,
    strict: ParameterSet,
    state: ControllerState,
    retries: RetryBudget,
    branched: bool,
}

impl<'a> Ladder<'a> {
    /// `strict` must already carry the target's sequence id.
    pub fn new(policy: &'a RelaxationPolicy, strict: ParameterSet, retry_limit: u32) -> Self {
        Self {
            policy,
            strict,
            state: ControllerState::Pending,
            retries: RetryBudget::new(retry_limit),
            branched: false,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Step awaiting submission, while attempting.
    pub fn current(&self) -> Option<&Step> {
        match &self.state {
            ControllerState::Attempting(step) => Some(step),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ControllerState::Succeeded { .. } | ControllerState::Exhausted { .. }
        )
    }

    /// `Pending -> Attempting` at the strict tier.
    pub fn start(&mut self) -> Result<&Step, String> {
        if self.state != ControllerState::Pending {
            return Err("ladder already started".to_string());
        }
        self.state = ControllerState::Attempting(self.policy.first(&self.strict));
        self.current()
            .ok_or_else(|| "ladder did not enter attempting state".to_string())
    }

    /// Apply the outcome of the current step's attempt.
    pub fn record(&mut self, outcome: &Outcome) -> Result<Transition, String> {
        let step = match &self.state {
            ControllerState::Attempting(step) => step.clone(),
            other => return Err(format!("cannot record outcome in state {other:?}")),
        };

        let transition = match outcome {
            Outcome::Success(primers) => {
                self.state = ControllerState::Succeeded {
                    step,
                    primers: primers.clone(),
                };
                Transition::Succeeded
            }
            Outcome::TransientError { .. } => {
                if self.retries.try_consume() {
                    Transition::Retry {
                        used: self.retries.used(),
                    }
                } else {
                    let reason = FailureReason::UnknownError;
                    self.state = ControllerState::Exhausted {
                        reason,
                        last: Some(step),
                    };
                    Transition::Exhausted(reason)
                }
            }
            Outcome::NoIntrons if step.branch == Branch::Main && !self.branched => {
                self.branched = true;
                self.retries.reset();
                self.state =
                    ControllerState::Attempting(self.policy.branch_intronless(&self.strict));
                Transition::Branch
            }
            other => match self.policy.advance(&step, &self.strict) {
                Some(next) => {
                    self.retries.reset();
                    self.state = ControllerState::Attempting(next);
                    Transition::Advance
                }
                None => {
                    let reason = failure_reason(other.kind());
                    self.state = ControllerState::Exhausted {
                        reason,
                        last: Some(step),
                    };
                    Transition::Exhausted(reason)
                }
            },
        };
        Ok(transition)
    }

    /// Stop before the next submission. No-op once terminal.
    pub fn abort(&mut self) {
        if self.is_terminal() {
            return;
        }
        let last = match std::mem::replace(&mut self.state, ControllerState::Pending) {
            ControllerState::Attempting(step) => Some(step),
            _ => None,
        };
        self.state = ControllerState::Exhausted {
            reason: FailureReason::Aborted,
            last,
        };
    }
}
