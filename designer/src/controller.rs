//! Drives one target through the relaxation ladder.
//!
//! Each attempt is one submit/poll cycle against a [`DesignBackend`]. Backend
//! errors never escape: they become `TransientError` outcomes so the ladder's
//! retry budget decides what happens next.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::budget::remaining_budget;
use crate::core::params::ParameterSet;
use crate::core::policy::{RelaxationPolicy, Step};
use crate::core::state::{ControllerState, Ladder, Transition};
use crate::core::types::{
    Attempt, FailureReason, Outcome, OutcomeKind, RawResult, Target, TargetResult, TargetStatus,
};
use crate::io::backend::{DesignBackend, PollStatus};

/// Timing and retry knobs for one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Minimum delay between two polls of the same job.
    pub poll_interval: Duration,
    /// Polling deadline per job.
    pub job_timeout: Duration,
    pub transient_retry_limit: u32,
    /// Wait before resubmitting a tier after a transient failure.
    pub transient_backoff: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            job_timeout: Duration::from_secs(60 * 60),
            transient_retry_limit: 3,
            transient_backoff: Duration::from_secs(60),
        }
    }
}

/// Shared stop request, checked before every submission.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct AttemptController<'a, B: DesignBackend> {
    backend: &'a B,
    policy: &'a RelaxationPolicy,
    strict: &'a ParameterSet,
    settings: ControllerSettings,
    abort: AbortFlag,
}

impl<'a, B: DesignBackend> AttemptController<'a, B> {
    pub fn new(
        backend: &'a B,
        policy: &'a RelaxationPolicy,
        strict: &'a ParameterSet,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            backend,
            policy,
            strict,
            settings,
            abort: AbortFlag::new(),
        }
    }

    pub fn with_abort(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    /// Run the ladder for `target` until success, exhaustion or abort.
    #[instrument(skip_all, fields(target_id = %target.target_id, sequence_id = %target.sequence_id))]
    pub fn run(&self, target: &Target) -> TargetResult {
        let strict = self.strict.with_sequence(&target.sequence_id);
        let mut ladder = Ladder::new(self.policy, strict, self.settings.transient_retry_limit);
        let mut attempts = Vec::new();
        let mut page = None;

        if let Err(err) = ladder.start() {
            warn!(error = %err, "ladder failed to start");
            return TargetResult::unattempted(target.clone(), FailureReason::UnknownError);
        }

        while let Some(step) = ladder.current().cloned() {
            if self.abort.is_aborted() {
                info!(tier = %step.label, "aborted before submission");
                ladder.abort();
                break;
            }

            let (outcome, raw) = self.attempt(target, &step);
            page = raw;
            attempts.push(Attempt {
                tier: step.label.clone(),
                parameters: step.parameters.clone(),
                outcome: outcome.clone(),
            });

            match ladder.record(&outcome) {
                Ok(Transition::Retry { used }) => {
                    warn!(
                        tier = %step.label,
                        retry = used,
                        limit = self.settings.transient_retry_limit,
                        outcome = ?outcome,
                        "transient failure; retrying tier"
                    );
                    thread::sleep(self.settings.transient_backoff);
                }
                Ok(Transition::Advance | Transition::Branch) => {
                    info!(
                        from = %step.label,
                        to = ladder.current().map(|next| next.label.as_str()).unwrap_or_default(),
                        outcome = %outcome.kind(),
                        "relaxing constraints"
                    );
                }
                Ok(Transition::Succeeded) => {
                    info!(tier = %step.label, "primers found");
                }
                Ok(Transition::Exhausted(reason)) => {
                    warn!(tier = %step.label, reason = %reason, "ladder exhausted");
                }
                Err(err) => {
                    warn!(error = %err, "ladder rejected outcome");
                    break;
                }
            }
        }

        let status = match ladder.state() {
            ControllerState::Succeeded { step, primers } => TargetStatus::Succeeded {
                primers: primers.clone(),
                low_confidence: step.low_confidence,
            },
            ControllerState::Exhausted { reason, .. } => TargetStatus::Exhausted { reason: *reason },
            ControllerState::Pending | ControllerState::Attempting(_) => TargetStatus::Exhausted {
                reason: FailureReason::UnknownError,
            },
        };
        TargetResult {
            target: target.clone(),
            tier: attempts.last().map(|attempt: &Attempt| attempt.tier.clone()),
            status,
            attempts,
            page,
        }
    }

    /// One submit/poll/classify cycle. Always yields an outcome.
    fn attempt(&self, target: &Target, step: &Step) -> (Outcome, Option<RawResult>) {
        let raw = match self.resolve(target, step) {
            Ok(raw) => raw,
            Err(err) => return (Outcome::transient(format!("{err:#}")), None),
        };
        let outcome = match self.backend.classify(&raw) {
            OutcomeKind::Success => match self.backend.parse_primers(&raw) {
                Ok(primers) => Outcome::Success(primers),
                Err(err) => Outcome::transient(format!("parse primers: {err:#}")),
            },
            OutcomeKind::NoIntrons => Outcome::NoIntrons,
            OutcomeKind::OffTarget => Outcome::OffTarget,
            OutcomeKind::NoPrimersFound => Outcome::NoPrimersFound,
            OutcomeKind::TransientError => Outcome::transient("result page could not be classified"),
        };
        (outcome, Some(raw))
    }

    /// Submit `step` and poll until the job finishes or its deadline passes.
    fn resolve(&self, target: &Target, step: &Step) -> Result<RawResult> {
        let mut job = self
            .backend
            .submit(&target.sequence_id, &step.parameters)
            .with_context(|| format!("submit tier {}", step.label))?;
        debug!(tier = %step.label, job_key = %job.key, "submitted");

        let deadline = Instant::now() + self.settings.job_timeout;
        let mut polls = 0u32;
        loop {
            polls += 1;
            match self
                .backend
                .poll(&job)
                .with_context(|| format!("poll job {}", job.key))?
            {
                PollStatus::Finished(raw) => {
                    debug!(job_key = %job.key, polls, "job finished");
                    return Ok(raw);
                }
                PollStatus::Redirected(next) => {
                    debug!(from = %job.key, to = %next.key, "job resubmitted by backend");
                    job = next;
                }
                PollStatus::Running => {}
            }
            let remaining = remaining_budget(deadline)
                .with_context(|| format!("job {} after {polls} polls", job.key))?;
            // The next poll may not come sooner than `poll_interval`.
            if remaining < self.settings.poll_interval {
                bail!(
                    "job polling timed out: job {} after {polls} polls, {}ms left is under the poll interval",
                    job.key,
                    remaining.as_millis()
                );
            }
            thread::sleep(self.settings.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::SPAN_INTRON;
    use crate::test_support::{
        ScriptedBackend, ScriptedJob, fast_settings, primer_pair, strict_params, target,
    };

    fn tiers(result: &TargetResult) -> Vec<&str> {
        result
            .attempts
            .iter()
            .map(|attempt| attempt.tier.as_str())
            .collect()
    }

    #[test]
    fn polls_until_finished() {
        let backend = ScriptedBackend::new().script(
            "NM_1",
            vec![ScriptedJob::Resolve {
                outcome: Outcome::Success(primer_pair()),
                running_polls: 2,
            }],
        );
        let policy = RelaxationPolicy::standard();
        let strict = strict_params();
        let controller = AttemptController::new(&backend, &policy, &strict, fast_settings());

        let result = controller.run(&target("LOC_A", "NM_1"));

        assert!(result.is_success());
        assert_eq!(result.tier.as_deref(), Some("strict"));
        assert_eq!(backend.poll_count(), 3);
        assert!(result.page.is_some());
    }

    #[test]
    fn submissions_carry_sequence_and_tier_parameters() {
        let backend = ScriptedBackend::new().script(
            "NM_1",
            vec![
                ScriptedJob::from(Outcome::NoIntrons),
                ScriptedJob::from(Outcome::Success(primer_pair())),
            ],
        );
        let policy = RelaxationPolicy::standard();
        let strict = strict_params();
        let controller = AttemptController::new(&backend, &policy, &strict, fast_settings());

        let result = controller.run(&target("LOC_A", "NM_1"));

        assert_eq!(tiers(&result), vec!["strict", "intronless_strict"]);
        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 2);
        assert!(
            submissions
                .iter()
                .all(|s| s.parameters.sequence_id() == Some("NM_1"))
        );
        assert!(submissions[0].parameters.contains(SPAN_INTRON));
        assert!(!submissions[1].parameters.contains(SPAN_INTRON));
    }

    #[test]
    fn redirected_job_is_followed() {
        let backend = ScriptedBackend::new().script(
            "NM_1",
            vec![ScriptedJob::Redirect {
                outcome: Outcome::Success(primer_pair()),
            }],
        );
        let policy = RelaxationPolicy::standard();
        let strict = strict_params();
        let controller = AttemptController::new(&backend, &policy, &strict, fast_settings());

        let result = controller.run(&target("LOC_A", "NM_1"));

        assert!(result.is_success());
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(backend.poll_count(), 2);
    }

    #[test]
    fn backend_errors_become_transient_retries() {
        let backend = ScriptedBackend::new().script(
            "NM_1",
            vec![
                ScriptedJob::FailSubmit("connection reset".to_string()),
                ScriptedJob::FailPoll("lost job key".to_string()),
                ScriptedJob::from(Outcome::OffTarget),
                ScriptedJob::from(Outcome::Success(primer_pair())),
            ],
        );
        let policy = RelaxationPolicy::standard();
        let strict = strict_params();
        let controller = AttemptController::new(&backend, &policy, &strict, fast_settings());

        let result = controller.run(&target("LOC_A", "NM_1"));

        assert_eq!(tiers(&result), vec!["strict", "strict", "strict", "GC1"]);
        assert_eq!(result.status_label(), "GC1");
        match &result.attempts[0].outcome {
            Outcome::TransientError { reason } => assert!(reason.contains("connection reset")),
            other => panic!("unexpected outcome {other:?}"),
        }
        match &result.attempts[1].outcome {
            Outcome::TransientError { reason } => assert!(reason.contains("lost job key")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn unparseable_success_page_is_transient() {
        let backend = ScriptedBackend::new().script(
            "NM_1",
            vec![
                ScriptedJob::Unparseable,
                ScriptedJob::from(Outcome::Success(primer_pair())),
            ],
        );
        let policy = RelaxationPolicy::standard();
        let strict = strict_params();
        let controller = AttemptController::new(&backend, &policy, &strict, fast_settings());

        let result = controller.run(&target("LOC_A", "NM_1"));

        assert_eq!(tiers(&result), vec!["strict", "strict"]);
        assert!(result.is_success());
        assert_eq!(
            result.attempts[0].outcome.kind(),
            OutcomeKind::TransientError
        );
    }

    #[test]
    fn job_timeout_is_transient_and_escalates() {
        let backend = ScriptedBackend::new().script(
            "NM_1",
            vec![ScriptedJob::Resolve {
                outcome: Outcome::Success(primer_pair()),
                running_polls: 10,
            }],
        );
        let policy = RelaxationPolicy::standard();
        let strict = strict_params();
        let settings = ControllerSettings {
            job_timeout: Duration::ZERO,
            transient_retry_limit: 0,
            ..fast_settings()
        };
        let controller = AttemptController::new(&backend, &policy, &strict, settings);

        let result = controller.run(&target("LOC_A", "NM_1"));

        assert_eq!(result.failure_reason(), Some(FailureReason::UnknownError));
        match result.final_outcome() {
            Some(Outcome::TransientError { reason }) => assert!(reason.contains("timed out")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn polls_are_spaced_until_the_deadline() {
        let backend = ScriptedBackend::new().script(
            "NM_1",
            vec![ScriptedJob::Resolve {
                outcome: Outcome::Success(primer_pair()),
                running_polls: 100,
            }],
        );
        let policy = RelaxationPolicy::standard();
        let strict = strict_params();
        let settings = ControllerSettings {
            poll_interval: Duration::from_millis(50),
            job_timeout: Duration::from_millis(175),
            transient_retry_limit: 0,
            ..fast_settings()
        };
        let controller = AttemptController::new(&backend, &policy, &strict, settings);

        let result = controller.run(&target("LOC_A", "NM_1"));

        let times = backend.poll_times();
        assert!(times.len() >= 2);
        assert!(
            times
                .windows(2)
                .all(|pair| pair[1] - pair[0] >= settings.poll_interval)
        );
        match result.final_outcome() {
            Some(Outcome::TransientError { reason }) => assert!(reason.contains("timed out")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn abort_stops_before_next_submission() {
        let backend = ScriptedBackend::new().script("NM_1", vec![ScriptedJob::from(Outcome::OffTarget)]);
        let policy = RelaxationPolicy::standard();
        let strict = strict_params();
        let abort = AbortFlag::new();
        let controller =
            AttemptController::new(&backend, &policy, &strict, fast_settings()).with_abort(abort.clone());

        abort.abort();
        let result = controller.run(&target("LOC_A", "NM_1"));

        assert_eq!(result.failure_reason(), Some(FailureReason::Aborted));
        assert!(result.attempts.is_empty());
        assert!(backend.submissions().is_empty());
    }

    #[test]
    fn low_confidence_tier_is_flagged() {
        let mut jobs: Vec<ScriptedJob> = (0..6).map(|_| ScriptedJob::from(Outcome::OffTarget)).collect();
        jobs.push(ScriptedJob::from(Outcome::Success(primer_pair())));
        let backend = ScriptedBackend::new().script("NM_1", jobs);
        let policy = RelaxationPolicy::standard();
        let strict = strict_params();
        let controller = AttemptController::new(&backend, &policy, &strict, fast_settings());

        let result = controller.run(&target("LOC_A", "NM_1"));

        assert_eq!(result.tier.as_deref(), Some("Probable_Dimers"));
        assert!(matches!(
            result.status,
            TargetStatus::Succeeded {
                low_confidence: true,
                ..
            }
        ));
    }
}
