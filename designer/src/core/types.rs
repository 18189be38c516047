//! Shared deterministic types for the primer design core.
//!
//! These are plain data: the controller produces them, the batch coordinator
//! collects them and report writers consume them. None of them perform I/O.

use serde::{Deserialize, Serialize};

use crate::core::params::ParameterSet;

/// One gene to design primers for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Stable external key (e.g. a locus id from the input list).
    pub target_id: String,
    /// Identifier submitted to the backend as the template.
    pub sequence_id: String,
}

impl Target {
    pub fn new(target_id: impl Into<String>, sequence_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            sequence_id: sequence_id.into(),
        }
    }
}

/// Best primer pair reported for a successful attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimerPair {
    pub forward: String,
    pub forward_tm: f64,
    pub reverse: String,
    pub reverse_tm: f64,
    pub product_size: u32,
    /// Total intron size spanned by the product, when the template has introns.
    pub intron_size: Option<u32>,
}

/// Classification tag of one resolved attempt, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    NoIntrons,
    OffTarget,
    NoPrimersFound,
    TransientError,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::NoIntrons => "no_introns",
            OutcomeKind::OffTarget => "off_target",
            OutcomeKind::NoPrimersFound => "no_primers_found",
            OutcomeKind::TransientError => "transient_error",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified result of one submit/resolve cycle. Exactly one tag per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Success(PrimerPair),
    NoIntrons,
    OffTarget,
    NoPrimersFound,
    /// The backend could not produce a definitive classification.
    TransientError { reason: String },
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success(_) => OutcomeKind::Success,
            Outcome::NoIntrons => OutcomeKind::NoIntrons,
            Outcome::OffTarget => OutcomeKind::OffTarget,
            Outcome::NoPrimersFound => OutcomeKind::NoPrimersFound,
            Outcome::TransientError { .. } => OutcomeKind::TransientError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Outcome::TransientError {
            reason: reason.into(),
        }
    }
}

/// Raw page returned by the backend once a job is no longer running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResult {
    pub body: String,
}

impl RawResult {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// One submit/resolve cycle for a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub tier: String,
    pub parameters: ParameterSet,
    pub outcome: Outcome,
}

/// Why a target left the ladder without primers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoSpecificPrimers,
    PrimerQualityTooLow,
    UnknownError,
    /// The batch was aborted before this target succeeded.
    Aborted,
}

impl FailureReason {
    pub fn label(self) -> &'static str {
        match self {
            FailureReason::NoSpecificPrimers => "no_specific_primers",
            FailureReason::PrimerQualityTooLow => "primer_quality_too_low",
            FailureReason::UnknownError => "unknown_error",
            FailureReason::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal state of a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TargetStatus {
    Succeeded {
        primers: PrimerPair,
        /// Produced by a tier flagged as lower confidence.
        low_confidence: bool,
    },
    Exhausted {
        reason: FailureReason,
    },
}

/// Frozen per-target record handed to report writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    pub target: Target,
    /// Label of the last tier attempted (the succeeding tier on success).
    pub tier: Option<String>,
    pub status: TargetStatus,
    /// Every attempt in submission order, same-tier retries included.
    pub attempts: Vec<Attempt>,
    /// Result page of the final attempt, kept for detail reports.
    #[serde(skip)]
    pub page: Option<RawResult>,
}

impl TargetResult {
    /// Result for a target that never produced an attempt.
    pub fn unattempted(target: Target, reason: FailureReason) -> Self {
        Self {
            target,
            tier: None,
            status: TargetStatus::Exhausted { reason },
            attempts: Vec::new(),
            page: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, TargetStatus::Succeeded { .. })
    }

    pub fn primers(&self) -> Option<&PrimerPair> {
        match &self.status {
            TargetStatus::Succeeded { primers, .. } => Some(primers),
            TargetStatus::Exhausted { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self.status {
            TargetStatus::Succeeded { .. } => None,
            TargetStatus::Exhausted { reason } => Some(reason),
        }
    }

    /// Tier label on success, failure label otherwise.
    pub fn status_label(&self) -> &str {
        match (&self.status, &self.tier) {
            (TargetStatus::Succeeded { .. }, Some(tier)) => tier,
            (TargetStatus::Succeeded { .. }, None) => "success",
            (TargetStatus::Exhausted { reason }, _) => reason.label(),
        }
    }

    pub fn final_outcome(&self) -> Option<&Outcome> {
        self.attempts.last().map(|attempt| &attempt.outcome)
    }
}
