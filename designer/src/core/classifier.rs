//! Deterministic mapping of terminal outcomes to report buckets.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::types::{FailureReason, OutcomeKind, TargetResult, TargetStatus};

/// Failure label for a ladder that ended on `last`.
///
/// - `OffTarget` means primers exist but are not template-specific.
/// - `NoPrimersFound` means the constraints could not be met.
/// - Anything else (including an unresolved transient error) is unknown.
pub fn failure_reason(last: OutcomeKind) -> FailureReason {
    match last {
        OutcomeKind::OffTarget => FailureReason::NoSpecificPrimers,
        OutcomeKind::NoPrimersFound => FailureReason::PrimerQualityTooLow,
        OutcomeKind::Success | OutcomeKind::NoIntrons | OutcomeKind::TransientError => {
            FailureReason::UnknownError
        }
    }
}

/// Terminal bucket for one target: its success tier or its failure label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bucket {
    Tier(String),
    Failed(FailureReason),
}

impl Bucket {
    pub fn of(result: &TargetResult) -> Self {
        match result.status {
            TargetStatus::Succeeded { .. } => {
                Bucket::Tier(result.status_label().to_string())
            }
            TargetStatus::Exhausted { reason } => Bucket::Failed(reason),
        }
    }

    /// Directory-safe name used by report writers.
    pub fn name(&self) -> String {
        match self {
            Bucket::Tier(tier) => tier.clone(),
            Bucket::Failed(reason) => format!("FAILED_{}", reason.label()),
        }
    }
}

/// Group results by terminal bucket. Each target lands in exactly one bucket.
pub fn partition<'a, I>(results: I) -> BTreeMap<Bucket, Vec<&'a TargetResult>>
where
    I: IntoIterator<Item = &'a TargetResult>,
{
    let mut buckets: BTreeMap<Bucket, Vec<&TargetResult>> = BTreeMap::new();
    for result in results {
        buckets.entry(Bucket::of(result)).or_default().push(result);
    }
    buckets
}

/// Counts per bucket for summaries and manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub exhausted: usize,
    pub by_bucket: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a TargetResult>,
    {
        let mut summary = BatchSummary::default();
        for result in results {
            summary.total += 1;
            if result.is_success() {
                summary.succeeded += 1;
            } else {
                summary.exhausted += 1;
            }
            *summary
                .by_bucket
                .entry(Bucket::of(result).name())
                .or_default() += 1;
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.exhausted == 0
    }
}
