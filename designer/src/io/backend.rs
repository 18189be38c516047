//! Design backend abstraction.
//!
//! The [`DesignBackend`] trait decouples the ladder controller from the remote
//! design service (currently NCBI Primer-BLAST). Tests use scripted backends
//! that return predetermined outcomes without touching the network.

use anyhow::Result;

use crate::core::params::ParameterSet;
use crate::core::types::{OutcomeKind, PrimerPair, RawResult};

/// Backend-assigned identifier for one submitted design job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub key: String,
    /// Parameters the job was submitted with, as sent.
    pub parameters: ParameterSet,
}

impl JobHandle {
    pub fn new(key: impl Into<String>, parameters: ParameterSet) -> Self {
        Self {
            key: key.into(),
            parameters,
        }
    }
}

/// State of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Running,
    /// The backend resubmitted the job under a new handle; keep polling that one.
    Redirected(JobHandle),
    Finished(RawResult),
}

/// Abstraction over primer design services.
///
/// Classification must be deterministic: the same [`RawResult`] always yields
/// the same [`OutcomeKind`].
pub trait DesignBackend: Sync {
    /// Submit one design request for `sequence_id` with `parameters`.
    fn submit(&self, sequence_id: &str, parameters: &ParameterSet) -> Result<JobHandle>;

    /// Check a submitted job once. Callers own the inter-poll spacing.
    fn poll(&self, job: &JobHandle) -> Result<PollStatus>;

    fn classify(&self, raw: &RawResult) -> OutcomeKind;

    /// Extract the best primer pair. Only called for `Success` pages.
    fn parse_primers(&self, raw: &RawResult) -> Result<PrimerPair>;
}
