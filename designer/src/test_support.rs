//! Test-only helpers: fixtures and a scripted design backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};

use crate::controller::ControllerSettings;
use crate::core::params::{
    GC_CLAMP, LOW_COMPLEXITY_FILTER, PRIMER_MAX_GC, PRIMER_MIN_GC, PRIMER_MIN_TM, ParameterSet,
    SELF_ANY, SELF_END, SPAN_INTRON,
};
use crate::core::types::{Outcome, OutcomeKind, PrimerPair, RawResult, Target};
use crate::io::backend::{DesignBackend, JobHandle, PollStatus};

/// Body of a result page that classifies as success but has no primer table.
const UNPARSEABLE_PAGE: &str = "<html>primer table missing</html>";

/// Strict parameters covering every key the ladder touches.
pub fn strict_params() -> ParameterSet {
    [
        (GC_CLAMP, "2"),
        (PRIMER_MIN_GC, "45"),
        (PRIMER_MAX_GC, "55"),
        (PRIMER_MIN_TM, "55"),
        (SELF_ANY, "3"),
        (SELF_END, "1"),
        (SPAN_INTRON, "on"),
        (LOW_COMPLEXITY_FILTER, "on"),
        ("PRIMER_PRODUCT_MIN", "75"),
        ("PRIMER_PRODUCT_MAX", "180"),
    ]
    .into_iter()
    .collect()
}

pub fn target(target_id: &str, sequence_id: &str) -> Target {
    Target::new(target_id, sequence_id)
}

pub fn primer_pair() -> PrimerPair {
    PrimerPair {
        forward: "GATCGGCTACGAGAAGGTGA".to_string(),
        forward_tm: 60.04,
        reverse: "TTGCGGTAGTCGATCTTGGT".to_string(),
        reverse_tm: 59.97,
        product_size: 120,
        intron_size: Some(412),
    }
}

/// Settings with no waiting, so ladders run at test speed.
pub fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        poll_interval: Duration::ZERO,
        job_timeout: Duration::from_secs(60),
        transient_retry_limit: 2,
        transient_backoff: Duration::ZERO,
    }
}

/// Temporary output directory that is removed on drop.
pub fn scratch_dir() -> Result<tempfile::TempDir> {
    tempfile::tempdir().context("create scratch dir")
}

/// What the backend does for one submission of a sequence.
#[derive(Debug, Clone)]
pub enum ScriptedJob {
    /// Report `running_polls` running polls, then finish with `outcome`.
    Resolve { outcome: Outcome, running_polls: u32 },
    /// First poll resubmits under a new job key; that job finishes with `outcome`.
    Redirect { outcome: Outcome },
    FailSubmit(String),
    FailPoll(String),
    /// Finishes with a success-looking page whose primers cannot be parsed.
    Unparseable,
    /// `submit` panics with this message.
    Panic(String),
}

impl From<Outcome> for ScriptedJob {
    fn from(outcome: Outcome) -> Self {
        ScriptedJob::Resolve {
            outcome,
            running_polls: 0,
        }
    }
}

/// One recorded `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub sequence_id: String,
    pub parameters: ParameterSet,
}

#[derive(Debug)]
enum LiveJob {
    Pending { running_polls: u32, body: String },
    Redirect(Outcome),
    FailPoll(String),
}

#[derive(Debug, Default)]
struct ScriptState {
    queues: HashMap<String, VecDeque<ScriptedJob>>,
    jobs: HashMap<String, LiveJob>,
    submissions: Vec<Submission>,
    poll_times: Vec<Instant>,
    next_key: usize,
    in_flight: usize,
    max_in_flight: usize,
}

impl ScriptState {
    fn open(&mut self, job: LiveJob, parameters: ParameterSet) -> JobHandle {
        self.next_key += 1;
        let key = format!("JOB{:04}", self.next_key);
        self.jobs.insert(key.clone(), job);
        self.in_flight += 1;
        self.max_in_flight = self.max_in_flight.max(self.in_flight);
        JobHandle::new(key, parameters)
    }

    fn close(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

/// Backend returning queued outcomes per sequence id. Records every submission.
///
/// Result pages carry the scripted [`Outcome`] as JSON, so `classify` and
/// `parse_primers` recover exactly what was queued.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    state: Mutex<ScriptState>,
    poll_delay: Duration,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `jobs` for successive submissions of `sequence_id`.
    pub fn script(self, sequence_id: &str, jobs: Vec<ScriptedJob>) -> Self {
        self.lock()
            .queues
            .entry(sequence_id.to_string())
            .or_default()
            .extend(jobs);
        self
    }

    /// Sleep inside every poll, to make concurrent jobs overlap.
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    pub fn submissions_for(&self, sequence_id: &str) -> Vec<Submission> {
        self.lock()
            .submissions
            .iter()
            .filter(|submission| submission.sequence_id == sequence_id)
            .cloned()
            .collect()
    }

    pub fn poll_count(&self) -> usize {
        self.lock().poll_times.len()
    }

    /// When each poll arrived, in order.
    pub fn poll_times(&self) -> Vec<Instant> {
        self.lock().poll_times.clone()
    }

    /// Highest number of jobs that were open at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn page(outcome: &Outcome) -> String {
    serde_json::to_string(outcome).unwrap_or_default()
}

impl DesignBackend for ScriptedBackend {
    fn submit(&self, sequence_id: &str, parameters: &ParameterSet) -> Result<JobHandle> {
        let parameters = parameters.with_sequence(sequence_id);
        let mut state = self.lock();
        state.submissions.push(Submission {
            sequence_id: sequence_id.to_string(),
            parameters: parameters.clone(),
        });
        let next = state
            .queues
            .get_mut(sequence_id)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| anyhow!("no scripted job left for {sequence_id}"))?;
        let job = match next {
            ScriptedJob::Resolve {
                outcome,
                running_polls,
            } => LiveJob::Pending {
                running_polls,
                body: page(&outcome),
            },
            ScriptedJob::Redirect { outcome } => LiveJob::Redirect(outcome),
            ScriptedJob::FailSubmit(message) => return Err(anyhow!(message)),
            ScriptedJob::Panic(message) => {
                drop(state);
                panic!("{message}");
            }
            ScriptedJob::FailPoll(message) => LiveJob::FailPoll(message),
            ScriptedJob::Unparseable => LiveJob::Pending {
                running_polls: 0,
                body: UNPARSEABLE_PAGE.to_string(),
            },
        };
        Ok(state.open(job, parameters))
    }

    fn poll(&self, job: &JobHandle) -> Result<PollStatus> {
        if !self.poll_delay.is_zero() {
            thread::sleep(self.poll_delay);
        }
        let mut state = self.lock();
        state.poll_times.push(Instant::now());
        let live = state
            .jobs
            .remove(&job.key)
            .ok_or_else(|| anyhow!("unknown job key {}", job.key))?;
        match live {
            LiveJob::Pending {
                running_polls,
                body,
            } if running_polls > 0 => {
                state.jobs.insert(
                    job.key.clone(),
                    LiveJob::Pending {
                        running_polls: running_polls - 1,
                        body,
                    },
                );
                Ok(PollStatus::Running)
            }
            LiveJob::Pending { body, .. } => {
                state.close();
                Ok(PollStatus::Finished(RawResult::new(body)))
            }
            LiveJob::Redirect(outcome) => {
                state.close();
                let next = state.open(
                    LiveJob::Pending {
                        running_polls: 0,
                        body: page(&outcome),
                    },
                    job.parameters.clone(),
                );
                Ok(PollStatus::Redirected(next))
            }
            LiveJob::FailPoll(message) => {
                state.close();
                Err(anyhow!(message))
            }
        }
    }

    fn classify(&self, raw: &RawResult) -> OutcomeKind {
        if raw.body == UNPARSEABLE_PAGE {
            return OutcomeKind::Success;
        }
        serde_json::from_str::<Outcome>(&raw.body)
            .map(|outcome| outcome.kind())
            .unwrap_or(OutcomeKind::TransientError)
    }

    fn parse_primers(&self, raw: &RawResult) -> Result<PrimerPair> {
        match serde_json::from_str::<Outcome>(&raw.body) {
            Ok(Outcome::Success(primers)) => Ok(primers),
            _ => Err(anyhow!("no primer table in result page")),
        }
    }
}
