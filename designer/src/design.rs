//! `designer run` and `designer ladder` orchestration.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::batch::BatchCoordinator;
use crate::controller::{AbortFlag, AttemptController};
use crate::core::classifier::BatchSummary;
use crate::core::policy::Branch;
use crate::core::types::TargetResult;
use crate::io::backend::DesignBackend;
use crate::io::config::DesignerConfig;
use crate::io::report::{ReportPaths, ReportRequest, write_reports};
use crate::io::targets::load_targets;

/// Inputs for one design run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Target list (CSV or one sequence id per line).
    pub input: PathBuf,
    pub output_dir: PathBuf,
}

/// Outcome of a design run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub summary: BatchSummary,
    pub missing: usize,
    pub duplicates: usize,
    pub reports: ReportPaths,
}

/// Load targets, run every ladder against `backend`, write reports.
///
/// `on_result` is called once per finished target.
#[instrument(skip_all, fields(input = %options.input.display(), output_dir = %options.output_dir.display()))]
pub fn run_design<B, F>(
    options: &RunOptions,
    cfg: &DesignerConfig,
    backend: &B,
    abort: AbortFlag,
    on_result: F,
) -> Result<RunSummary>
where
    B: DesignBackend,
    F: FnMut(&TargetResult),
{
    cfg.validate()?;
    let list = load_targets(&options.input).context("load targets")?;
    if !list.missing.is_empty() {
        warn!(count = list.missing.len(), "targets without a sequence id");
    }
    if !list.duplicates.is_empty() {
        warn!(count = list.duplicates.len(), "duplicate target ids ignored");
    }
    info!(targets = list.targets.len(), "starting design run");

    let policy = cfg.policy();
    let controller =
        AttemptController::new(backend, &policy, &cfg.parameters, cfg.controller_settings())
            .with_abort(abort);
    let batch = BatchCoordinator::new(controller, cfg.max_concurrency);

    let started_at = Utc::now();
    let results = batch.run(&list.targets, on_result);
    let finished_at = Utc::now();

    let reports = write_reports(&ReportRequest {
        output_dir: &options.output_dir,
        results: &results,
        missing: &list.missing,
        parameters: &cfg.parameters,
        form_url: &cfg.form_url,
        started_at,
        finished_at,
    })
    .context("write reports")?;

    Ok(RunSummary {
        summary: BatchSummary::from_results(results.values()),
        missing: list.missing.len(),
        duplicates: list.duplicates.len(),
        reports,
    })
}

/// Human-readable listing of both ladders: each tier with the keys it changes
/// relative to the strict parameters.
pub fn describe_ladders(cfg: &DesignerConfig) -> String {
    let policy = cfg.policy();
    let mut out = String::new();
    for (title, branch) in [("main", Branch::Main), ("intronless", Branch::Intronless)] {
        let _ = writeln!(out, "{title} ladder ({:?} tiers):", cfg.tier_base);
        for (index, step) in policy
            .materialize(branch, &cfg.parameters)
            .iter()
            .enumerate()
        {
            let flag = if step.low_confidence {
                " [low confidence]"
            } else {
                ""
            };
            let _ = writeln!(out, "  {}. {}{flag}", index + 1, step.label);
            for change in cfg.parameters.diff(&step.parameters) {
                let _ = writeln!(out, "       {change}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::core::types::Outcome;
    use crate::test_support::{ScriptedBackend, ScriptedJob, primer_pair, scratch_dir};

    fn test_config() -> DesignerConfig {
        DesignerConfig {
            poll_interval_secs: 1,
            transient_backoff_secs: 0,
            max_concurrency: 2,
            ..DesignerConfig::default()
        }
    }

    #[test]
    fn run_design_writes_reports_and_counts() {
        let dir = scratch_dir().expect("scratch");
        let input = dir.path().join("targets.csv");
        fs::write(&input, "target_id,sequence_id\nLOC_A,NM_1\nLOC_B,NM_2\nLOC_C,\nLOC_A,NM_3\n")
            .expect("write targets");
        let backend = ScriptedBackend::new()
            .script("NM_1", vec![ScriptedJob::from(Outcome::Success(primer_pair()))])
            .script(
                "NM_2",
                (0..8).map(|_| ScriptedJob::from(Outcome::NoPrimersFound)).collect(),
            );
        let options = RunOptions {
            input,
            output_dir: dir.path().join("out"),
        };

        let mut finished = 0;
        let summary = run_design(&options, &test_config(), &backend, AbortFlag::new(), |_| {
            finished += 1;
        })
        .expect("run");

        assert_eq!(finished, 2);
        assert_eq!(summary.summary.total, 2);
        assert_eq!(summary.summary.succeeded, 1);
        assert_eq!(summary.summary.by_bucket["FAILED_primer_quality_too_low"], 1);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.duplicates, 1);
        assert!(summary.reports.summary.exists());
        assert!(dir.path().join("out/strict/LOC_A.html").exists());
        assert!(dir.path().join("out/FAILED_primer_quality_too_low/links.html").exists());
    }

    #[test]
    fn run_design_fails_on_missing_input() {
        let dir = scratch_dir().expect("scratch");
        let options = RunOptions {
            input: dir.path().join("absent.csv"),
            output_dir: dir.path().join("out"),
        };
        let err = run_design(
            &options,
            &test_config(),
            &ScriptedBackend::new(),
            AbortFlag::new(),
            |_| {},
        )
        .expect_err("missing input");
        assert!(format!("{err:#}").contains("load targets"));
    }

    #[test]
    fn describe_ladders_lists_tiers_and_changes() {
        let text = describe_ladders(&DesignerConfig::default());
        assert!(text.contains("main ladder"));
        assert!(text.contains("8. No_repeat_filter"));
        assert!(text.contains("LOW_COMPLEXITY_FILTER: on -> (removed)"));
        assert!(text.contains("intronless ladder"));
        assert!(text.contains("1. intronless_strict"));
        assert!(text.contains("SPAN_INTRON: on -> (removed)"));
        assert!(text.contains("Probable_Dimers [low confidence]"));
    }
}
