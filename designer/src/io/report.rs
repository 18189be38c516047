//! Report files for a finished batch.
//!
//! Layout under the output directory:
//! - `primerSummary.csv`: one row per target;
//! - `<tier>/<target>.html`: result page of each success, stylesheets absolutized;
//! - `FAILED_<reason>/links.html`: prefilled Primer-BLAST links for manual follow-up;
//! - `missing.csv`: targets that had no sequence id;
//! - `results.json`: run manifest with every attempt.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::classifier::{BatchSummary, Bucket, partition};
use crate::core::params::{ParameterSet, SPAN_INTRON};
use crate::core::types::{TargetResult, TargetStatus};

pub const SUMMARY_FILE: &str = "primerSummary.csv";
pub const MANIFEST_FILE: &str = "results.json";
pub const MISSING_FILE: &str = "missing.csv";
pub const LINKS_FILE: &str = "links.html";

static STYLESHEET_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="([^"]*\.css[^"]*)""#).unwrap());

/// Input for writing the reports of one run.
#[derive(Debug)]
pub struct ReportRequest<'a> {
    pub output_dir: &'a Path,
    pub results: &'a BTreeMap<String, TargetResult>,
    pub missing: &'a [String],
    /// Strict parameters, used to prefill follow-up links.
    pub parameters: &'a ParameterSet,
    pub form_url: &'a str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportPaths {
    pub summary: PathBuf,
    pub manifest: PathBuf,
    pub missing: Option<PathBuf>,
    pub detail_pages: Vec<PathBuf>,
    pub link_pages: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    target_id: &'a str,
    sequence_id: &'a str,
    status: &'a str,
    forward: Option<&'a str>,
    forward_tm: Option<f64>,
    reverse: Option<&'a str>,
    reverse_tm: Option<f64>,
    product_size: Option<u32>,
    intron_size: Option<u32>,
}

/// Persisted to `results.json`.
#[derive(Debug, Serialize)]
struct RunManifest<'a> {
    start_time: String,
    end_time: String,
    duration_secs: f64,
    summary: BatchSummary,
    missing: &'a [String],
    results: Vec<&'a TargetResult>,
}

#[instrument(skip_all, fields(output_dir = %request.output_dir.display(), targets = request.results.len()))]
pub fn write_reports(request: &ReportRequest<'_>) -> Result<ReportPaths> {
    let out = request.output_dir;
    fs::create_dir_all(out).with_context(|| format!("create output dir {}", out.display()))?;

    let mut paths = ReportPaths {
        summary: out.join(SUMMARY_FILE),
        manifest: out.join(MANIFEST_FILE),
        ..ReportPaths::default()
    };

    write_summary(&paths.summary, request.results.values())?;

    for (bucket, results) in partition(request.results.values()) {
        let dir = out.join(bucket.name());
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        match bucket {
            Bucket::Tier(_) => {
                for result in results {
                    if let Some(path) = write_detail_page(&dir, result, request.form_url)? {
                        paths.detail_pages.push(path);
                    }
                }
            }
            Bucket::Failed(_) => {
                let path = dir.join(LINKS_FILE);
                let html = links_page(&results, request.parameters, request.form_url)?;
                fs::write(&path, html).with_context(|| format!("write {}", path.display()))?;
                paths.link_pages.push(path);
            }
        }
    }

    if !request.missing.is_empty() {
        let path = out.join(MISSING_FILE);
        write_missing(&path, request.missing)?;
        paths.missing = Some(path);
    }

    let manifest = RunManifest {
        start_time: request.started_at.to_rfc3339(),
        end_time: request.finished_at.to_rfc3339(),
        duration_secs: (request.finished_at - request.started_at)
            .to_std()
            .map(|duration| duration.as_secs_f64())
            .unwrap_or(0.0),
        summary: BatchSummary::from_results(request.results.values()),
        missing: request.missing,
        results: request.results.values().collect(),
    };
    let mut payload = serde_json::to_string_pretty(&manifest).context("serialize run manifest")?;
    payload.push('\n');
    fs::write(&paths.manifest, payload)
        .with_context(|| format!("write {}", paths.manifest.display()))?;

    debug!(
        detail_pages = paths.detail_pages.len(),
        link_pages = paths.link_pages.len(),
        "reports written"
    );
    Ok(paths)
}

fn write_summary<'a, I>(path: &Path, results: I) -> Result<()>
where
    I: IntoIterator<Item = &'a TargetResult>,
{
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for result in results {
        let primers = result.primers();
        writer
            .serialize(SummaryRow {
                target_id: &result.target.target_id,
                sequence_id: &result.target.sequence_id,
                status: result.status_label(),
                forward: primers.map(|p| p.forward.as_str()),
                forward_tm: primers.map(|p| p.forward_tm),
                reverse: primers.map(|p| p.reverse.as_str()),
                reverse_tm: primers.map(|p| p.reverse_tm),
                product_size: primers.map(|p| p.product_size),
                intron_size: primers.and_then(|p| p.intron_size),
            })
            .with_context(|| format!("write summary row {}", result.target.target_id))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

fn write_missing(path: &Path, missing: &[String]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    writer
        .write_record(["target_id"])
        .context("write missing header")?;
    for target_id in missing {
        writer
            .write_record([target_id])
            .with_context(|| format!("write missing row {target_id}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

fn write_detail_page(dir: &Path, result: &TargetResult, form_url: &str) -> Result<Option<PathBuf>> {
    let Some(page) = &result.page else {
        return Ok(None);
    };
    let path = dir.join(format!("{}.html", file_stem(&result.target.target_id)));
    let html = absolutize_stylesheets(&page.body, form_url)?;
    fs::write(&path, html).with_context(|| format!("write {}", path.display()))?;
    Ok(Some(path))
}

/// Rewrite relative stylesheet links so saved pages render offline of NCBI.
pub fn absolutize_stylesheets(body: &str, base_url: &str) -> Result<String> {
    let base = Url::parse(base_url).with_context(|| format!("parse url {base_url}"))?;
    Ok(STYLESHEET_HREF
        .replace_all(body, |caps: &Captures<'_>| match base.join(&caps[1]) {
            Ok(url) => format!(r#"href="{url}""#),
            Err(_) => caps[0].to_string(),
        })
        .into_owned())
}

/// Follow-up link for manual design: strict parameters without the
/// intron-spanning requirement, template prefilled.
pub fn follow_up_url(form_url: &str, parameters: &ParameterSet, sequence_id: &str) -> Result<Url> {
    let params = parameters.with_removed(SPAN_INTRON).with_sequence(sequence_id);
    Url::parse_with_params(form_url, params.iter())
        .with_context(|| format!("build follow-up url for {sequence_id}"))
}

fn links_page(results: &[&TargetResult], parameters: &ParameterSet, form_url: &str) -> Result<String> {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Links for primer design</title>\n</head>\n<body>\n<p>\n",
    );
    for result in results {
        let url = follow_up_url(form_url, parameters, &result.target.sequence_id)?;
        let note = match &result.status {
            TargetStatus::Exhausted { .. } => result
                .tier
                .as_deref()
                .map(|tier| format!(" (last tier: {})", escape_html(tier)))
                .unwrap_or_default(),
            TargetStatus::Succeeded { .. } => String::new(),
        };
        html.push_str(&format!(
            "<a href=\"{}\">{}</a>{}<br />\n",
            escape_html(url.as_str()),
            escape_html(&result.target.target_id),
            note
        ));
    }
    html.push_str("</p>\n</body>\n</html>\n");
    Ok(html)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Target ids become file names; keep them to a portable character set.
fn file_stem(target_id: &str) -> String {
    target_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
