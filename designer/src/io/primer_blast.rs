//! NCBI Primer-BLAST adapter.
//!
//! Jobs are submitted and polled with plain GET requests against
//! `primertool.cgi`. Everything the service tells us arrives as HTML, so page
//! inspection lives in pure functions ([`parse_job_key`], [`is_running`],
//! [`classify_page`], [`parse_primer_table`], [`similar_templates`]) that the
//! client wires together.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

use crate::core::params::{INPUT_SEQUENCE, ParameterSet, TRY_USER_GUIDE, USER_SEQLOC};
use crate::core::types::{OutcomeKind, PrimerPair, RawResult};
use crate::io::backend::{DesignBackend, JobHandle, PollStatus};
use crate::io::throttle::RequestThrottle;

const USER_AGENT: &str = concat!("designer/", env!("CARGO_PKG_VERSION"));
const SIMILAR_TEMPLATE_NOTICE: &str =
    "Your PCR template is highly similar to the following sequence";

static FORWARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Forward primer\s*\d*\s*([ACGT]+)").unwrap());
static REVERSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Reverse primer\s*\d*\s*([ACGT]+)").unwrap());
static FORWARD_TM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Forward primer.*?(\d\d\.\d\d)").unwrap());
static REVERSE_TM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Reverse primer.*?(\d\d\.\d\d)").unwrap());
static PRODUCT_LENGTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Product length\s*(\d+)").unwrap());
static INTRON_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Total intron size\s*(\d+)").unwrap());

/// Blocking Primer-BLAST client. One instance is shared by every worker.
pub struct PrimerBlastClient {
    http: Client,
    blast_url: String,
    throttle: RequestThrottle,
}

impl PrimerBlastClient {
    pub fn new(blast_url: &str, http_timeout: Duration, request_spacing: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(http_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            blast_url: blast_url.to_string(),
            throttle: RequestThrottle::new(request_spacing),
        })
    }

    fn get(&self, query: &[(&str, &str)]) -> Result<String> {
        self.throttle.wait();
        let response = self
            .http
            .get(&self.blast_url)
            .query(query)
            .send()
            .with_context(|| format!("GET {}", self.blast_url))?
            .error_for_status()
            .with_context(|| format!("GET {}", self.blast_url))?;
        response.text().context("read primer-blast response body")
    }

    fn submit_query(&self, query: &[(&str, &str)], parameters: ParameterSet) -> Result<JobHandle> {
        let body = self.get(query)?;
        let key = parse_job_key(&body).ok_or_else(|| anyhow!("no job key in submission response"))?;
        debug!(job_key = %key, "job submitted");
        Ok(JobHandle::new(key, parameters))
    }

    /// Resubmit `job` in user-guided mode with the similar templates it listed.
    fn resubmit_guided(&self, job: &JobHandle, seqlocs: &[String]) -> Result<JobHandle> {
        let parameters = job.parameters.with_override(TRY_USER_GUIDE, "yes");
        let mut query: Vec<(&str, &str)> = parameters.iter().collect();
        query.extend(seqlocs.iter().map(|loc| (USER_SEQLOC, loc.as_str())));
        self.submit_query(&query, parameters.clone())
            .context("resubmit with similar templates")
    }
}

impl DesignBackend for PrimerBlastClient {
    #[instrument(skip_all, fields(sequence_id = %sequence_id))]
    fn submit(&self, sequence_id: &str, parameters: &ParameterSet) -> Result<JobHandle> {
        let parameters = parameters.with_sequence(sequence_id);
        let query: Vec<(&str, &str)> = parameters.iter().collect();
        self.submit_query(&query, parameters.clone())
    }

    #[instrument(skip_all, fields(job_key = %job.key))]
    fn poll(&self, job: &JobHandle) -> Result<PollStatus> {
        let body = self.get(&[("job_key", job.key.as_str())])?;
        if is_running(&body) {
            debug!("job still running");
            return Ok(PollStatus::Running);
        }
        if !job.parameters.contains(TRY_USER_GUIDE)
            && let Some(seqlocs) = guided_resubmit_templates(&body)
        {
            info!(
                templates = seqlocs.len(),
                sequence_id = job.parameters.get(INPUT_SEQUENCE).unwrap_or_default(),
                "template is highly similar to other sequences; resubmitting"
            );
            return Ok(PollStatus::Redirected(self.resubmit_guided(job, &seqlocs)?));
        }
        Ok(PollStatus::Finished(RawResult::new(body)))
    }

    fn classify(&self, raw: &RawResult) -> OutcomeKind {
        classify_page(&raw.body)
    }

    fn parse_primers(&self, raw: &RawResult) -> Result<PrimerPair> {
        parse_primer_table(&raw.body)
    }
}

/// Extract the job key from a submission or status page.
///
/// Prefers the `job_key` form field; falls back to the `Job id=` breadcrumb.
pub fn parse_job_key(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    let field = Selector::parse("[name=job_key]").ok()?;
    if let Some(value) = doc
        .select(&field)
        .find_map(|element| element.value().attr("value"))
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return Some(value.to_string());
    }
    let breadcrumb = first_text(&doc, "#breadcrumb")?;
    let (_, rest) = breadcrumb.split_once("Job id=")?;
    rest.split_whitespace().next().map(str::to_string)
}

/// True while the status cell reports a running job.
pub fn is_running(body: &str) -> bool {
    let doc = Html::parse_document(body);
    first_text(&doc, ".odd").is_some_and(|text| text.contains("Running"))
}

/// Deterministic classification of a finished result page.
pub fn classify_page(body: &str) -> OutcomeKind {
    let doc = Html::parse_document(body);
    let text_has = |css: &str, needle: &str| {
        first_text(&doc, css).is_some_and(|text| text.contains(needle))
    };

    if first_text(&doc, ".odd").is_some_and(|text| text.contains("Running")) {
        return OutcomeKind::TransientError;
    }
    if text_has(".error", "Exception") || text_has(".info", "junction cannot be found") {
        return OutcomeKind::NoIntrons;
    }
    if text_has(".warning", "loosen the selection criteria")
        || text_has(".info", "No primers were found")
    {
        return OutcomeKind::NoPrimersFound;
    }
    if text_has(".paramSummary", "may not be specific") {
        return OutcomeKind::OffTarget;
    }
    if first_text(&doc, ".error").is_some() || first_text(&doc, ".prPairInfo table").is_none() {
        return OutcomeKind::TransientError;
    }
    OutcomeKind::Success
}

/// Parse the first primer pair from the `.prPairInfo` table.
pub fn parse_primer_table(body: &str) -> Result<PrimerPair> {
    let doc = Html::parse_document(body);
    let table = first_text(&doc, ".prPairInfo table")
        .ok_or_else(|| anyhow!("result page has no primer pair table"))?;

    let forward = capture(&FORWARD_RE, &table).ok_or_else(|| anyhow!("forward primer not found"))?;
    let reverse = capture(&REVERSE_RE, &table).ok_or_else(|| anyhow!("reverse primer not found"))?;
    let forward_tm =
        capture(&FORWARD_TM_RE, &table).ok_or_else(|| anyhow!("forward primer Tm not found"))?;
    let reverse_tm =
        capture(&REVERSE_TM_RE, &table).ok_or_else(|| anyhow!("reverse primer Tm not found"))?;
    let product_size =
        capture(&PRODUCT_LENGTH_RE, &table).ok_or_else(|| anyhow!("product length not found"))?;
    let intron_size = capture(&INTRON_SIZE_RE, &table);

    Ok(PrimerPair {
        forward,
        forward_tm: forward_tm
            .parse()
            .with_context(|| format!("parse forward Tm {forward_tm}"))?,
        reverse,
        reverse_tm: reverse_tm
            .parse()
            .with_context(|| format!("parse reverse Tm {reverse_tm}"))?,
        product_size: product_size
            .parse()
            .with_context(|| format!("parse product length {product_size}"))?,
        intron_size: intron_size
            .map(|size| {
                size.parse()
                    .with_context(|| format!("parse intron size {size}"))
            })
            .transpose()?,
    })
}

/// Templates to resubmit with in user-guided mode, if any.
///
/// A page that already reports a missing exon junction is final: the intron
/// branch takes over, so no guided resubmission is made for it.
pub fn guided_resubmit_templates(body: &str) -> Option<Vec<String>> {
    if classify_page(body) == OutcomeKind::NoIntrons {
        return None;
    }
    similar_templates(body)
}

/// `USER_SEQLOC` choices offered when the template resembles other sequences.
///
/// Returns `None` when the page carries no similar-template notice.
pub fn similar_templates(body: &str) -> Option<Vec<String>> {
    let doc = Html::parse_document(body);
    let notice = first_text(&doc, "#expl")?;
    if !notice.contains(SIMILAR_TEMPLATE_NOTICE) {
        return None;
    }
    let checkboxes = Selector::parse("input[type=checkbox][name=USER_SEQLOC]").ok()?;
    Some(
        doc.select(&checkboxes)
            .filter_map(|element| element.value().attr("value"))
            .map(str::to_string)
            .collect(),
    )
}

fn first_text(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector)
        .next()
        .map(|element| element.text().collect::<Vec<_>>().join(" "))
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_PAGE: &str = r#"<html><head>
<link rel="stylesheet" href="css/primer.css">
</head><body>
<div class="paramSummary">Specificity of primers: primers are specific to the input template</div>
<div class="prPairInfo"><table>
<tr><th>Sequence (5'->3')</th><th>Template strand</th><th>Length</th><th>Start</th><th>Stop</th><th>Tm</th><th>GC%</th></tr>
<tr><th>Forward primer</th><td>GATCGGCTACGAGAAGGTGA</td><td>Plus</td><td>20</td><td>233</td><td>252</td><td>60.04</td><td>55.00</td></tr>
<tr><th>Reverse primer</th><td>TTGCGGTAGTCGATCTTGGT</td><td>Minus</td><td>20</td><td>352</td><td>333</td><td>59.97</td><td>50.00</td></tr>
<tr><th>Product length</th><td>120</td></tr>
<tr><th>Exon junction</th><td>250/251 (forward primer)</td></tr>
<tr><th>Total intron size</th><td>412</td></tr>
</table></div>
</body></html>"#;

    #[test]
    fn job_key_from_form_field() {
        let body = r#"<form><input type="hidden" name="job_key" value="JSID_01_123_abc"></form>"#;
        assert_eq!(parse_job_key(body).as_deref(), Some("JSID_01_123_abc"));
    }

    #[test]
    fn job_key_from_breadcrumb_fallback() {
        let body = r#"<div id="breadcrumb"><a>Primer-BLAST</a> Job id=JSID_02_xyz </div>"#;
        assert_eq!(parse_job_key(body).as_deref(), Some("JSID_02_xyz"));
    }

    #[test]
    fn job_key_missing() {
        assert_eq!(parse_job_key("<html><body>oops</body></html>"), None);
    }

    #[test]
    fn running_page_detected() {
        let body = r#"<table><tr class="odd"><td>Status</td><td>Running</td></tr></table>"#;
        assert!(is_running(body));
        assert_eq!(classify_page(body), OutcomeKind::TransientError);
        assert!(!is_running(RESULT_PAGE));
    }

    #[test]
    fn classify_result_pages() {
        assert_eq!(classify_page(RESULT_PAGE), OutcomeKind::Success);
        assert_eq!(
            classify_page(r#"<p class="info">Exon-exon junction cannot be found in the template</p>"#),
            OutcomeKind::NoIntrons
        );
        assert_eq!(
            classify_page(r#"<p class="error">Exception: no exon annotation</p>"#),
            OutcomeKind::NoIntrons
        );
        assert_eq!(
            classify_page(
                r#"<p class="warning">No primers found. Please loosen the selection criteria.</p>"#
            ),
            OutcomeKind::NoPrimersFound
        );
        assert_eq!(
            classify_page(r#"<p class="info">No primers were found for this template</p>"#),
            OutcomeKind::NoPrimersFound
        );
        assert_eq!(
            classify_page(&RESULT_PAGE.replace(
                "primers are specific to the input template",
                "primers may not be specific to the input template"
            )),
            OutcomeKind::OffTarget
        );
        assert_eq!(
            classify_page(r#"<p class="error">Internal server error</p>"#),
            OutcomeKind::TransientError
        );
        assert_eq!(
            classify_page("<html><body></body></html>"),
            OutcomeKind::TransientError
        );
    }

    #[test]
    fn classification_is_repeatable() {
        let first = classify_page(RESULT_PAGE);
        for _ in 0..3 {
            assert_eq!(classify_page(RESULT_PAGE), first);
        }
    }

    #[test]
    fn parse_primer_table_reads_first_pair() {
        let pair = parse_primer_table(RESULT_PAGE).expect("parse");
        assert_eq!(pair.forward, "GATCGGCTACGAGAAGGTGA");
        assert_eq!(pair.reverse, "TTGCGGTAGTCGATCTTGGT");
        assert!((pair.forward_tm - 60.04).abs() < 1e-9);
        assert!((pair.reverse_tm - 59.97).abs() < 1e-9);
        assert_eq!(pair.product_size, 120);
        assert_eq!(pair.intron_size, Some(412));
    }

    #[test]
    fn parse_primer_table_without_introns() {
        let page = RESULT_PAGE.replace("<tr><th>Total intron size</th><td>412</td></tr>", "");
        let pair = parse_primer_table(&page).expect("parse");
        assert_eq!(pair.intron_size, None);
    }

    #[test]
    fn parse_primer_table_requires_table() {
        let err = parse_primer_table("<html></html>").expect_err("no table");
        assert!(err.to_string().contains("primer pair table"));
    }

    #[test]
    fn similar_templates_lists_checkbox_values() {
        let body = r#"<div id="expl">Your PCR template is highly similar to the following sequence(s).</div>
<input type="checkbox" name="USER_SEQLOC" value="NM_001.1">
<input type="checkbox" name="USER_SEQLOC" value="NM_002.3">
<input type="checkbox" name="OTHER" value="skip">"#;
        assert_eq!(
            similar_templates(body),
            Some(vec!["NM_001.1".to_string(), "NM_002.3".to_string()])
        );
        assert_eq!(similar_templates(RESULT_PAGE), None);
    }

    #[test]
    fn no_introns_page_is_not_resubmitted() {
        let notice = r#"<div id="expl">Your PCR template is highly similar to the following sequence(s).</div>
<input type="checkbox" name="USER_SEQLOC" value="NM_001.1">"#;
        let no_introns = format!(
            r#"{notice}<p class="info">Exon-exon junction cannot be found in the template</p>"#
        );

        assert_eq!(classify_page(&no_introns), OutcomeKind::NoIntrons);
        assert_eq!(guided_resubmit_templates(&no_introns), None);
        assert_eq!(
            guided_resubmit_templates(notice),
            Some(vec!["NM_001.1".to_string()])
        );
    }
}
