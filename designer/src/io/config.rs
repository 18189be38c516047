//! Designer configuration stored in `designer.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::controller::ControllerSettings;
use crate::core::params::{ORGANISM, ParameterSet};
use crate::core::policy::{RelaxationPolicy, TierBase};

pub const DEFAULT_CONFIG_FILE: &str = "designer.toml";

/// Designer configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// tool was tuned with for rice (Oryza sativa) transcripts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DesignerConfig {
    /// Primer-BLAST submit and poll endpoint.
    pub blast_url: String,

    /// Primer-BLAST form used for manual follow-up links.
    pub form_url: String,

    /// Simultaneous targets in flight.
    pub max_concurrency: usize,

    /// Minimum spacing between any two requests to Primer-BLAST.
    pub request_spacing_secs: u64,

    /// Minimum delay between polls of the same job.
    pub poll_interval_secs: u64,

    /// Give up polling one job after this long.
    pub job_timeout_secs: u64,

    /// Same-tier retries after a transient failure.
    pub transient_retry_limit: u32,

    pub transient_backoff_secs: u64,

    pub http_timeout_secs: u64,

    /// Whether each ladder tier builds on the previous tier or on the branch base.
    pub tier_base: TierBase,

    /// Strict-tier Primer-BLAST parameters.
    pub parameters: ParameterSet,
}

impl Default for DesignerConfig {
    fn default() -> Self {
        Self {
            blast_url: "https://www.ncbi.nlm.nih.gov/tools/primer-blast/primertool.cgi"
                .to_string(),
            form_url: "https://www.ncbi.nlm.nih.gov/tools/primer-blast/index.cgi".to_string(),
            max_concurrency: 10,
            request_spacing_secs: 3,
            poll_interval_secs: 60,
            job_timeout_secs: 60 * 60,
            transient_retry_limit: 3,
            transient_backoff_secs: 60,
            http_timeout_secs: 120,
            tier_base: TierBase::Cumulative,
            parameters: default_parameters(),
        }
    }
}

impl DesignerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.blast_url.trim().is_empty() {
            return Err(anyhow!("blast_url must be non-empty"));
        }
        if self.form_url.trim().is_empty() {
            return Err(anyhow!("form_url must be non-empty"));
        }
        if self.max_concurrency == 0 {
            return Err(anyhow!("max_concurrency must be > 0"));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be > 0"));
        }
        if self.job_timeout_secs == 0 {
            return Err(anyhow!("job_timeout_secs must be > 0"));
        }
        if self.http_timeout_secs == 0 {
            return Err(anyhow!("http_timeout_secs must be > 0"));
        }
        if self.parameters.is_empty() {
            return Err(anyhow!("parameters must be a non-empty table"));
        }
        Ok(())
    }

    /// Apply command-line overrides, then re-validate.
    pub fn with_overrides(mut self, jobs: Option<usize>, organism: Option<&str>) -> Result<Self> {
        if let Some(jobs) = jobs {
            self.max_concurrency = jobs;
        }
        if let Some(organism) = organism {
            self.parameters = self.parameters.with_override(ORGANISM, organism);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn policy(&self) -> RelaxationPolicy {
        RelaxationPolicy::standard().with_base(self.tier_base)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            transient_retry_limit: self.transient_retry_limit,
            transient_backoff: Duration::from_secs(self.transient_backoff_secs),
        }
    }

    pub fn request_spacing(&self) -> Duration {
        Duration::from_secs(self.request_spacing_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Strict Primer-BLAST parameters for rice transcripts (RefSeq RNA, intron
/// spanning, GC clamp of 2).
pub fn default_parameters() -> ParameterSet {
    [
        ("OVERLAP_5END", "7"),
        ("OVERLAP_3END", "4"),
        ("PRIMER_PRODUCT_MIN", "75"),
        ("PRIMER_PRODUCT_MAX", "180"),
        ("PRIMER_NUM_RETURN", "10"),
        ("PRIMER_MIN_TM", "55"),
        ("PRIMER_OPT_TM", "60"),
        ("PRIMER_MAX_TM", "65"),
        ("PRIMER_MAX_DIFF_TM", "5"),
        ("PRIMER_ON_SPLICE_SITE", "0"),
        ("SEARCHMODE", "0"),
        ("SPLICE_SITE_OVERLAP_5END", "7"),
        ("SPLICE_SITE_OVERLAP_3END", "4"),
        ("SPAN_INTRON", "on"),
        ("MIN_INTRON_SIZE", "50"),
        ("MAX_INTRON_SIZE", "1000000"),
        ("SEARCH_SPECIFIC_PRIMER", "on"),
        ("EXCLUDE_ENV", "off"),
        ("EXCLUDE_XM", "off"),
        ("TH_OLOGO_ALIGNMENT", "off"),
        ("TH_TEMPLATE_ALIGNMENT", "off"),
        ("ORGANISM", "Oryza sativa Japonica Group (taxid:39947)"),
        ("PRIMER_SPECIFICITY_DATABASE", "refseq_rna"),
        ("TOTAL_PRIMER_SPECIFICITY_MISMATCH", "1"),
        ("PRIMER_3END_SPECIFICITY_MISMATCH", "1"),
        ("MISMATCH_REGION_LENGTH", "5"),
        ("TOTAL_MISMATCH_IGNORE", "7"),
        ("PRODUCT_SIZE_DEVIATION", "200"),
        ("ALLOW_TRANSCRIPT_VARIANTS", "on"),
        ("HITSIZE", "50000"),
        ("EVALUE", "30000"),
        ("WORD_SIZE", "7"),
        ("MAX_CANDIDATE_PRIMER", "1000"),
        ("PRIMER_MIN_SIZE", "15"),
        ("PRIMER_OPT_SIZE", "20"),
        ("PRIMER_MAX_SIZE", "25"),
        ("PRIMER_MIN_GC", "45"),
        ("PRIMER_MAX_GC", "55"),
        ("GC_CLAMP", "2"),
        ("NUM_TARGETS_WITH_PRIMERS", "1000"),
        ("NUM_TARGETS", "20"),
        ("MAX_TARGET_PER_TEMPLATE", "100"),
        ("POLYX", "3"),
        ("SELF_ANY", "3"),
        ("SELF_END", "1"),
        ("PRIMER_MAX_END_STABILITY", "9"),
        ("PRIMER_MAX_END_GC", "5"),
        ("PRIMER_MAX_TEMPLATE_MISPRIMING_TH", "40.00"),
        ("PRIMER_PAIR_MAX_TEMPLATE_MISPRIMING_TH", "70.00"),
        ("PRIMER_MAX_SELF_ANY_TH", "45.0"),
        ("PRIMER_MAX_SELF_END_TH", "35.0"),
        ("PRIMER_PAIR_MAX_COMPL_ANY_TH", "45.0"),
        ("PRIMER_PAIR_MAX_COMPL_END_TH", "35.0"),
        ("PRIMER_MAX_HAIRPIN_TH", "24.0"),
        ("PRIMER_MAX_TEMPLATE_MISPRIMING", "12.00"),
        ("PRIMER_PAIR_MAX_TEMPLATE_MISPRIMING", "24.00"),
        ("PRIMER_PAIR_MAX_COMPL_ANY", "8.00"),
        ("PRIMER_PAIR_MAX_COMPL_END", "3.00"),
        ("PRIMER_MISPRIMING_LIBRARY", "AUTO"),
        ("NO_SNP", "off"),
        ("LOW_COMPLEXITY_FILTER", "on"),
        ("MONO_CATIONS", "50.0"),
        ("DIVA_CATIONS", "1.5"),
        ("CON_ANEAL_OLIGO", "50.0"),
        ("CON_DNTPS", "0.6"),
        ("SALT_FORMULAR", "1"),
        ("TM_METHOD", "1"),
        ("PRIMER_INTERNAL_OLIGO_MIN_SIZE", "18"),
        ("PRIMER_INTERNAL_OLIGO_OPT_SIZE", "20"),
        ("PRIMER_INTERNAL_OLIGO_MAX_SIZE", "27"),
        ("PRIMER_INTERNAL_OLIGO_MIN_TM", "57.0"),
        ("PRIMER_INTERNAL_OLIGO_OPT_TM", "60.0"),
        ("PRIMER_INTERNAL_OLIGO_MAX_TM", "63.0"),
        ("PRIMER_INTERNAL_OLIGO_MAX_GC", "80.0"),
        ("PRIMER_INTERNAL_OLIGO_OPT_GC_PERCENT", "50"),
        ("PRIMER_INTERNAL_OLIGO_MIN_GC", "20.0"),
        ("PICK_HYB_PROBE", "off"),
        ("NEWWIN", "off"),
        ("SHOW_SVIEWER", "false"),
    ]
    .into_iter()
    .collect()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DesignerConfig::default()`.
pub fn load_config(path: &Path) -> Result<DesignerConfig> {
    if !path.exists() {
        let cfg = DesignerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DesignerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DesignerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
