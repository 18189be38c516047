//! Data-driven relaxation ladder.
//!
//! The ladder is a fixed, ordered list of `(label, mutation)` tiers consumed by
//! a single loop in the controller. The strict tier is implicit: it is the
//! caller's parameter set, unmodified. A `NoIntrons` outcome switches to the
//! intronless sub-ladder, whose base is the strict set with the intron-spanning
//! requirement removed and whose tiers carry the `intronless_` prefix.

use serde::{Deserialize, Serialize};

use crate::core::params::{
    GC_CLAMP, LOW_COMPLEXITY_FILTER, PRIMER_MAX_GC, PRIMER_MIN_GC, PRIMER_MIN_TM, ParameterSet,
    SELF_ANY, SELF_END, SPAN_INTRON,
};

/// Label of the first tier of every ladder.
pub const STRICT: &str = "strict";
/// Prefix applied to every tier label of the intronless sub-ladder.
pub const INTRONLESS_PREFIX: &str = "intronless_";

/// What each tier is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierBase {
    /// Each tier starts from the previous tier's parameters.
    #[default]
    Cumulative,
    /// Each tier starts from its branch base and applies only its own mutation.
    Baseline,
}

/// Named key overrides and removals applied to a parameter set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    pub set: Vec<(String, String)>,
    pub remove: Vec<String>,
}

impl Mutation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn set(key: &str, value: &str) -> Self {
        Self::none().and_set(key, value)
    }

    pub fn and_set(mut self, key: &str, value: &str) -> Self {
        self.set.push((key.to_string(), value.to_string()));
        self
    }

    pub fn remove(key: &str) -> Self {
        Self {
            set: Vec::new(),
            remove: vec![key.to_string()],
        }
    }

    pub fn apply(&self, base: &ParameterSet) -> ParameterSet {
        let mut next = base.clone();
        for (key, value) in &self.set {
            next = next.with_override(key.as_str(), value.as_str());
        }
        for key in &self.remove {
            next = next.with_removed(key);
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub label: String,
    pub mutation: Mutation,
    /// Primers from this tier are flagged as lower confidence.
    pub low_confidence: bool,
}

impl Tier {
    fn new(label: &str, mutation: Mutation) -> Self {
        Self {
            label: label.to_string(),
            mutation,
            low_confidence: false,
        }
    }

    fn low_confidence(mut self) -> Self {
        self.low_confidence = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Main,
    Intronless,
}

/// A materialised ladder position: the parameters to submit and their label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub branch: Branch,
    /// Position within the branch; 0 is the branch's strict tier.
    pub index: usize,
    pub label: String,
    pub parameters: ParameterSet,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaxationPolicy {
    /// Main-ladder tiers after `strict`, in order.
    pub relaxations: Vec<Tier>,
    /// Mutation turning the strict set into the intronless base.
    pub intron_relaxation: Mutation,
    /// Sub-ladder tiers after `intronless_strict`, labels without prefix.
    pub intronless: Vec<Tier>,
    pub base: TierBase,
}

impl Default for RelaxationPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RelaxationPolicy {
    /// The Primer-BLAST ladder: GC clamp, GC content, Tm, self-complementarity,
    /// then the repeat filter. The intronless sub-ladder stops before the
    /// repeat filter.
    pub fn standard() -> Self {
        let relaxations = vec![
            Tier::new("GC1", Mutation::set(GC_CLAMP, "1")),
            Tier::new("GC0", Mutation::set(GC_CLAMP, "0")),
            Tier::new(
                "GC_content",
                Mutation::set(PRIMER_MIN_GC, "35").and_set(PRIMER_MAX_GC, "65"),
            ),
            Tier::new("Low_TM", Mutation::set(PRIMER_MIN_TM, "52")),
            Tier::new(
                "Potential_Dimers",
                Mutation::set(SELF_ANY, "5").and_set(SELF_END, "2"),
            ),
            Tier::new(
                "Probable_Dimers",
                Mutation::set(SELF_ANY, "8").and_set(SELF_END, "3"),
            )
            .low_confidence(),
            Tier::new("No_repeat_filter", Mutation::remove(LOW_COMPLEXITY_FILTER)),
        ];
        let intronless = relaxations
            .iter()
            .filter(|tier| tier.label != "No_repeat_filter")
            .cloned()
            .collect();
        Self {
            relaxations,
            intron_relaxation: Mutation::remove(SPAN_INTRON),
            intronless,
            base: TierBase::Cumulative,
        }
    }

    pub fn with_base(mut self, base: TierBase) -> Self {
        self.base = base;
        self
    }

    pub fn tiers(&self, branch: Branch) -> &[Tier] {
        match branch {
            Branch::Main => &self.relaxations,
            Branch::Intronless => &self.intronless,
        }
    }

    /// Number of tiers in `branch`, its strict tier included.
    pub fn tier_count(&self, branch: Branch) -> usize {
        self.tiers(branch).len() + 1
    }

    pub fn first(&self, strict: &ParameterSet) -> Step {
        self.branch_start(Branch::Main, strict)
    }

    /// Start of the intronless sub-ladder for `strict`.
    pub fn branch_intronless(&self, strict: &ParameterSet) -> Step {
        self.branch_start(Branch::Intronless, strict)
    }

    /// Next tier after `step`, or `None` once the branch is exhausted.
    pub fn advance(&self, step: &Step, strict: &ParameterSet) -> Option<Step> {
        let tier = self.tiers(step.branch).get(step.index)?;
        let base = match self.base {
            TierBase::Cumulative => step.parameters.clone(),
            TierBase::Baseline => self.branch_base(step.branch, strict),
        };
        Some(Step {
            branch: step.branch,
            index: step.index + 1,
            label: tier_label(step.branch, &tier.label),
            parameters: tier.mutation.apply(&base),
            low_confidence: tier.low_confidence,
        })
    }

    /// Every step of `branch` in order.
    pub fn materialize(&self, branch: Branch, strict: &ParameterSet) -> Vec<Step> {
        let mut steps = vec![self.branch_start(branch, strict)];
        while let Some(next) = steps.last().and_then(|step| self.advance(step, strict)) {
            steps.push(next);
        }
        steps
    }

    fn branch_base(&self, branch: Branch, strict: &ParameterSet) -> ParameterSet {
        match branch {
            Branch::Main => strict.clone(),
            Branch::Intronless => self.intron_relaxation.apply(strict),
        }
    }

    fn branch_start(&self, branch: Branch, strict: &ParameterSet) -> Step {
        Step {
            branch,
            index: 0,
            label: tier_label(branch, STRICT),
            parameters: self.branch_base(branch, strict),
            low_confidence: false,
        }
    }
}

fn tier_label(branch: Branch, label: &str) -> String {
    match branch {
        Branch::Main => label.to_string(),
        Branch::Intronless => format!("{INTRONLESS_PREFIX}{label}"),
    }
}
