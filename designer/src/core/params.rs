//! Primer-BLAST parameter sets.
//!
//! A [`ParameterSet`] is never edited in place. Every derivation returns a new
//! value so each ladder tier keeps the exact parameters it was submitted with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key carrying the sequence identifier submitted to Primer-BLAST.
pub const INPUT_SEQUENCE: &str = "INPUT_SEQUENCE";
/// Require primers to span an exon/exon junction.
pub const SPAN_INTRON: &str = "SPAN_INTRON";
/// Number of G/C bases required at the 3' end.
pub const GC_CLAMP: &str = "GC_CLAMP";
pub const PRIMER_MIN_GC: &str = "PRIMER_MIN_GC";
pub const PRIMER_MAX_GC: &str = "PRIMER_MAX_GC";
pub const PRIMER_MIN_TM: &str = "PRIMER_MIN_TM";
pub const SELF_ANY: &str = "SELF_ANY";
pub const SELF_END: &str = "SELF_END";
/// Low-complexity (repeat) filter; absent means off.
pub const LOW_COMPLEXITY_FILTER: &str = "LOW_COMPLEXITY_FILTER";
pub const ORGANISM: &str = "ORGANISM";
/// Set when resubmitting with user-chosen template guidance.
pub const TRY_USER_GUIDE: &str = "TRY_USER_GUIDE";
pub const USER_SEQLOC: &str = "USER_SEQLOC";

/// Mapping of Primer-BLAST parameter name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, String>);

/// One key-level difference between two parameter sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamChange {
    Set {
        key: String,
        from: Option<String>,
        to: String,
    },
    Removed {
        key: String,
        from: String,
    },
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Return a copy with `key` set to `value`.
    pub fn with_override(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.0.clone();
        next.insert(key.into(), value.into());
        Self(next)
    }

    /// Return a copy without `key`. Removing an absent key is a no-op.
    pub fn with_removed(&self, key: &str) -> Self {
        let mut next = self.0.clone();
        next.remove(key);
        Self(next)
    }

    /// Return a copy whose submitted sequence is `sequence_id`.
    pub fn with_sequence(&self, sequence_id: &str) -> Self {
        self.with_override(INPUT_SEQUENCE, sequence_id)
    }

    pub fn sequence_id(&self) -> Option<&str> {
        self.get(INPUT_SEQUENCE)
    }

    /// Key-ordered list of changes that turn `self` into `next`.
    pub fn diff(&self, next: &ParameterSet) -> Vec<ParamChange> {
        let mut changes = Vec::new();
        for (key, value) in &next.0 {
            match self.0.get(key) {
                Some(prev) if prev == value => {}
                prev => changes.push(ParamChange::Set {
                    key: key.clone(),
                    from: prev.cloned(),
                    to: value.clone(),
                }),
            }
        }
        for (key, value) in &self.0 {
            if !next.0.contains_key(key) {
                changes.push(ParamChange::Removed {
                    key: key.clone(),
                    from: value.clone(),
                });
            }
        }
        changes.sort_by(|a, b| a.key().cmp(b.key()));
        changes
    }
}

impl ParamChange {
    pub fn key(&self) -> &str {
        match self {
            ParamChange::Set { key, .. } | ParamChange::Removed { key, .. } => key,
        }
    }
}

impl std::fmt::Display for ParamChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamChange::Set {
                key,
                from: Some(from),
                to,
            } => write!(f, "{key}: {from} -> {to}"),
            ParamChange::Set { key, from: None, to } => write!(f, "{key}: (unset) -> {to}"),
            ParamChange::Removed { key, from } => write!(f, "{key}: {from} -> (removed)"),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}
