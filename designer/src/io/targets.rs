//! Target list input: `target_id -> sequence_id` mapping.
//!
//! Accepted shapes:
//! - CSV with a header naming `target_id` and `sequence_id` (other columns ignored);
//! - headerless CSV, `target_id,sequence_id` per row;
//! - a plain list of sequence ids, one per line (the id is also the target id).
//!
//! Blank lines and `#` comments are skipped. Rows without a sequence id are
//! returned as missing so they can be reported instead of submitted.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::warn;

use crate::core::types::Target;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    /// Unique targets in input order.
    pub targets: Vec<Target>,
    /// Target ids that had no sequence id.
    pub missing: Vec<String>,
    /// Later rows that repeated an earlier target id.
    pub duplicates: Vec<Target>,
}

pub fn load_targets(path: &Path) -> Result<TargetList> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_targets(&contents).with_context(|| format!("parse {}", path.display()))
}

pub fn parse_targets(contents: &str) -> Result<TargetList> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(contents.as_bytes());

    let mut list = TargetList::default();
    // Only the first non-empty row may be a header; without one, each row picks
    // its own layout by field count.
    let mut header: Option<Columns> = None;
    let mut first_row = true;
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read record {}", line + 1))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if std::mem::take(&mut first_row)
            && let Some(columns) = Columns::from_header(&record)
        {
            header = Some(columns);
            continue;
        }
        let cols = header.unwrap_or_else(|| Columns::positional(&record));
        push_row(&mut list, &record, cols);
    }
    Ok(list)
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    target: usize,
    sequence: usize,
}

impl Columns {
    fn from_header(record: &StringRecord) -> Option<Self> {
        let find = |name: &str| {
            record
                .iter()
                .position(|field| field.eq_ignore_ascii_case(name))
        };
        match (find("target_id"), find("sequence_id")) {
            (Some(target), Some(sequence)) => Some(Self { target, sequence }),
            (None, Some(sequence)) => Some(Self {
                target: sequence,
                sequence,
            }),
            (Some(target), None) => Some(Self {
                target,
                sequence: target + 1,
            }),
            (None, None) => None,
        }
    }

    fn positional(record: &StringRecord) -> Self {
        Self {
            target: 0,
            sequence: if record.len() > 1 { 1 } else { 0 },
        }
    }
}

fn push_row(list: &mut TargetList, record: &StringRecord, cols: Columns) {
    let target_id = record.get(cols.target).unwrap_or_default();
    let sequence_id = record.get(cols.sequence).unwrap_or_default();
    if target_id.is_empty() {
        warn!(row = ?record, "skipping row without target id");
        return;
    }
    if sequence_id.is_empty() {
        list.missing.push(target_id.to_string());
        return;
    }
    let target = Target::new(target_id, sequence_id);
    if list
        .targets
        .iter()
        .any(|existing| existing.target_id == target.target_id)
    {
        list.duplicates.push(target);
    } else {
        list.targets.push(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_columns_by_name() {
        let list = parse_targets(
            "gene,sequence_id,target_id\nx,NM_001,LOC_Os01g01010\ny,NM_002,LOC_Os02g02020\n",
        )
        .expect("parse");
        assert_eq!(
            list.targets,
            vec![
                Target::new("LOC_Os01g01010", "NM_001"),
                Target::new("LOC_Os02g02020", "NM_002"),
            ]
        );
    }

    #[test]
    fn headerless_pairs_and_plain_ids() {
        let list = parse_targets("LOC_A,NM_1\n\n# comment\nNM_2\n").expect("parse");
        assert_eq!(
            list.targets,
            vec![Target::new("LOC_A", "NM_1"), Target::new("NM_2", "NM_2")]
        );
    }

    #[test]
    fn headerless_layout_is_chosen_per_row() {
        let list = parse_targets("NM_1\nLOC_B,NM_2\nNM_3\n").expect("parse");
        assert_eq!(
            list.targets,
            vec![
                Target::new("NM_1", "NM_1"),
                Target::new("LOC_B", "NM_2"),
                Target::new("NM_3", "NM_3"),
            ]
        );
        assert!(list.missing.is_empty());
    }

    #[test]
    fn missing_sequence_ids_are_reported() {
        let list = parse_targets("target_id,sequence_id\nLOC_A,NM_1\nLOC_B,\nLOC_C\n").expect("parse");
        assert_eq!(list.targets, vec![Target::new("LOC_A", "NM_1")]);
        assert_eq!(list.missing, vec!["LOC_B".to_string(), "LOC_C".to_string()]);
    }

    #[test]
    fn duplicate_target_ids_keep_first() {
        let list = parse_targets("LOC_A,NM_1\nLOC_A,NM_9\nLOC_B,NM_2\n").expect("parse");
        assert_eq!(
            list.targets,
            vec![Target::new("LOC_A", "NM_1"), Target::new("LOC_B", "NM_2")]
        );
        assert_eq!(list.duplicates, vec![Target::new("LOC_A", "NM_9")]);
    }

    #[test]
    fn load_reads_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("targets.csv");
        fs::write(&path, "  LOC_A , NM_1 \n").expect("write");
        let list = load_targets(&path).expect("load");
        assert_eq!(list.targets, vec![Target::new("LOC_A", "NM_1")]);
        assert!(load_targets(&temp.path().join("absent.csv")).is_err());
    }
}
