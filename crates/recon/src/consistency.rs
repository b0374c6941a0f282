//! Agreement checks between source columns that describe the same quantity
//! on different documents (e.g. the installment printed on the libranza and
//! on the amortization schedule).

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compare::{is_blank, similarity_ratio};
use crate::config::EngineConfig;
use crate::normalize::{normalize_number, normalize_text};
use crate::registry::ValueType;
use crate::table::{ColumnIndex, Table};

/// Column added to the source table by [`annotate`].
pub const STATUS_COLUMN: &str = "CONSISTENCY_STATUS";

/// Source columns that must carry the same value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConsistencyBlock {
    pub name: String,
    #[serde(default)]
    pub value_type: ValueType,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConsistencyStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WITH_ERRORS")]
    WithErrors,
}

impl std::fmt::Display for ConsistencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::WithErrors => write!(f, "WITH_ERRORS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowConsistency {
    pub status: ConsistencyStatus,
    /// Names of the blocks that failed, in registry order.
    pub failed_blocks: Vec<String>,
}

/// Mean pairwise similarity of the non-blank values, against the threshold.
///
/// No values fails the block; a single value passes it.
pub fn block_consistent(values: &[&str], value_type: ValueType, threshold: f64) -> bool {
    let canon: Vec<String> = values
        .iter()
        .filter(|v| !is_blank(Some(**v)))
        .map(|v| match value_type {
            ValueType::Number => normalize_number(v),
            _ => normalize_text(v),
        })
        .collect();

    match canon.len() {
        0 => false,
        1 => true,
        n => {
            let mut total = 0.0;
            let mut pairs = 0usize;
            for i in 0..n {
                for j in (i + 1)..n {
                    total += similarity_ratio(&canon[i], &canon[j]);
                    pairs += 1;
                }
            }
            total / pairs as f64 >= threshold
        }
    }
}

/// Per-row verdict over every block that has at least one column in `source`.
pub fn check_source_consistency(
    source: &Table,
    blocks: &[ConsistencyBlock],
    config: &EngineConfig,
) -> Vec<RowConsistency> {
    let index = ColumnIndex::new(source.headers());
    let resolved: Vec<(&ConsistencyBlock, Vec<usize>)> = blocks
        .iter()
        .map(|b| (b, b.columns.iter().filter_map(|c| index.get(c)).collect::<Vec<_>>()))
        .filter(|(_, cols)| !cols.is_empty())
        .collect();

    let results: Vec<RowConsistency> = source
        .rows()
        .iter()
        .map(|row| {
            let failed_blocks: Vec<String> = resolved
                .iter()
                .filter(|(block, cols)| {
                    let values: Vec<&str> = cols.iter().map(|&c| row[c].as_str()).collect();
                    !block_consistent(&values, block.value_type, config.text_threshold)
                })
                .map(|(block, _)| block.name.clone())
                .collect();
            let status = if failed_blocks.is_empty() {
                ConsistencyStatus::Ok
            } else {
                ConsistencyStatus::WithErrors
            };
            RowConsistency {
                status,
                failed_blocks,
            }
        })
        .collect();

    let failing = results
        .iter()
        .filter(|r| r.status == ConsistencyStatus::WithErrors)
        .count();
    info!(
        rows = results.len(),
        blocks = resolved.len(),
        failing,
        "source consistency checked"
    );
    results
}

/// Copy of `source` with a [`STATUS_COLUMN`] holding each row's status.
pub fn annotate(source: &Table, results: &[RowConsistency]) -> Table {
    let mut out = source.clone();
    out.set_column(
        STATUS_COLUMN,
        results.iter().map(|r| r.status.to_string()).collect(),
    );
    out
}
