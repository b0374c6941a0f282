use std::collections::HashMap;

use tracing::debug;

use crate::compare::is_blank;
use crate::config::DuplicatePolicy;
use crate::normalize::{normalize_header, normalize_number};
use crate::registry::ReferenceAccessors;
use crate::table::Table;

/// Locate the reference join-key column: an exact alias first, in alias
/// order, then the first header containing the fragment.
pub fn resolve_reference_key(headers: &[String], accessors: &ReferenceAccessors) -> Option<usize> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

    for alias in &accessors.key_aliases {
        let alias = normalize_header(alias);
        if let Some(pos) = normalized.iter().position(|h| *h == alias) {
            return Some(pos);
        }
    }

    let fragment = normalize_header(accessors.key_fragment.as_deref()?);
    if fragment.is_empty() {
        return None;
    }
    normalized.iter().position(|h| h.contains(&fragment))
}

/// Join key for a raw identifier cell; `None` when blank.
pub fn join_key(raw: Option<&str>) -> Option<String> {
    if is_blank(raw) {
        return None;
    }
    let key = normalize_number(raw.unwrap_or_default());
    (!key.is_empty()).then_some(key)
}

/// Outcome of looking up one reference key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMatch {
    Found(usize),
    NotFound,
    /// Several source rows share the key and the policy is `reject`.
    Rejected(usize),
}

/// Normalized key -> source row positions, in source-table order.
///
/// Built once per run; read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    rows: HashMap<String, Vec<usize>>,
    duplicate_keys: usize,
}

impl SourceIndex {
    pub fn build(source: &Table, key_col: usize) -> Self {
        let mut rows: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in source.rows().iter().enumerate() {
            if let Some(key) = join_key(row.get(key_col).map(String::as_str)) {
                rows.entry(key).or_default().push(i);
            }
        }

        let mut duplicate_keys = 0;
        for (key, positions) in &rows {
            if positions.len() > 1 {
                debug!(key = %key, rows = ?positions, "duplicate source key");
                duplicate_keys += 1;
            }
        }

        Self {
            rows,
            duplicate_keys,
        }
    }

    /// Number of distinct keys held by more than one source row.
    pub fn duplicate_keys(&self) -> usize {
        self.duplicate_keys
    }

    pub fn candidates(&self, key: &str) -> &[usize] {
        self.rows.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn select(&self, key: Option<&str>, policy: DuplicatePolicy) -> SourceMatch {
        let Some(key) = key else {
            return SourceMatch::NotFound;
        };
        match (self.candidates(key), policy) {
            ([], _) => SourceMatch::NotFound,
            ([only], _) => SourceMatch::Found(*only),
            ([first, ..], DuplicatePolicy::First) => SourceMatch::Found(*first),
            (many, DuplicatePolicy::Reject) => SourceMatch::Rejected(many.len()),
        }
    }
}
