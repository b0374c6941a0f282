use serde::{Serialize, Serializer};

/// Cell value for a reference row with no source row.
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Cell value for a reference row whose key matched several source rows
/// under the `reject` duplicate policy.
pub const DUPLICATE_SOURCE: &str = "DUPLICATE_SOURCE";

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// Verdict of one spec evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceToken {
    /// Values agree. `detail` carries resolved rate values when requested.
    Ok { detail: Option<String> },
    Failure {
        field: String,
        detail: Option<String>,
    },
    /// Two source columns disagree.
    CrossFailure { left: String, right: String },
    MissingSource(String),
    MissingReference(String),
}

impl EvidenceToken {
    pub fn ok() -> Self {
        Self::Ok { detail: None }
    }

    pub fn failure(field: impl Into<String>) -> Self {
        Self::Failure {
            field: field.into(),
            detail: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

impl std::fmt::Display for EvidenceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok { detail } => write!(f, "OK{}", detail.as_deref().unwrap_or("")),
            Self::Failure { field, detail } => {
                write!(f, "FAILURE:{field}{}", detail.as_deref().unwrap_or(""))
            }
            Self::CrossFailure { left, right } => write!(f, "FAILURE:{left} vs {right}"),
            Self::MissingSource(field) => write!(f, "MISSING_SOURCE:{field}"),
            Self::MissingReference(field) => write!(f, "MISSING_REFERENCE:{field}"),
        }
    }
}

impl Serialize for EvidenceToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Contents of one (reference row, document type) cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceCell {
    Tokens(Vec<EvidenceToken>),
    NotFound,
    DuplicateSource,
}

impl EvidenceCell {
    pub fn tokens(&self) -> &[EvidenceToken] {
        match self {
            Self::Tokens(tokens) => tokens,
            Self::NotFound | Self::DuplicateSource => &[],
        }
    }

    /// Every token is `OK` (an empty cell counts as clean).
    pub fn is_clean(&self) -> bool {
        match self {
            Self::Tokens(tokens) => tokens.iter().all(EvidenceToken::is_ok),
            Self::NotFound | Self::DuplicateSource => false,
        }
    }
}

impl std::fmt::Display for EvidenceCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str(NOT_FOUND),
            Self::DuplicateSource => f.write_str(DUPLICATE_SOURCE),
            Self::Tokens(tokens) => {
                for (i, token) in tokens.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{token}")?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for EvidenceCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Matched,
    NotFound,
    DuplicateRejected,
}

/// Evidence for one reference row, one cell per document type in registry order.
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    /// Zero-based row position in the reference table.
    pub row: usize,
    /// Normalized join key.
    pub key: String,
    pub status: RowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_row: Option<usize>,
    pub cells: Vec<EvidenceCell>,
}

impl RowOutcome {
    pub fn is_clean(&self) -> bool {
        self.cells.iter().all(EvidenceCell::is_clean)
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub document: String,
    pub ok: usize,
    pub failures: usize,
    pub missing_source: usize,
    pub missing_reference: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconSummary {
    pub total_rows: usize,
    pub matched: usize,
    pub not_found: usize,
    pub duplicate_rejected: usize,
    /// Matched rows whose every cell is only `OK`.
    pub clean_rows: usize,
    pub documents: Vec<DocumentSummary>,
}

impl ReconSummary {
    pub fn has_findings(&self) -> bool {
        self.not_found > 0
            || self.duplicate_rejected > 0
            || self
                .documents
                .iter()
                .any(|d| d.failures + d.missing_source + d.missing_reference > 0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub registry_name: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    /// Document type names, in the order of each row's cells.
    pub documents: Vec<String>,
    pub rows: Vec<RowOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_rendering() {
        assert_eq!(EvidenceToken::ok().to_string(), "OK");
        assert_eq!(EvidenceToken::failure("CEDULA").to_string(), "FAILURE:CEDULA");
        assert_eq!(
            EvidenceToken::CrossFailure {
                left: "a".into(),
                right: "b".into()
            }
            .to_string(),
            "FAILURE:a vs b"
        );
        assert_eq!(
            EvidenceToken::MissingSource("SALARIO".into()).to_string(),
            "MISSING_SOURCE:SALARIO"
        );
        assert_eq!(
            EvidenceToken::MissingReference("SALARIO".into()).to_string(),
            "MISSING_REFERENCE:SALARIO"
        );
        let detailed = EvidenceToken::Ok {
            detail: Some(" (x)".into()),
        };
        assert_eq!(detailed.to_string(), "OK (x)");
    }

    #[test]
    fn cell_rendering() {
        let cell = EvidenceCell::Tokens(vec![
            EvidenceToken::ok(),
            EvidenceToken::failure("EMISOR"),
        ]);
        assert_eq!(cell.to_string(), "OK, FAILURE:EMISOR");
        assert!(!cell.is_clean());
        assert_eq!(EvidenceCell::Tokens(vec![]).to_string(), "");
        assert!(EvidenceCell::Tokens(vec![]).is_clean());
        assert_eq!(EvidenceCell::NotFound.to_string(), NOT_FOUND);
        assert_eq!(EvidenceCell::DuplicateSource.to_string(), DUPLICATE_SOURCE);
    }

    #[test]
    fn cell_serializes_as_string() {
        let cell = EvidenceCell::Tokens(vec![EvidenceToken::ok(), EvidenceToken::ok()]);
        assert_eq!(serde_json::to_string(&cell).unwrap(), "\"OK, OK\"");
    }
}
