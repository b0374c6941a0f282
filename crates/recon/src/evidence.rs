use crate::model::{DocumentSummary, EvidenceToken, ReconResult, ReconSummary, RowOutcome, RowStatus};
use crate::table::Table;

/// Compute summary statistics from per-row outcomes.
pub fn compute_summary(rows: &[RowOutcome], documents: &[String]) -> ReconSummary {
    let mut per_document: Vec<DocumentSummary> = documents
        .iter()
        .map(|d| DocumentSummary {
            document: d.clone(),
            ..DocumentSummary::default()
        })
        .collect();
    let mut matched = 0;
    let mut not_found = 0;
    let mut duplicate_rejected = 0;
    let mut clean_rows = 0;

    for r in rows {
        match r.status {
            RowStatus::Matched => matched += 1,
            RowStatus::NotFound => not_found += 1,
            RowStatus::DuplicateRejected => duplicate_rejected += 1,
        }
        if r.status == RowStatus::Matched && r.is_clean() {
            clean_rows += 1;
        }

        for (summary, cell) in per_document.iter_mut().zip(&r.cells) {
            for token in cell.tokens() {
                match token {
                    EvidenceToken::Ok { .. } => summary.ok += 1,
                    EvidenceToken::Failure { .. } | EvidenceToken::CrossFailure { .. } => {
                        summary.failures += 1
                    }
                    EvidenceToken::MissingSource(_) => summary.missing_source += 1,
                    EvidenceToken::MissingReference(_) => summary.missing_reference += 1,
                }
            }
        }
    }

    ReconSummary {
        total_rows: rows.len(),
        matched,
        not_found,
        duplicate_rejected,
        clean_rows,
        documents: per_document,
    }
}

/// The evidence table: `reference` plus one column per document type.
///
/// A reference header that already names a document type is overwritten in
/// place; all other columns are kept as read.
pub fn assemble_table(reference: &Table, result: &ReconResult) -> Table {
    let mut out = reference.clone();
    for (d, document) in result.documents.iter().enumerate() {
        let mut values = vec![String::new(); reference.len()];
        for outcome in &result.rows {
            if let (Some(slot), Some(cell)) = (values.get_mut(outcome.row), outcome.cells.get(d)) {
                *slot = cell.to_string();
            }
        }
        out.set_column(document, values);
    }
    out
}
