//! Named comparisons that override the type-dispatched default.

use chrono::{Datelike, Months, NaiveDate};

use crate::model::EvidenceToken;
use crate::normalize::{normalize_text, parse_date, parse_rate, to_monthly_rate};

// ---------------------------------------------------------------------------
// Disbursement window
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowVerdict {
    Within,
    Outside,
    /// At least one side is not a date; the flags name which.
    Unparseable { reference: bool, source: bool },
}

fn first_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

/// Month of `validity` lies in `[month(disbursement) - months, month(disbursement)]`.
pub fn within_window(disbursement: NaiveDate, validity: NaiveDate, months: u32) -> bool {
    let upper = first_of_month(disbursement);
    let lower = upper
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN);
    let vig = first_of_month(validity);
    lower <= vig && vig <= upper
}

pub fn disbursement_window(reference: &str, source: &str, months: u32) -> WindowVerdict {
    match (parse_date(reference), parse_date(source)) {
        (Some(disb), Some(vig)) => {
            if within_window(disb, vig, months) {
                WindowVerdict::Within
            } else {
                WindowVerdict::Outside
            }
        }
        (disb, vig) => WindowVerdict::Unparseable {
            reference: disb.is_none(),
            source: vig.is_none(),
        },
    }
}

impl WindowVerdict {
    pub fn tokens(self, field: &str) -> Vec<EvidenceToken> {
        match self {
            Self::Within => vec![EvidenceToken::ok()],
            Self::Outside => vec![EvidenceToken::failure(field)],
            Self::Unparseable { reference, source } => {
                let mut out = Vec::new();
                if reference {
                    out.push(EvidenceToken::MissingReference(field.to_string()));
                }
                if source {
                    out.push(EvidenceToken::MissingSource(field.to_string()));
                }
                out
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Monthly rate
// ---------------------------------------------------------------------------

/// Both sides of a rate comparison resolved to monthly fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateCheck {
    pub reference: Option<f64>,
    pub source: Option<f64>,
}

impl RateCheck {
    /// The ledger already states the monthly rate; the document's basis varies.
    pub fn evaluate(reference: &str, source: &str) -> Self {
        Self {
            reference: parse_rate(reference),
            source: to_monthly_rate(source),
        }
    }

    pub fn within(&self, tolerance: f64) -> Option<bool> {
        Some((self.reference? - self.source?).abs() <= tolerance)
    }

    /// Audit suffix with the raw and resolved values of both sides.
    pub fn detail(&self, raw_reference: &str, raw_source: &str) -> String {
        let fmt = |v: Option<f64>| v.map_or_else(|| "NA".to_string(), |v| format!("{v:.6}"));
        format!(
            " (reference='{raw_reference}'->{}; source='{raw_source}'->{})",
            fmt(self.reference),
            fmt(self.source)
        )
    }

    /// Verdict tokens. `detail`, when given, is attached to the verdict and
    /// never changes it.
    pub fn tokens(&self, field: &str, tolerance: f64, detail: Option<String>) -> Vec<EvidenceToken> {
        match self.within(tolerance) {
            Some(true) => vec![EvidenceToken::Ok { detail }],
            Some(false) => vec![EvidenceToken::Failure {
                field: field.to_string(),
                detail,
            }],
            None => {
                let mut out = Vec::new();
                if self.reference.is_none() {
                    out.push(EvidenceToken::MissingReference(field.to_string()));
                }
                if self.source.is_none() {
                    out.push(EvidenceToken::MissingSource(field.to_string()));
                }
                out
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Full name from components
// ---------------------------------------------------------------------------

/// Every non-blank reference name component must occur in the source full name.
///
/// `components` pairs a label (the reference column) with its raw value.
/// Yields a single `OK`, or one `FAILURE:<label>` per absent component, or
/// `MISSING_REFERENCE:<field>` when no component has a value.
pub fn full_name_tokens(
    components: &[(&str, &str)],
    source_full_name: &str,
    field: &str,
) -> Vec<EvidenceToken> {
    let haystack = normalize_text(source_full_name);
    let present: Vec<(&str, String)> = components
        .iter()
        .map(|(label, value)| (*label, normalize_text(value)))
        .filter(|(_, piece)| !piece.is_empty())
        .collect();

    if present.is_empty() {
        return vec![EvidenceToken::MissingReference(field.to_string())];
    }

    let failures: Vec<EvidenceToken> = present
        .iter()
        .filter(|(_, piece)| !haystack.contains(piece.as_str()))
        .map(|(label, _)| EvidenceToken::failure(*label))
        .collect();

    if failures.is_empty() {
        vec![EvidenceToken::ok()]
    } else {
        failures
    }
}
