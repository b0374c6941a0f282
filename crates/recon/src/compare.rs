use similar::{DiffOp, TextDiff};

use crate::config::EngineConfig;
use crate::normalize::{normalize_date, normalize_number, normalize_text, parse_date, to_monthly_rate};
use crate::registry::ValueType;

/// Spreadsheet exports spell an empty cell in several ways.
const NULL_SENTINELS: &[&str] = &["NAN", "NAT", "NONE", "NULL"];

/// True for absent cells, whitespace-only cells and null sentinels.
pub fn is_blank(v: Option<&str>) -> bool {
    match v {
        None => true,
        Some(s) => {
            let s = s.trim();
            s.is_empty() || NULL_SENTINELS.iter().any(|n| s.eq_ignore_ascii_case(n))
        }
    }
}

/// Longest-common-subsequence ratio `2*M / (len(a) + len(b))`, in `[0, 1]`.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let diff = TextDiff::from_chars(a, b);
    let matched: usize = diff
        .ops()
        .iter()
        .map(|op| match *op {
            DiffOp::Equal { len, .. } => len,
            _ => 0,
        })
        .sum();
    // `TextDiff::ratio` is f32; an exact 0.7 would land just below a 0.70 threshold.
    let total = a.chars().count() + b.chars().count();
    2.0 * matched as f64 / total as f64
}

/// Type-dispatched equality. Both values are assumed non-blank.
pub fn compare(a: &str, b: &str, value_type: ValueType, config: &EngineConfig) -> bool {
    match value_type {
        ValueType::Number => normalize_number(a) == normalize_number(b),
        ValueType::Date => match (parse_date(a), parse_date(b)) {
            (Some(da), Some(db)) => da == db,
            _ => normalize_date(a) == normalize_date(b),
        },
        ValueType::Text => {
            similarity_ratio(&normalize_text(a), &normalize_text(b)) >= config.text_threshold
        }
        ValueType::Rate => match (to_monthly_rate(a), to_monthly_rate(b)) {
            (Some(ra), Some(rb)) => (ra - rb).abs() <= config.rate_tolerance,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some("")));
        assert!(is_blank(Some("   ")));
        assert!(is_blank(Some("nan")));
        assert!(is_blank(Some("NaT")));
        assert!(is_blank(Some(" None ")));
        assert!(!is_blank(Some("0")));
        assert!(!is_blank(Some("NANCY")));
    }

    #[test]
    fn ratio_bounds() {
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("ABC", "ABC"), 1.0);
        assert_eq!(similarity_ratio("ABC", "XYZ"), 0.0);
        let r = similarity_ratio("PEREZ", "PERES");
        assert!(r > 0.7 && r < 1.0);
    }

    #[test]
    fn ratio_at_threshold_passes() {
        assert_eq!(similarity_ratio("ABCDEFGHIJ", "ABCDEFGXYZ"), 0.7);
        let c = EngineConfig::default();
        assert!(compare("ABCDEFGHIJ", "ABCDEFGXYZ", ValueType::Text, &c));
        assert!(!compare("ABCDEFGHIJ", "ABCDEFXYZW", ValueType::Text, &c));
    }

    #[test]
    fn numbers_compare_after_normalization() {
        let c = EngineConfig::default();
        assert!(compare("1.234,00", "1234", ValueType::Number, &c));
        assert!(compare("1.5E9", "1500000000", ValueType::Number, &c));
        assert!(compare("00123", "123", ValueType::Number, &c));
        assert!(!compare("1234", "1235", ValueType::Number, &c));
    }

    #[test]
    fn dates_compare_as_calendar_days() {
        let c = EngineConfig::default();
        assert!(compare("18/01/1941", "1941-01-18", ValueType::Date, &c));
        assert!(compare("18-ENE-1941", "18/01/1941", ValueType::Date, &c));
        assert!(!compare("18/01/1941", "19/01/1941", ValueType::Date, &c));
        // unparseable on both sides falls back to the cleaned strings
        assert!(compare("sin fecha", "SIN FECHA", ValueType::Date, &c));
    }

    #[test]
    fn text_threshold_is_configurable() {
        let loose = EngineConfig::default();
        let strict = EngineConfig::strict();
        assert!(compare("MARIA PEREZ GOMEZ", "MARIA  PÉREZ GOMÉZ", ValueType::Text, &loose));
        assert!(compare("MARIA PEREZ GOMEZ", "MARIA PERES GOMES", ValueType::Text, &loose));
        assert!(!compare("MARIA PEREZ GOMEZ", "MARIA PERES GOMES", ValueType::Text, &strict));
        assert!(!compare("MARIA PEREZ", "JUAN RODRIGUEZ", ValueType::Text, &loose));
    }

    #[test]
    fn rates_compare_monthly_within_tolerance() {
        let c = EngineConfig::default();
        assert!(compare("1.94%", "25.97% EA", ValueType::Rate, &c));
        assert!(compare("2% MV", "24% NOM", ValueType::Rate, &c));
        assert!(!compare("1%", "3%", ValueType::Rate, &c));
        assert!(!compare("abc", "1%", ValueType::Rate, &c));
    }
}
