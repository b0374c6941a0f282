//! Canonical forms for raw cell values.
//!
//! Every function here is total: unparseable input degrades to a cleaned
//! string (or `None` for rates) instead of failing.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Three-letter month codes used by the upstream documents.
const MONTH_CODES: [(&str, u32); 12] = [
    ("ENE", 1),
    ("FEB", 2),
    ("MAR", 3),
    ("ABR", 4),
    ("MAY", 5),
    ("JUN", 6),
    ("JUL", 7),
    ("AGO", 8),
    ("SEP", 9),
    ("OCT", 10),
    ("NOV", 11),
    ("DIC", 12),
];

/// Two-digit years below this pivot land in the 2000s.
const TWO_DIGIT_YEAR_PIVOT: i32 = 70;

/// Magnitude from which an unmarked rate is read as effective annual.
const UNMARKED_ANNUAL_FLOOR: f64 = 0.05;

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Drop combining marks after canonical decomposition ("Pérez" -> "Perez").
pub fn strip_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Header form used for case/accent-insensitive column lookup.
pub fn normalize_header(h: &str) -> String {
    strip_accents(h).trim().to_uppercase()
}

/// Uppercase, accent-free, single-spaced text. Blank input yields "".
pub fn normalize_text(v: &str) -> String {
    strip_accents(v)
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Integer string for an identifier or amount.
///
/// Handles exponent notation (`1.5E9`), grouping separators in either locale
/// (`1.234,00`, `1,234.00`, `12 345`) and leading zeros. Input that still
/// does not parse comes back cleaned of separators.
pub fn normalize_number(v: &str) -> String {
    let s = v.trim();
    if s.is_empty() {
        return String::new();
    }

    if s.contains(['e', 'E']) {
        if let Ok(f) = s.replace(',', ".").parse::<f64>() {
            if f.is_finite() {
                return render_integer(f.trunc());
            }
        }
    }

    let cleaned = strip_grouping(s);
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() => render_integer(f.round()),
        _ => cleaned,
    }
}

fn render_integer(f: f64) -> String {
    if f == 0.0 {
        // avoids "-0"
        return "0".to_string();
    }
    format!("{f:.0}")
}

/// Remove whitespace and grouping marks, rewriting the decimal mark (if any) to `.`.
fn strip_grouping(s: &str) -> String {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let dots = compact.matches('.').count();
    let commas = compact.matches(',').count();

    let decimal = match (dots, commas) {
        (0, 0) => None,
        (_, 0) => single_separator_decimal(&compact, '.', dots),
        (0, _) => single_separator_decimal(&compact, ',', commas),
        _ => {
            let last_dot = compact.rfind('.');
            let last_comma = compact.rfind(',');
            Some(if last_dot > last_comma { '.' } else { ',' })
        }
    };

    let mut out = String::with_capacity(compact.len());
    for c in compact.chars() {
        match c {
            '.' | ',' if Some(c) == decimal => out.push('.'),
            '.' | ',' => {}
            _ => out.push(c),
        }
    }
    out
}

/// A lone separator followed by exactly three digits groups thousands,
/// unless the integer part is zero ("0.125").
fn single_separator_decimal(s: &str, sep: char, count: usize) -> Option<char> {
    if count > 1 {
        return None;
    }
    let (head, tail) = s.split_once(sep)?;
    let head_digits = head.trim_start_matches(['-', '+']);
    let groups_thousands = tail.len() == 3
        && tail.chars().all(|c| c.is_ascii_digit())
        && !head_digits.is_empty()
        && head_digits.chars().any(|c| c != '0');
    if groups_thousands {
        None
    } else {
        Some(sep)
    }
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

struct DatePatterns {
    month_code: Regex,
    day_first: Regex,
    year_first: Regex,
}

fn date_patterns() -> &'static DatePatterns {
    static PATTERNS: OnceLock<DatePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| DatePatterns {
        month_code: Regex::new(r"^(\d{1,2})/([A-Z]{3})/(\d{2,4})(?:[\sT].*)?$")
            .expect("static regex"),
        day_first: Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2,4})(?:[\sT].*)?$")
            .expect("static regex"),
        year_first: Regex::new(r"^(\d{4})/(\d{1,2})/(\d{1,2})(?:[\sT].*)?$")
            .expect("static regex"),
    })
}

fn clean_date(v: &str) -> String {
    strip_accents(v.trim()).to_uppercase().replace('-', "/")
}

fn expand_year(raw: &str) -> Option<i32> {
    let y: i32 = raw.parse().ok()?;
    match raw.len() {
        2 if y < TWO_DIGIT_YEAR_PIVOT => Some(2000 + y),
        2 => Some(1900 + y),
        4 => Some(y),
        _ => None,
    }
}

fn month_from_code(code: &str) -> Option<u32> {
    MONTH_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, m)| *m)
}

fn date_from_cleaned(up: &str) -> Option<NaiveDate> {
    let p = date_patterns();

    if let Some(c) = p.month_code.captures(up) {
        let day: u32 = c[1].parse().ok()?;
        let month = month_from_code(&c[2])?;
        let year = expand_year(&c[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if let Some(c) = p.year_first.captures(up) {
        let year: i32 = c[1].parse().ok()?;
        let month: u32 = c[2].parse().ok()?;
        let day: u32 = c[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if let Some(c) = p.day_first.captures(up) {
        let day: u32 = c[1].parse().ok()?;
        let month: u32 = c[2].parse().ok()?;
        let year = expand_year(&c[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    None
}

/// Calendar date for `18-ENE-1941`, `18/01/1941`, `1941-01-18` and the same
/// shapes with a trailing time component.
pub fn parse_date(v: &str) -> Option<NaiveDate> {
    date_from_cleaned(&clean_date(v))
}

/// `DD/MM/YYYY` when recognizable, otherwise the cleaned input.
pub fn normalize_date(v: &str) -> String {
    let up = clean_date(v);
    match date_from_cleaned(&up) {
        Some(d) => d.format("%d/%m/%Y").to_string(),
        None => up,
    }
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

fn rate_number() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"-?(?:\d+(?:\.\d*)?|\.\d+)").expect("static regex"))
}

/// Rate as a fraction: `"1,94%"` -> 0.0194, `"0.0194"` -> 0.0194.
///
/// Magnitudes above 1 are read as percent.
pub fn parse_rate(v: &str) -> Option<f64> {
    let s = v.trim().replace(',', ".");
    let token = rate_number().find(&s)?;
    let value: f64 = token.as_str().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if value > 1.0 { value / 100.0 } else { value })
}

/// Compounding basis declared in a rate's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateBasis {
    EffectiveAnnual,
    Monthly,
    NominalAnnual,
    Unmarked,
}

impl RateBasis {
    pub fn detect(v: &str) -> Self {
        let up = normalize_text(v);
        let words: Vec<&str> = up
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| !w.is_empty())
            .collect();

        let monthly = words
            .iter()
            .any(|w| w.starts_with("MES") || w.ends_with("MV") || *w == "MENSUAL");
        let annual = words.iter().any(|w| w.contains("ANUAL"));
        // "EFECTIVA" alone names no period: "efectiva mensual" is monthly.
        let effective = words.iter().any(|w| *w == "EFECTIVA") && (annual || !monthly);

        if up.contains("E.A") || words.iter().any(|w| *w == "EA") || effective {
            Self::EffectiveAnnual
        } else if monthly {
            Self::Monthly
        } else if annual || words.iter().any(|w| w.starts_with("NOM")) {
            Self::NominalAnnual
        } else {
            Self::Unmarked
        }
    }
}

/// Effective monthly fraction for a rate whose basis may or may not be tagged.
pub fn to_monthly_rate(v: &str) -> Option<f64> {
    let p = parse_rate(v)?;
    let monthly = match RateBasis::detect(v) {
        RateBasis::EffectiveAnnual => effective_annual_to_monthly(p),
        RateBasis::Monthly => p,
        RateBasis::NominalAnnual => p / 12.0,
        RateBasis::Unmarked if p >= UNMARKED_ANNUAL_FLOOR => effective_annual_to_monthly(p),
        RateBasis::Unmarked => p,
    };
    Some(monthly)
}

fn effective_annual_to_monthly(p: f64) -> f64 {
    (1.0 + p).powf(1.0 / 12.0) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_strips_accents_and_spaces() {
        assert_eq!(normalize_text("  María   Pérez gómez "), "MARIA PEREZ GOMEZ");
        assert_eq!(normalize_text("Ñoño"), "NONO");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn header_is_case_and_accent_insensitive() {
        assert_eq!(normalize_header(" Operación "), "OPERACION");
        assert_eq!(normalize_header("Fecha  Nacimiento"), "FECHA  NACIMIENTO");
    }

    #[test]
    fn number_grouping_locales() {
        assert_eq!(normalize_number("1.234,00"), "1234");
        assert_eq!(normalize_number("1,234.00"), "1234");
        assert_eq!(normalize_number("1.234"), "1234");
        assert_eq!(normalize_number("12 345"), "12345");
        assert_eq!(normalize_number("1.234.567"), "1234567");
        assert_eq!(normalize_number("1234"), "1234");
    }

    #[test]
    fn number_exponent_and_zeros() {
        assert_eq!(normalize_number("1.5E9"), "1500000000");
        assert_eq!(normalize_number("1,5e9"), "1500000000");
        assert_eq!(normalize_number("000123"), "123");
        assert_eq!(normalize_number("1234567890.0"), "1234567890");
        assert_eq!(normalize_number("-0"), "0");
    }

    #[test]
    fn number_rounds_fractions() {
        assert_eq!(normalize_number("10.5"), "11");
        assert_eq!(normalize_number("0.125"), "0");
        assert_eq!(normalize_number("2,4"), "2");
    }

    #[test]
    fn number_fallback_keeps_cleaned_text() {
        assert_eq!(normalize_number("AB-12.345"), "AB-12345");
        assert_eq!(normalize_number("none"), "none");
        assert_eq!(normalize_number(""), "");
    }

    #[test]
    fn date_month_codes() {
        assert_eq!(normalize_date("18-ENE-1941"), "18/01/1941");
        assert_eq!(normalize_date("5/dic/2023"), "05/12/2023");
        assert_eq!(normalize_date("01-AGO-24"), "01/08/2024");
    }

    #[test]
    fn date_numeric_shapes() {
        assert_eq!(normalize_date("18/01/1941"), "18/01/1941");
        assert_eq!(normalize_date("1941-01-18"), "18/01/1941");
        assert_eq!(normalize_date("2024-06-15 00:00:00"), "15/06/2024");
        assert_eq!(normalize_date("2024-06-15T08:30:00"), "15/06/2024");
        assert_eq!(normalize_date("3-4-2024"), "03/04/2024");
    }

    #[test]
    fn date_unparseable_returns_cleaned() {
        assert_eq!(normalize_date("sin fecha"), "SIN FECHA");
        assert_eq!(normalize_date("31-02-2024"), "31/02/2024");
        assert_eq!(normalize_date("18-XYZ-1941"), "18/XYZ/1941");
        assert!(parse_date("31/02/2024").is_none());
    }

    #[test]
    fn parse_date_returns_calendar_date() {
        let d = parse_date("18-ENE-1941").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(1941, 1, 18).unwrap());
        assert_eq!(parse_date("1941-01-18"), Some(d));
        assert_eq!(parse_date("70-01-01"), None);
        assert_eq!(parse_date("01/01/70"), NaiveDate::from_ymd_opt(1970, 1, 1));
    }

    #[test]
    fn rate_percent_and_fraction() {
        assert!((parse_rate("1.94%").unwrap() - 0.0194).abs() < 1e-12);
        assert!((parse_rate("1,94 %").unwrap() - 0.0194).abs() < 1e-12);
        assert!((parse_rate("0.0194").unwrap() - 0.0194).abs() < 1e-12);
        assert!((parse_rate("25.97% E.A.").unwrap() - 0.2597).abs() < 1e-12);
        assert_eq!(parse_rate("N/A"), None);
        assert_eq!(parse_rate(""), None);
    }

    #[test]
    fn rate_basis_markers() {
        assert_eq!(RateBasis::detect("25.97% EA"), RateBasis::EffectiveAnnual);
        assert_eq!(RateBasis::detect("25.97% E.A."), RateBasis::EffectiveAnnual);
        assert_eq!(RateBasis::detect("Tasa efectiva anual 25%"), RateBasis::EffectiveAnnual);
        assert_eq!(RateBasis::detect("1.9% MV"), RateBasis::Monthly);
        assert_eq!(RateBasis::detect("1.9% mes vencido"), RateBasis::Monthly);
        assert_eq!(RateBasis::detect("2% efectiva mensual"), RateBasis::Monthly);
        assert_eq!(RateBasis::detect("25% efectiva anual"), RateBasis::EffectiveAnnual);
        assert_eq!(RateBasis::detect("25% efectiva"), RateBasis::EffectiveAnnual);
        assert_eq!(RateBasis::detect("24% nominal anual"), RateBasis::NominalAnnual);
        assert_eq!(RateBasis::detect("1.94%"), RateBasis::Unmarked);
        assert_eq!(RateBasis::detect("LINEAL 2%"), RateBasis::Unmarked);
    }

    #[test]
    fn monthly_rate_conversion() {
        let m = to_monthly_rate("25.97% EA").unwrap();
        assert!((m - 0.0194).abs() < 1e-4, "got {m}");

        let unmarked = to_monthly_rate("25.97").unwrap();
        assert!((unmarked - m).abs() < 1e-12);

        let nominal = to_monthly_rate("24% NOMINAL ANUAL").unwrap();
        assert!((nominal - 0.02).abs() < 1e-12);

        let monthly = to_monthly_rate("1.94% MV").unwrap();
        assert!((monthly - 0.0194).abs() < 1e-12);

        let effective_monthly = to_monthly_rate("2% efectiva mensual").unwrap();
        assert!((effective_monthly - 0.02).abs() < 1e-12, "got {effective_monthly}");

        let effective_annual = to_monthly_rate("25% efectiva anual").unwrap();
        assert!((effective_annual - (1.25f64.powf(1.0 / 12.0) - 1.0)).abs() < 1e-12);

        let small = to_monthly_rate("1.94%").unwrap();
        assert!((small - 0.0194).abs() < 1e-12);

        assert_eq!(to_monthly_rate("sin tasa"), None);
    }
}
