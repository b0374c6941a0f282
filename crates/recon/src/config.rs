use serde::{Deserialize, Serialize};

use crate::error::ReconError;

pub const DEFAULT_TEXT_THRESHOLD: f64 = 0.70;
pub const DEFAULT_RATE_TOLERANCE: f64 = 0.001;
pub const DEFAULT_WINDOW_MONTHS: u32 = 3;

/// What to do when several source rows share a reference row's key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Take the first in source-table order.
    #[default]
    First,
    /// Mark the reference row `DUPLICATE_SOURCE` in every document column.
    Reject,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown duplicate policy '{other}' (expected first|reject)")),
        }
    }
}

/// Knobs consumed by the engine, passed in at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Minimum similarity ratio for `text` fields.
    pub text_threshold: f64,
    /// Absolute tolerance between monthly rate fractions.
    pub rate_tolerance: f64,
    /// Append resolved numeric values to rate tokens.
    pub verbose_rates: bool,
    pub disbursement_window_months: u32,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            text_threshold: DEFAULT_TEXT_THRESHOLD,
            rate_tolerance: DEFAULT_RATE_TOLERANCE,
            verbose_rates: false,
            disbursement_window_months: DEFAULT_WINDOW_MONTHS,
            duplicate_policy: DuplicatePolicy::First,
        }
    }
}

impl EngineConfig {
    /// Near-exact text and rate matching.
    pub fn strict() -> Self {
        Self {
            text_threshold: 0.99,
            rate_tolerance: 1e-6,
            ..Self::default()
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if !(0.0..=1.0).contains(&self.text_threshold) {
            return Err(ReconError::ConfigValidation(format!(
                "text_threshold must be within [0, 1], got {}",
                self.text_threshold
            )));
        }
        if !self.rate_tolerance.is_finite() || self.rate_tolerance < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "rate_tolerance must be a non-negative number, got {}",
                self.rate_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.text_threshold, 0.70);
        assert_eq!(c.rate_tolerance, 0.001);
        assert!(!c.verbose_rates);
        assert_eq!(c.disbursement_window_months, 3);
        assert_eq!(c.duplicate_policy, DuplicatePolicy::First);
    }

    #[test]
    fn parse_partial_settings() {
        let c = EngineConfig::from_toml(
            r#"
text_threshold = 0.85
verbose_rates = true
duplicate_policy = "reject"
"#,
        )
        .unwrap();
        assert_eq!(c.text_threshold, 0.85);
        assert_eq!(c.rate_tolerance, DEFAULT_RATE_TOLERANCE);
        assert!(c.verbose_rates);
        assert_eq!(c.duplicate_policy, DuplicatePolicy::Reject);
    }

    #[test]
    fn empty_settings_are_defaults() {
        assert_eq!(EngineConfig::from_toml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn reject_out_of_range_threshold() {
        let err = EngineConfig::from_toml("text_threshold = 1.5").unwrap_err();
        assert!(err.to_string().contains("text_threshold"));
    }

    #[test]
    fn reject_negative_tolerance() {
        let err = EngineConfig::from_toml("rate_tolerance = -0.1").unwrap_err();
        assert!(err.to_string().contains("rate_tolerance"));
    }

    #[test]
    fn reject_unknown_setting() {
        assert!(EngineConfig::from_toml("tolerancia_texto = 0.7").is_err());
    }

    #[test]
    fn strict_tightens_both_knobs() {
        let s = EngineConfig::strict();
        assert!(s.text_threshold > DEFAULT_TEXT_THRESHOLD);
        assert!(s.rate_tolerance < DEFAULT_RATE_TOLERANCE);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn duplicate_policy_from_str() {
        assert_eq!("reject".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Reject);
        assert!("last".parse::<DuplicatePolicy>().is_err());
    }
}
