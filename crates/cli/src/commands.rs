//! `ledgercheck run | validate | consistency | registry`.

use std::io::Write;
use std::path::{Path, PathBuf};

use ledgercheck_recon::consistency::{annotate, check_source_consistency, ConsistencyStatus};
use ledgercheck_recon::registry::FieldSpec;
use ledgercheck_recon::{assemble_table, EngineConfig, Reconciler, Registry, Table};
use serde::Serialize;
use tracing::info;

use crate::exit_codes::EXIT_FINDINGS;
use crate::tables::{read_table, write_table};
use crate::{CliError, ConfigArgs};

pub struct RunArgs {
    pub reference: PathBuf,
    pub source: PathBuf,
    pub config: ConfigArgs,
    pub output: Option<PathBuf>,
    pub json: bool,
    pub report: Option<PathBuf>,
    pub strict_exit: bool,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn load_registry(path: Option<&Path>) -> Result<Registry, CliError> {
    let registry = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                CliError::config(format!("cannot read registry {}: {e}", path.display()))
            })?;
            Registry::from_toml(&text)?
        }
        None => Registry::builtin()?,
    };
    info!(
        registry = %registry.name,
        documents = registry.documents.len(),
        specs = registry.spec_count(),
        "registry loaded"
    );
    Ok(registry)
}

/// Settings file (or defaults), then `--strict`, then explicit flags.
fn load_settings(args: &ConfigArgs) -> Result<EngineConfig, CliError> {
    let mut config = match &args.settings {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                CliError::config(format!("cannot read settings {}: {e}", path.display()))
            })?;
            EngineConfig::from_toml(&text)?
        }
        None => EngineConfig::default(),
    };

    if args.strict {
        let strict = EngineConfig::strict();
        config.text_threshold = strict.text_threshold;
        config.rate_tolerance = strict.rate_tolerance;
    }
    if let Some(threshold) = args.text_threshold {
        config.text_threshold = threshold;
    }
    if let Some(tolerance) = args.rate_tolerance {
        config.rate_tolerance = tolerance;
    }
    if args.verbose_rates {
        config.verbose_rates = true;
    }
    if let Some(policy) = args.on_duplicate {
        config.duplicate_policy = policy;
    }

    config.validate().map_err(|e| CliError::args(e.to_string()))?;
    Ok(config)
}

fn load_table(path: &Path, role: &str) -> Result<Table, CliError> {
    let table = read_table(path)
        .map_err(|e| CliError::input(format!("cannot read {role} table {}: {e}", path.display())))?;
    info!(role, path = %path.display(), rows = table.len(), columns = table.headers().len(), "table loaded");
    Ok(table)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn write_stdout(text: &str) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    out.write_all(text.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| CliError::output(format!("cannot write to stdout: {e}")))
}

/// Table to `output`, or CSV on stdout.
fn emit_table(table: &Table, output: Option<&Path>) -> Result<(), CliError> {
    match output {
        Some(path) => {
            write_table(path, table)
                .map_err(|e| CliError::output(format!("cannot write {}: {e}", path.display())))?;
            eprintln!("wrote {}", path.display());
            Ok(())
        }
        None => {
            let text = table.to_csv_string().map_err(|e| CliError::runtime(e.to_string()))?;
            write_stdout(&text)
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let registry = load_registry(args.config.registry.as_deref())?;
    let config = load_settings(&args.config)?;
    let reference = load_table(&args.reference, "reference")?;
    let source = load_table(&args.source, "source")?;

    let result = Reconciler::new(&registry, &config).run(&reference, &source)?;
    let evidence = assemble_table(&reference, &result);

    if args.output.is_some() || !args.json {
        emit_table(&evidence, args.output.as_deref())?;
    }

    if args.json || args.report.is_some() {
        let json = to_json(&result)?;
        if let Some(path) = &args.report {
            std::fs::write(path, &json)
                .map_err(|e| CliError::output(format!("cannot write report {}: {e}", path.display())))?;
            eprintln!("wrote {}", path.display());
        }
        if args.json {
            write_stdout(&json)?;
            write_stdout("\n")?;
        }
    }

    let s = &result.summary;
    eprintln!(
        "{} rows: {} matched, {} not found, {} duplicate-rejected, {} clean",
        s.total_rows, s.matched, s.not_found, s.duplicate_rejected, s.clean_rows,
    );

    if args.strict_exit && s.has_findings() {
        let failures: usize = s.documents.iter().map(|d| d.failures).sum();
        return Err(CliError::new(
            EXIT_FINDINGS,
            format!(
                "{} of {} rows are not clean ({} field failures)",
                s.total_rows - s.clean_rows,
                s.total_rows,
                failures
            ),
        ));
    }
    Ok(())
}

pub fn cmd_validate(args: &ConfigArgs) -> Result<(), CliError> {
    let registry = load_registry(args.registry.as_deref())?;
    let config = load_settings(args)?;

    println!(
        "ok: registry '{}': {} documents, {} specs, {} consistency blocks",
        registry.name,
        registry.documents.len(),
        registry.spec_count(),
        registry.consistency.len()
    );
    println!(
        "ok: settings: text_threshold {}, rate_tolerance {}, window {} months, duplicates {}",
        config.text_threshold,
        config.rate_tolerance,
        config.disbursement_window_months,
        config.duplicate_policy
    );
    Ok(())
}

#[derive(Serialize)]
struct ConsistencyRow<'a> {
    row: usize,
    status: ConsistencyStatus,
    failed_blocks: &'a [String],
}

pub fn cmd_consistency(
    source_path: PathBuf,
    args: &ConfigArgs,
    output: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let registry = load_registry(args.registry.as_deref())?;
    let config = load_settings(args)?;
    if registry.consistency.is_empty() {
        return Err(CliError::config(format!(
            "registry '{}' declares no [[consistency]] blocks",
            registry.name
        )));
    }
    let source = load_table(&source_path, "source")?;

    let results = check_source_consistency(&source, &registry.consistency, &config);

    if json {
        let rows: Vec<ConsistencyRow<'_>> = results
            .iter()
            .enumerate()
            .map(|(row, r)| ConsistencyRow {
                row,
                status: r.status,
                failed_blocks: &r.failed_blocks,
            })
            .collect();
        write_stdout(&to_json(&rows)?)?;
        write_stdout("\n")?;
        if let Some(path) = output.as_deref() {
            emit_table(&annotate(&source, &results), Some(path))?;
        }
    } else {
        emit_table(&annotate(&source, &results), output.as_deref())?;
    }

    let failing = results
        .iter()
        .filter(|r| r.status == ConsistencyStatus::WithErrors)
        .count();
    eprintln!("{} rows: {} consistent, {} with errors", results.len(), results.len() - failing, failing);
    Ok(())
}

pub fn cmd_registry(path: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let registry = load_registry(path.as_deref())?;

    if json {
        write_stdout(&to_json(&registry)?)?;
        return write_stdout("\n");
    }

    let mut out = String::new();
    out.push_str(&format!(
        "registry: {} ({} documents, {} specs)\n",
        registry.name,
        registry.documents.len(),
        registry.spec_count()
    ));
    out.push_str(&format!(
        "keys: reference {:?} (fragment {:?}), source {:?}\n",
        registry.reference.key_aliases,
        registry.reference.key_fragment.as_deref().unwrap_or("-"),
        registry.source.key_column
    ));
    for document in &registry.documents {
        out.push_str(&format!("\n{}\n", document.name));
        for field in &document.fields {
            for spec in &field.specs {
                out.push_str(&format!("  {:<24} {}\n", field.name, describe_spec(spec)));
            }
        }
    }
    if !registry.consistency.is_empty() {
        out.push_str("\nconsistency blocks\n");
        for block in &registry.consistency {
            out.push_str(&format!(
                "  {:<24} {:<6} {}\n",
                block.name,
                block.value_type.to_string(),
                block.columns.join(", ")
            ));
        }
    }
    write_stdout(&out)
}

fn describe_spec(spec: &FieldSpec) -> String {
    let mut line = format!("{:<6} {}", spec.value_type.to_string(), spec.source_column);
    if let Some(secondary) = &spec.source_column_secondary {
        line.push_str(&format!(" vs {secondary}"));
    }
    if let Some(rule) = spec.special_rule {
        line.push_str(&format!(" [{rule}]"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgercheck_recon::registry::{SpecialRule, ValueType};
    use ledgercheck_recon::DuplicatePolicy;

    #[test]
    fn flags_override_settings() {
        let args = ConfigArgs {
            strict: true,
            rate_tolerance: Some(0.01),
            on_duplicate: Some(DuplicatePolicy::Reject),
            ..ConfigArgs::default()
        };
        let config = load_settings(&args).unwrap();
        assert_eq!(config.text_threshold, 0.99);
        assert_eq!(config.rate_tolerance, 0.01);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
    }

    #[test]
    fn settings_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "text_threshold = 0.8\nverbose_rates = true\n").unwrap();
        let args = ConfigArgs {
            settings: Some(path),
            text_threshold: Some(0.9),
            ..ConfigArgs::default()
        };
        let config = load_settings(&args).unwrap();
        assert_eq!(config.text_threshold, 0.9);
        assert!(config.verbose_rates);
    }

    #[test]
    fn out_of_range_threshold_is_usage_error() {
        let args = ConfigArgs {
            text_threshold: Some(1.5),
            ..ConfigArgs::default()
        };
        let err = load_settings(&args).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_USAGE);
    }

    #[test]
    fn spec_descriptions() {
        let rate = FieldSpec::new("amortizacion_tasa_interes", ValueType::Rate)
            .with_rule(SpecialRule::RateTolerance);
        assert_eq!(describe_spec(&rate), "rate   amortizacion_tasa_interes [rate_tolerance]");
        let cross = FieldSpec::cross("a", "b", ValueType::Number);
        assert_eq!(describe_spec(&cross), "number a vs b");
    }
}
