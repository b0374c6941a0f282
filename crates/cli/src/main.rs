// ledgercheck CLI - reconcile a loan ledger against extracted document data

mod commands;
mod exit_codes;
mod tables;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use ledgercheck_recon::{DuplicatePolicy, ReconError};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_ERROR, EXIT_INPUT, EXIT_INVALID_CONFIG, EXIT_OUTPUT, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "ledgercheck")]
#[command(about = "Reconcile a loan ledger against data extracted from the loan documents")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a reference ledger against an extracted source table
    #[command(after_help = "\
Examples:
  ledgercheck run --reference ledger.xlsx --source extracted.csv --output evidence.xlsx
  ledgercheck run --reference ledger.csv --source extracted.csv > evidence.csv
  ledgercheck run --reference ledger.csv --source extracted.csv --json
  ledgercheck run --reference ledger.csv --source extracted.csv --strict --verbose-rates
  ledgercheck run --reference ledger.csv --source extracted.csv --report run.json --strict-exit")]
    Run {
        /// Reference (ledger) table: .csv, .tsv, .txt, .xlsx, .xls, .xlsb or .ods
        #[arg(long)]
        reference: PathBuf,

        /// Source (extracted) table
        #[arg(long)]
        source: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        /// Write the evidence table here (.csv or .xlsx); default is CSV on stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Print the JSON report to stdout instead of the CSV table
        #[arg(long)]
        json: bool,

        /// Write the JSON report to a file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Exit 6 when any cell is not clean
        #[arg(long)]
        strict_exit: bool,
    },

    /// Parse and validate the registry and settings without running
    #[command(after_help = "\
Examples:
  ledgercheck validate
  ledgercheck validate --registry loan-file.toml --settings strict.toml")]
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Check that source columns describing the same value agree
    #[command(after_help = "\
Examples:
  ledgercheck consistency --source extracted.csv
  ledgercheck consistency --source extracted.xlsx --strict --output checked.xlsx
  ledgercheck consistency --source extracted.csv --json")]
    Consistency {
        /// Source (extracted) table
        #[arg(long)]
        source: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        /// Write the annotated source table here (.csv or .xlsx); default is CSV on stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Print per-row results as JSON instead of the annotated table
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved field mapping registry
    #[command(after_help = "\
Examples:
  ledgercheck registry
  ledgercheck registry --registry loan-file.toml --json")]
    Registry {
        /// Registry TOML file (default: built-in)
        #[arg(long, env = "LEDGERCHECK_REGISTRY")]
        registry: Option<PathBuf>,

        /// Print the registry as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Registry and engine settings shared by every command that runs the engine.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Registry TOML file (default: built-in)
    #[arg(long, env = "LEDGERCHECK_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Engine settings TOML file
    #[arg(long, env = "LEDGERCHECK_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Start from strict settings (text threshold 0.99, rate tolerance 1e-6)
    #[arg(long)]
    pub strict: bool,

    /// Minimum similarity ratio for text fields, 0..1
    #[arg(long)]
    pub text_threshold: Option<f64>,

    /// Absolute tolerance between monthly rates
    #[arg(long)]
    pub rate_tolerance: Option<f64>,

    /// Append the resolved rate values to rate tokens
    #[arg(long)]
    pub verbose_rates: bool,

    /// How to resolve several source rows sharing a key: first | reject
    #[arg(long, value_name = "POLICY")]
    pub on_duplicate: Option<DuplicatePolicy>,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  ledgercheck-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            reference,
            source,
            config,
            output,
            json,
            report,
            strict_exit,
        } => commands::cmd_run(commands::RunArgs {
            reference,
            source,
            config,
            output,
            json,
            report,
            strict_exit,
        }),
        Commands::Validate { config } => commands::cmd_validate(&config),
        Commands::Consistency {
            source,
            config,
            output,
            json,
        } => commands::cmd_consistency(source, &config, output, json),
        Commands::Registry { registry, json } => commands::cmd_registry(registry, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("error: {}", e.message);
            }
            if let Some(hint) = &e.hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(e.code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(EXIT_INVALID_CONFIG, msg)
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT, msg)
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self::new(EXIT_OUTPUT, msg)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let message = err.to_string();
        match err {
            ReconError::ConfigParse(_)
            | ReconError::ConfigValidation(_)
            | ReconError::DuplicateDocument(_)
            | ReconError::DuplicateField { .. }
            | ReconError::InvalidSpec { .. } => Self::config(message),
            ReconError::MissingKeyColumn { table, .. } => {
                let hint = if table == "source" {
                    "set [source] key_column in the registry to the source table's key header"
                } else {
                    "set [reference] key_aliases or key_fragment in the registry"
                };
                Self::input(message).with_hint(hint)
            }
            ReconError::Table(_) => Self::input(message),
        }
    }
}
