//! Binary entry point for the eventlens CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Index a source tree and save a snapshot
//! eventlens index src --out eventlens.snapshot.json
//!
//! # Extract facts from a tree or a snapshot
//! eventlens facts src --config eventlens.json
//! eventlens facts --snapshot eventlens.snapshot.json --config eventlens.json
//!
//! # Inspect resolved member types
//! eventlens types src --class 'App\Order\PlaceOrder' --method __invoke
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use eventlens::cli::{open_index, run_facts, run_index, run_types, IndexSource};
use eventlens::config::AnalysisConfig;
use eventlens::error::{EventlensError, OutputErrorCode};
use eventlens::output::{emit_response, ErrorResponse};

// ============================================================================
// CLI Structure
// ============================================================================

/// Static type inference and architectural fact extraction for PHP.
///
/// All responses are JSON on stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "eventlens", version, about = "Architectural fact extraction for PHP")]
struct Cli {
    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a source tree and list its units.
    Index {
        /// Source root.
        root: PathBuf,
        /// Write a snapshot of the index to this file.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Exclude paths matching this glob (repeatable).
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Extract domain facts.
    Facts {
        /// Source root.
        root: Option<PathBuf>,
        /// Read the index from a snapshot instead of parsing sources.
        #[arg(long, conflicts_with = "root")]
        snapshot: Option<PathBuf>,
        /// Collector configuration (JSON).
        #[arg(long)]
        config: PathBuf,
    },
    /// Show the resolved types of a unit's members.
    Types {
        /// Source root.
        root: Option<PathBuf>,
        /// Read the index from a snapshot instead of parsing sources.
        #[arg(long, conflicts_with = "root")]
        snapshot: Option<PathBuf>,
        /// Fully-qualified class, interface or trait name.
        #[arg(long)]
        class: String,
        /// Only this method (and its parameters).
        #[arg(long)]
        method: Option<String>,
        /// Exclude paths matching this glob (repeatable).
        #[arg(long)]
        exclude: Vec<String>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.log_level);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON, like every other response
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<(), EventlensError> {
    match cli.command {
        Command::Index { root, out, exclude } => {
            let response = run_index(&root, out.as_deref(), &exclude)?;
            emit(&response)
        }
        Command::Facts {
            root,
            snapshot,
            config,
        } => {
            let config = AnalysisConfig::load(&config)?;
            let source = IndexSource::from_args(root.as_deref(), snapshot.as_deref())?;
            let index = open_index(source, &config.exclude)?;
            let report = run_facts(&index, &config)?;
            emit(&report)
        }
        Command::Types {
            root,
            snapshot,
            class,
            method,
            exclude,
        } => {
            let source = IndexSource::from_args(root.as_deref(), snapshot.as_deref())?;
            let index = open_index(source, &exclude)?;
            let response = run_types(&index, &class, method.as_deref())?;
            emit(&response)
        }
    }
}

fn emit<T: serde::Serialize>(response: &T) -> Result<(), EventlensError> {
    emit_response(response, &mut io::stdout())
        .map_err(|e| EventlensError::internal(e.to_string()))?;
    let _ = io::stdout().flush();
    Ok(())
}
