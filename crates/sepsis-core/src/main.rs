//! Sepsis Validation Core - cohort statistics from the command line
//!
//! The main entry point for sepsis-core, handling:
//! - Operating characteristics of thresholded severity scores
//! - AUROC comparison tables with agreement and DeLong tests
//! - Cohort characteristics, whole or split

use clap::{Args, Parser, Subcommand};
use sepsis_common::{format_error_human, Error, OutputFormat};
use sepsis_core::cli::{
    run_auc, run_demographics, run_ops, AucArgs, DemographicsArgs, OpsArgs, RunContext,
    OUTPUT_SCHEMA_VERSION,
};
use sepsis_core::config::{load_config, ConfigOptions, CONFIG_SCHEMA_VERSION};
use sepsis_core::data::RowFilter;
use sepsis_core::exit_codes::ExitCode;
use sepsis_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Sepsis Validation Core - validation statistics for sepsis cohorts
#[derive(Parser)]
#[command(name = "sepsis-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (JSON); defaults to SEPSIS_CONFIG, then the XDG config dir
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Exclusion expression, e.g. "excluded = 0 and age >= 16"
    #[arg(long, global = true)]
    filter: Option<String>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sensitivity, specificity, PPV and NPV of thresholded predictions
    Ops(OpsArgs),

    /// AUROC table with agreement and paired comparisons
    Auc(AucArgs),

    /// Cohort characteristics, optionally split into two groups
    Demographics(DemographicsArgs),

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    let log_config = LogConfig::from_env(cli_level, cli.global.log_format);
    init_logging(&log_config);

    let run_id = generate_run_id();
    let span = tracing::info_span!("run", run_id = %run_id);
    let exit_code = span.in_scope(|| match &cli.command {
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
        Commands::Ops(args) => {
            with_context(&cli.global, &run_id, |ctx, out| run_ops(ctx, args, out))
        }
        Commands::Auc(args) => {
            with_context(&cli.global, &run_id, |ctx, out| run_auc(ctx, args, out))
        }
        Commands::Demographics(args) => with_context(&cli.global, &run_id, |ctx, out| {
            run_demographics(ctx, args, out)
        }),
    });

    debug!(code = exit_code.as_i32(), name = exit_code.code_name(), "exiting");
    std::process::exit(exit_code.as_i32());
}

/// Resolve config and filter, run `command` against stdout and map the
/// outcome onto an exit code.
fn with_context<F>(global: &GlobalOpts, run_id: &str, command: F) -> ExitCode
where
    F: FnOnce(&RunContext, &mut dyn Write) -> sepsis_common::Result<()>,
{
    let resolved = match load_config(&ConfigOptions {
        config_path: global.config.clone(),
    }) {
        Ok(resolved) => resolved,
        Err(err) => return report_error(global, &Error::from(err)),
    };
    if let Some(path) = &resolved.path {
        info!(
            path = %path.display(),
            hash = resolved.hash.as_deref().unwrap_or("-"),
            "loaded config"
        );
    }

    let filter = match global.filter.as_deref().map(RowFilter::parse).transpose() {
        Ok(filter) => filter,
        Err(err) => {
            report_error(global, &err);
            return ExitCode::ArgsError;
        }
    };

    let ctx = RunContext::new(resolved, run_id)
        .with_filter(filter)
        .with_format(global.format);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = command(&ctx, &mut out).and_then(|()| out.flush().map_err(Error::from));
    match result {
        Ok(()) => ExitCode::Clean,
        Err(err) => report_error(global, &err),
    }
}

fn report_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    error!(code = err.code(), category = %err.category(), error = %err, "command failed");
    let use_color = !global.no_color && std::io::stderr().is_terminal();
    eprintln!("{}", format_error_human(err, use_color));
    ExitCode::from_error(err)
}

fn print_version(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Json => {
            let version_info = serde_json::json!({
                "sepsis_core_version": env!("CARGO_PKG_VERSION"),
                "output_schema_version": OUTPUT_SCHEMA_VERSION,
                "config_schema_version": CONFIG_SCHEMA_VERSION,
                "rust_version": env!("CARGO_PKG_RUST_VERSION"),
            });
            println!("{}", version_info);
        }
        OutputFormat::Text => {
            println!("sepsis-core {}", env!("CARGO_PKG_VERSION"));
            println!("output schema version: {}", OUTPUT_SCHEMA_VERSION);
            println!("config schema version: {}", CONFIG_SCHEMA_VERSION);
        }
    }
}
