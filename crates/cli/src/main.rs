use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use market_warehouse_core::{ConfigLoader, PipelineConfig};

mod commands;

use commands::{ExtractArgs, LakeStatusArgs, LoadArgs, ServeArgs};

#[derive(Parser)]
#[command(name = "market-warehouse")]
#[command(about = "Polymarket Gamma extraction, lake and star-schema warehouse", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Pipeline.toml")]
    config: PathBuf,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the Gamma API and land each collection in the lake
    Extract(ExtractArgs),
    /// Load the landed tables into the warehouse
    Load(LoadArgs),
    /// Extract, then load the latest lake versions
    Run {
        #[command(flatten)]
        extract: ExtractArgs,
        /// Snapshot date of the fact rows (default: today, UTC)
        #[arg(long, value_name = "YYYY-MM-DD")]
        snapshot_date: Option<chrono::NaiveDate>,
        /// Load into an in-memory warehouse; the lake is still written
        #[arg(long)]
        dry_run: bool,
    },
    /// Create the warehouse tables
    InitSchema,
    /// Show versions and sizes of the lake tables
    LakeStatus(LakeStatusArgs),
    /// Check warehouse integrity
    Validate,
    /// Start the read-only HTTP API
    Serve(ServeArgs),
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Runs one command; `Ok(false)` means it finished but a step failed.
async fn dispatch(command: Commands, config: &PipelineConfig) -> Result<bool> {
    match command {
        Commands::Extract(args) => {
            let outcomes = commands::run_extract(config, &args).await?;
            commands::print_extract_summary(&outcomes);
            Ok(commands::all_succeeded(&outcomes))
        }
        Commands::Load(args) => {
            let (report, failures) = commands::run_load(config, &args).await?;
            commands::print_load_summary(&report, &failures);
            Ok(failures.is_empty() && report.is_success())
        }
        Commands::Run {
            extract,
            snapshot_date,
            dry_run,
        } => {
            let outcomes = commands::run_extract(config, &extract).await?;
            commands::print_extract_summary(&outcomes);
            let load = LoadArgs {
                lake_version: None,
                snapshot_date,
                dry_run,
            };
            let (report, failures) = commands::run_load(config, &load).await?;
            commands::print_load_summary(&report, &failures);
            Ok(commands::all_succeeded(&outcomes) && failures.is_empty() && report.is_success())
        }
        Commands::InitSchema => {
            commands::run_init_schema(config).await?;
            Ok(true)
        }
        Commands::LakeStatus(args) => {
            commands::run_lake_status(config, &args).await?;
            Ok(true)
        }
        Commands::Validate => Ok(commands::run_validate(config).await?.is_ok()),
        Commands::Serve(args) => {
            commands::run_serve(config, &args).await?;
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    let config = match ConfigLoader::load(Some(cli.config.as_path())) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // The pipeline runs strictly in sequence; only the API server uses
    // worker threads.
    let runtime = match cli.command {
        Commands::Serve(_) => tokio::runtime::Builder::new_multi_thread().enable_all().build(),
        _ => tokio::runtime::Builder::new_current_thread().enable_all().build(),
    };
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(cli.command, &config)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            tracing::warn!("Finished with failures");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            ExitCode::FAILURE
        }
    }
}
