//! Bricksync Ingest - Rebrickable data update tool

use anyhow::{Context, Result};
use bricksync_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use bricksync_common::DataDirs;
use bricksync_ingest::loader::{self, Loader};
use bricksync_ingest::statements::StatementGenerator;
use bricksync_ingest::{DatabaseConfig, IngestConfig, IngestPipeline};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "bricksync-ingest")]
#[command(author, version, about = "Rebrickable data update tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding temp/, sql_output/ and logs/
    #[arg(long, global = true, default_value = ".", env = "BRICKSYNC_ROOT")]
    root: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download, generate and load everything
    Run,

    /// Download and decompress the required files only
    Fetch,

    /// Generate statement files from staged CSV files
    Generate,

    /// Execute statement files and rebuild the summary tables
    Load,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let dirs = DataDirs::under(&cli.root);

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Both)
        .log_dir(dirs.logs())
        .log_file_prefix("data_update")
        .filter_directives("sqlx=warn,hyper=info,html5ever=info,selectors=info")
        .build()
        .with_env_overrides()?;

    dirs.ensure()?;
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Run => {
            let db = DatabaseConfig::from_env()?;
            info!("Starting LEGO data update process...");
            info!(database = %db, "Database connection");

            let pipeline = IngestPipeline::new(IngestConfig::from_env(), dirs)?;
            let report = pipeline.run(|| loader::connect(&db)).await?;

            for skipped in &report.acquisition.skipped {
                warn!(file = %skipped.file, reason = %skipped.reason, "File was skipped");
            }
            info!(
                acquired = report.acquisition.acquired.len(),
                statement_files = report.statement_files.len(),
                inserted = report.load.inserted_rows(),
                failed = report.load.failed_statements(),
                "Data update process completed"
            );
        },
        Command::Fetch => {
            let pipeline = IngestPipeline::new(IngestConfig::from_env(), dirs)?;
            let report = pipeline.acquire().await?;
            info!(
                strategy = report.strategy,
                acquired = report.acquired.len(),
                skipped = report.skipped.len(),
                "Fetch completed"
            );
        },
        Command::Generate => {
            let produced = StatementGenerator::new(dirs).generate_all()?;
            for file in &produced {
                info!(table = file.table, statements = file.statements, path = %file.path.display(), "Statement file ready");
            }
        },
        Command::Load => {
            let db = DatabaseConfig::from_env()?;
            let mut conn = loader::connect(&db)
                .await
                .with_context(|| format!("Failed to connect to {}", db))?;
            let loader = Loader::new(dirs);
            let files = loader.statement_files()?;
            let report = loader.load(&mut conn, &files).await?;
            info!(
                executed = report.executed_statements(),
                inserted = report.inserted_rows(),
                failed = report.failed_statements(),
                "Load completed"
            );
        },
    }

    Ok(())
}
