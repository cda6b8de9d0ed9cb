//! CLI command definitions for kanjigen.
//!
//! Provides commands for batch generation, single-item generation, progress
//! inspection, and exporting the validated dataset.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::backend::{create_adapter, BackendKind};
use crate::catalog::{Catalog, Item};
use crate::pipeline::{BatchOrchestrator, GenerationConfig, RunReport};
use crate::prompt::PromptTemplate;
use crate::schema::SchemaVersion;
use crate::store::ResultStore;

/// Kanji explanation dataset generator driven by local LLM CLI backends.
#[derive(Parser)]
#[command(name = "kanjigen")]
#[command(about = "Generate structured kanji explanations via LLM CLI backends")]
#[command(version)]
#[command(
    long_about = "kanjigen walks a catalog of kyoiku kanji, asks an LLM CLI backend \
(claude or codex) for a structured explanation of each, validates the returned JSON \
against the record schema, and persists the outcomes to a resumable JSON database.\n\n\
Example usage:\n  kanjigen generate --backend codex --concurrency 3\n  kanjigen one 水\n  kanjigen status"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the batch pipeline over the whole catalog.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Generate a single kanji and print the stored result.
    One(OneArgs),

    /// Show per-status progress counts from the result store.
    Status(StatusArgs),

    /// Export validated records only, for the downstream renderer.
    Export(ExportArgs),
}

/// Arguments for the generate command.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Backend to invoke (claude, codex).
    #[arg(short = 'b', long, env = "KANJI_BACKEND", default_value = "claude")]
    pub backend: String,

    /// Maximum number of concurrent backend processes.
    #[arg(short = 'c', long, env = "KANJI_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Maximum number of items to process this run (0 = no limit).
    #[arg(short = 'n', long, default_value = "0")]
    pub limit: usize,

    /// Per-invocation timeout in seconds.
    #[arg(long, env = "KANJI_TIMEOUT_S")]
    pub timeout_secs: Option<u64>,

    /// Schema revision to validate against (1 or 2).
    #[arg(long, env = "KANJI_SCHEMA_VERSION")]
    pub schema_version: Option<String>,

    /// Model override passed through to the backend CLI.
    #[arg(short = 'm', long, env = "KANJI_MODEL")]
    pub model: Option<String>,

    /// Retry ceiling for timeouts, backend failures, and extraction misses.
    #[arg(long)]
    pub transient_retries: Option<u32>,

    /// Retry ceiling for schema-incomplete documents.
    #[arg(long)]
    pub validation_retries: Option<u32>,

    /// Retry ceiling for output that is not JSON at all.
    #[arg(long)]
    pub format_retries: Option<u32>,

    /// Result store database path.
    #[arg(long, default_value = "data/kanji_db_v2.json")]
    pub db: PathBuf,

    /// Catalog JSON path.
    #[arg(long, default_value = "data/kyoiku_kanji_2020_by_grade.json")]
    pub catalog: PathBuf,

    /// Prompt template path.
    #[arg(long, default_value = "prompts/kanji_explain_json.md")]
    pub prompt: PathBuf,

    /// Exit non-zero when the run ends with terminal failures.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub fail_on_error: bool,
}

/// Arguments for the one command.
#[derive(Parser, Debug)]
pub struct OneArgs {
    /// The kanji to generate.
    pub kanji: String,

    /// Backend to invoke (claude, codex).
    #[arg(short = 'b', long, env = "KANJI_BACKEND", default_value = "claude")]
    pub backend: String,

    /// Per-invocation timeout in seconds.
    #[arg(long, env = "KANJI_TIMEOUT_S")]
    pub timeout_secs: Option<u64>,

    /// Schema revision to validate against (1 or 2).
    #[arg(long, env = "KANJI_SCHEMA_VERSION")]
    pub schema_version: Option<String>,

    /// Model override passed through to the backend CLI.
    #[arg(short = 'm', long, env = "KANJI_MODEL")]
    pub model: Option<String>,

    /// Result store database path.
    #[arg(long, default_value = "data/kanji_db_v2.json")]
    pub db: PathBuf,

    /// Catalog JSON path, used to resolve the grade of the kanji.
    #[arg(long, default_value = "data/kyoiku_kanji_2020_by_grade.json")]
    pub catalog: PathBuf,

    /// Prompt template path.
    #[arg(long, default_value = "prompts/kanji_explain_json.md")]
    pub prompt: PathBuf,
}

/// Arguments for the status command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Result store database path.
    #[arg(long, default_value = "data/kanji_db_v2.json")]
    pub db: PathBuf,
}

/// Arguments for the export command.
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Result store database path.
    #[arg(long, default_value = "data/kanji_db_v2.json")]
    pub db: PathBuf,

    /// Output file for the validated-records map.
    #[arg(short = 'o', long, default_value = "data/kanji_validated.json")]
    pub out: PathBuf,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before
/// running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::One(args) => run_one_command(args).await,
        Commands::Status(args) => run_status_command(args).await,
        Commands::Export(args) => run_export_command(args).await,
    }
}

fn parse_backend(raw: &str) -> anyhow::Result<BackendKind> {
    raw.parse()
        .map_err(|e: String| anyhow::anyhow!("{} (expected: claude, codex)", e))
}

fn parse_schema_version(raw: Option<&str>) -> anyhow::Result<Option<SchemaVersion>> {
    raw.map(|s| {
        s.parse::<SchemaVersion>()
            .map_err(|e| anyhow::anyhow!("{} (expected: 1, 2)", e))
    })
    .transpose()
}

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let mut config = GenerationConfig::default()
        .with_backend(parse_backend(&args.backend)?)
        .with_limit(args.limit);
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(std::time::Duration::from_secs(secs));
    }
    if let Some(version) = parse_schema_version(args.schema_version.as_deref())? {
        config = config.with_schema_version(version);
    }
    config.model = args.model;
    if let Some(n) = args.transient_retries {
        config.transient_retries = n;
    }
    if let Some(n) = args.validation_retries {
        config.validation_retries = n;
    }
    if let Some(n) = args.format_retries {
        config.format_retries = n;
    }
    config.db_path = args.db;
    config.catalog_path = args.catalog;
    config.prompt_path = args.prompt;

    let catalog = Catalog::load(&config.catalog_path)?;
    let report = run_pipeline(config, &catalog).await?;
    print_report(&report);

    if report.has_terminal_failures() && args.fail_on_error {
        anyhow::bail!(
            "{} item(s) failed terminally; inspect the store or rerun with raised retry ceilings",
            report.failed_terminal
        );
    }
    Ok(())
}

async fn run_one_command(args: OneArgs) -> anyhow::Result<()> {
    let mut config = GenerationConfig::default().with_backend(parse_backend(&args.backend)?);
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(std::time::Duration::from_secs(secs));
    }
    if let Some(version) = parse_schema_version(args.schema_version.as_deref())? {
        config = config.with_schema_version(version);
    }
    config.model = args.model;
    config.db_path = args.db.clone();
    config.catalog_path = args.catalog;
    config.prompt_path = args.prompt;

    // Grade comes from the catalog when the kanji is in it; anything else is
    // recorded with grade 0.
    let item = match Catalog::load(&config.catalog_path) {
        Ok(catalog) => catalog.find(&args.kanji).cloned().unwrap_or_else(|| {
            warn!(kanji = %args.kanji, "Kanji not in catalog; recording with grade 0");
            Item {
                kanji: args.kanji.clone(),
                grade: 0,
            }
        }),
        Err(e) => {
            warn!(error = %e, "Catalog unavailable; recording with grade 0");
            Item {
                kanji: args.kanji.clone(),
                grade: 0,
            }
        }
    };

    let report = run_pipeline(config, &Catalog::from_items(vec![item])).await?;

    let store = ResultStore::open(&args.db)?;
    match store.get(&args.kanji) {
        Some(entry) => println!("{}", serde_json::to_string_pretty(entry)?),
        None => anyhow::bail!("No stored entry for {}", args.kanji),
    }
    if report.has_terminal_failures() {
        anyhow::bail!("Generation for {} failed terminally", args.kanji);
    }
    Ok(())
}

/// Shared setup for generate/one: adapter, template, store, orchestrator,
/// and a Ctrl-C handler wired to the cancellation channel.
async fn run_pipeline(config: GenerationConfig, catalog: &Catalog) -> anyhow::Result<RunReport> {
    let template = PromptTemplate::load(&config.prompt_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read prompt template {}: {}",
            config.prompt_path.display(),
            e
        )
    })?;
    let adapter = create_adapter(config.backend);
    let store = ResultStore::open(&config.db_path)?;

    let orchestrator = Arc::new(BatchOrchestrator::new(config, adapter, store, template));

    let shutdown = orchestrator.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; finishing in-flight items");
            let _ = shutdown.send(());
        }
    });

    Ok(orchestrator.run(catalog).await?)
}

fn print_report(report: &RunReport) {
    println!("\n=== Generation Run {} ===", report.run_id);
    println!("Succeeded:        {}", report.succeeded);
    println!("Retried:          {}", report.retried);
    println!("Failed terminal:  {}", report.failed_terminal);
    println!("Failed retryable: {}", report.failed_retryable);
    println!("Skipped:          {}", report.skipped);
    println!("Duration:         {:.1}s", report.duration.as_secs_f64());
}

async fn run_status_command(args: StatusArgs) -> anyhow::Result<()> {
    let store = ResultStore::open(&args.db)?;
    let counts = store.counts();

    println!("=== {} ===", args.db.display());
    println!("Total:            {}", counts.total);
    println!("Completed:        {}", counts.completed);
    println!("Pending:          {}", counts.pending);
    println!("Failed retryable: {}", counts.failed_retryable);
    println!("Failed terminal:  {}", counts.failed_terminal);
    Ok(())
}

async fn run_export_command(args: ExportArgs) -> anyhow::Result<()> {
    let store = ResultStore::open(&args.db)?;
    let view = store.validated();
    if view.is_empty() {
        warn!("No validated records to export");
    }

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&args.out, serde_json::to_string_pretty(&view)?)?;

    println!("Exported {} validated records to {}", view.len(), args.out.display());
    Ok(())
}
