//! skilltag CLI - proficiency-level tagging of course skills.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use skilltag::{App, Config, RunContext, SchemaKind};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "skilltag")]
#[command(version)]
#[command(about = "Tag course skills with proficiency levels against a sector taxonomy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload both files and run the full tagging pipeline
    Run {
        /// Path to the taxonomy (SFW) CSV file
        #[arg(long)]
        sfw: PathBuf,

        /// Path to the sector course listing CSV file
        #[arg(long)]
        sector: PathBuf,
    },

    /// Resume an interrupted tagging run from its checkpoint
    Resume,

    /// Validate an upload without storing it
    Validate {
        /// Schema to validate against: sfw or sector
        #[arg(long)]
        schema: String,

        /// Path to the CSV file
        #[arg(long)]
        file: PathBuf,
    },

    /// Validate configuration file
    CheckConfig,

    /// Delete every stored artifact
    Reset {
        /// Required confirmation flag
        #[arg(long)]
        yes: bool,
    },

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# skilltag configuration file

[inference]
# API key (can also use the env var named by api_key_env)
# api_key = "sk-..."
api_key_env = "SKILLTAG_API_KEY"
base_url = "https://api.openai.com/v1"
model = "gpt-4o"
timeout_secs = 180
max_retries = 3
temperature = 0.1
max_tokens = 1024

[storage]
# "local" or "s3"
backend = "local"
root = "./data"
# bucket = "my-bucket"       # required for s3
# region = "ap-southeast-1"
# endpoint = "http://localhost:9000"
reset_pace_ms = 25

[pipeline]
sector = "Human Resources"
sector_alias = "hr"
pool_size = 10
max_rows = 50000
"#;
    println!("{example}");
}

fn parse_schema(name: &str) -> Result<SchemaKind> {
    match name.to_lowercase().as_str() {
        "sfw" => Ok(SchemaKind::Sfw),
        "sector" => Ok(SchemaKind::Sector),
        other => anyhow::bail!("unknown schema '{other}', expected 'sfw' or 'sector'"),
    }
}

fn base_name(path: &PathBuf) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string())
}

fn print_stats(stats: &skilltag::RunStats) {
    println!("\n=== Tagging Complete ===");
    println!("Pairs:          {}", stats.total_pairs);
    println!("Out of sector:  {}", stats.out_of_sector);
    println!("Missing text:   {}", stats.missing_text);
    println!("Rescue tried:   {}", stats.rescued_attempted);
    println!("Rescued:        {}", stats.rescued_resolved);
    println!("Valid tags:     {}", stats.total_valid);
    println!("Unresolved:     {}", stats.total_invalid);
    println!("Throughput:     {:.0}/hr", stats.throughput_per_hour);
    println!("Runtime:        {:.1}s", stats.runtime_secs);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::CheckConfig => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            config
                .resolve_api_key()
                .context("Failed to resolve API key")?;

            info!("Configuration is valid");
            info!("  Sector: {} ({})", config.pipeline.sector, config.pipeline.sector_alias);
            info!("  Model: {}", config.inference.model);
            info!("  Pool size: {}", config.pipeline.pool_size);
            return Ok(());
        }

        Commands::Validate { schema, file } => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            let kind = parse_schema(&schema)?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {file:?}"))?;

            let dataset = std::sync::Arc::new(skilltag::Dataset::from_csv_bytes(&bytes)?);
            let report =
                skilltag::validation::validate(dataset, kind, config.pipeline.max_rows).await;

            if report.is_valid {
                println!("{file:?} passes all checks");
            } else {
                println!("{file:?} failed validation:");
                for failure in &report.failures {
                    println!("  {}: {}", failure.check, failure.message);
                }
                std::process::exit(1);
            }
        }

        Commands::Run { sfw, sector } => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            let app = App::new(config)?;

            for (kind, path) in [(SchemaKind::Sfw, &sfw), (SchemaKind::Sector, &sector)] {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read {path:?}"))?;
                let receipt = app.submit_upload(kind, &base_name(path), &bytes).await?;
                if !receipt.accepted() {
                    println!("{path:?} failed validation:");
                    for failure in &receipt.report.failures {
                        println!("  {}: {}", failure.check, failure.message);
                    }
                    std::process::exit(1);
                }
                if receipt.preprocessed {
                    info!("Normalized list-form skill titles in {path:?}");
                }
            }

            let artifacts = app.start_tagging().await?;
            print_stats(&artifacts.stats);
            println!("Valid:          {}", artifacts.valid_file);
            println!("Unresolved:     {}", artifacts.invalid_file);
            println!("All tags:       {}", artifacts.all_file);
        }

        Commands::Resume => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            let app = App::new(config)?;

            let artifacts = app.resume_tagging().await?;
            print_stats(&artifacts.stats);
            println!("Valid:          {}", artifacts.valid_file);
            println!("Unresolved:     {}", artifacts.invalid_file);
            println!("All tags:       {}", artifacts.all_file);
        }

        Commands::Reset { yes } => {
            if !yes {
                anyhow::bail!("refusing to reset storage without --yes");
            }
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            let app = App::new(config)?;

            let deleted = app
                .reset_storage(RunContext {
                    reset_permitted: true,
                })
                .await?;
            println!("Deleted {deleted} stored files");
        }
    }

    Ok(())
}
