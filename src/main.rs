//! Catalog ingestion command-line entry point.
//!
//! Reads crawl records as JSON Lines and persists them.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use catalog_ingest::config::EmbeddingSettings;
use catalog_ingest::embeddings::{EmbeddingGateway, PlaceholderProvider};
use catalog_ingest::ingest::Pipeline;
use catalog_ingest::storage::{init_storage, table_counts, Database};
use catalog_ingest::telemetry::{init_metrics, init_tracing, render_metrics};
use catalog_ingest::{Config, Result};
use clap::{Parser, Subcommand};

/// Crawl record ingestion with change-gated embeddings
#[derive(Parser, Debug)]
#[command(name = "catalog-ingest")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the `SQLite` database
    #[arg(short, long, env = "CATALOG_DATABASE", default_value = "./data/catalog.db")]
    database: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CATALOG_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "CATALOG_LOG_JSON")]
    log_json: bool,

    /// Azure `OpenAI` API key
    #[arg(long, env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
    azure_api_key: Option<String>,

    /// Azure `OpenAI` resource endpoint
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
    azure_endpoint: Option<String>,

    /// Azure `OpenAI` API version
    #[arg(long, env = "AZURE_OPENAI_API_VERSION")]
    azure_api_version: Option<String>,

    /// Embedding deployment name
    #[arg(long, env = "AZURE_OPENAI_EMBEDDING_DEPLOYMENT")]
    azure_deployment: Option<String>,

    /// Expected embedding length
    #[arg(long, env = "CATALOG_EMBEDDING_DIM", default_value = "1536")]
    embedding_dim: usize,

    /// Per-request embedding timeout in seconds
    #[arg(long, env = "CATALOG_EMBEDDING_TIMEOUT_SECS", default_value = "30")]
    embedding_timeout_secs: u64,

    /// Retries for throttled or failing embedding requests
    #[arg(long, env = "CATALOG_EMBEDDING_MAX_RETRIES", default_value = "2")]
    embedding_max_retries: usize,

    /// Use deterministic offline embeddings instead of the Azure service
    #[arg(long)]
    placeholder_embeddings: bool,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the schema and exit
    Migrate,

    /// Ingest JSON Lines records
    Ingest {
        /// Input file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    /// Print row counts as JSON
    Stats,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            database_path: self.database.clone(),
            log_level: self.log_level.clone(),
            embedding: EmbeddingSettings {
                api_key: self.azure_api_key.clone(),
                endpoint: self.azure_endpoint.clone(),
                api_version: self.azure_api_version.clone(),
                deployment: self.azure_deployment.clone(),
                dimensions: self.embedding_dim,
                timeout: Duration::from_secs(self.embedding_timeout_secs),
                max_attempts: self.embedding_max_retries + 1,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);
    init_metrics();

    tracing::info!("catalog-ingest v{} starting", env!("CARGO_PKG_VERSION"));

    let config = cli.config();
    tracing::debug!(?config, "Configuration loaded");
    config.validate()?;

    let result = run(&cli, &config).await;

    if cli.print_metrics {
        eprint!("{}", render_metrics());
    }
    result
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Command::Migrate => {
            let db = Database::open(&config.database_path)?;
            init_storage(&db)?;
            db.close();
        }
        Command::Ingest { input } => {
            let mut pipeline = if cli.placeholder_embeddings {
                let provider = PlaceholderProvider::new(config.embedding.dimensions);
                let gateway = EmbeddingGateway::new(Arc::new(provider));
                Pipeline::new(Database::open(&config.database_path)?, gateway)?
            } else {
                Pipeline::start(config)?
            };

            let reader: Box<dyn BufRead> = if input == "-" {
                Box::new(io::stdin().lock())
            } else {
                Box::new(BufReader::new(File::open(input)?))
            };

            pipeline.ingest_lines(reader).await?;
            let stats = pipeline.finish();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Stats => {
            let db = Database::open(&config.database_path)?;
            init_storage(&db)?;
            let counts = db.with_conn(table_counts)?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
            db.close();
        }
    }
    Ok(())
}
