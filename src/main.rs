//! CLI entry point for the lexgraph pipeline.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use lexgraph_core::{
    BatchExecutor, CatalogParser, Database, DetailProcessor, DiscoveryProcessor, DocumentStore,
    JsonCatalogParser, PipelineConfig, RelationsProcessor, TextExtractor, Utf8TextExtractor,
};
use tracing::{debug, info};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    let db = Database::new(&args.db).await?;
    let store = DocumentStore::new(db);

    info!(db = %args.db.display(), "lexgraph starting");

    match args.command {
        Command::Discover => {
            run_discovery(&config, &store).await?;
        }
        Command::Detail => {
            run_detail(&config, &store).await?;
        }
        Command::Relations => {
            run_relations(&config, &store).await?;
        }
        Command::Run => {
            run_discovery(&config, &store).await?;
            run_detail(&config, &store).await?;
            run_relations(&config, &store).await?;
        }
    }

    let total = store.count_documents(None).await?;
    let edges = store.count_relations().await?;
    info!(documents = total, relations = edges, "lexgraph finished");

    Ok(())
}

async fn run_discovery(config: &PipelineConfig, store: &DocumentStore) -> Result<()> {
    let parser: Arc<dyn CatalogParser> = Arc::new(JsonCatalogParser);
    let processor = DiscoveryProcessor::new(config, parser)?;
    let executor = BatchExecutor::for_phase(config, &config.discovery_batch);
    let stats = executor.run(&processor, store).await?;
    info!(
        categories = stats.processed,
        failed = stats.failed,
        "discovery finished"
    );
    Ok(())
}

async fn run_detail(config: &PipelineConfig, store: &DocumentStore) -> Result<()> {
    let extractor: Arc<dyn TextExtractor> = Arc::new(Utf8TextExtractor);
    let processor = DetailProcessor::new(config, extractor)?;
    let executor = BatchExecutor::for_phase(config, &config.detail_batch);
    let stats = executor.run(&processor, store).await?;
    info!(
        documents = stats.processed,
        succeeded = stats.succeeded,
        failed = stats.failed,
        skipped = stats.skipped,
        "detail finished"
    );
    Ok(())
}

async fn run_relations(config: &PipelineConfig, store: &DocumentStore) -> Result<()> {
    let processor = RelationsProcessor::new();
    let executor = BatchExecutor::for_phase(config, &config.relations_batch);
    let stats = executor.run(&processor, store).await?;
    info!(
        documents = stats.processed,
        succeeded = stats.succeeded,
        "relations finished"
    );
    Ok(())
}
