//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the parts-catalog harvester.

use anyhow::{Context, Result};
use catalog_harvest::config::{load_config_with_hash, Config};
use catalog_harvest::consolidate::ConsolidationReport;
use catalog_harvest::output::{print_query_result, print_search_results, print_stats, HarvestStats};
use catalog_harvest::storage::{open_storage, Storage};
use catalog_harvest::Harvester;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: an incremental, polite parts-catalog harvester
///
/// Without flags, seeds the ledger, fetches every pending or failed listing
/// page, and merges replacement rows. The flags below add passes to the run;
/// --stats, --query and --search only read the database and exit.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "An incremental, polite parts-catalog harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Move failed URLs back to pending before crawling
    #[arg(long)]
    reset_failed: bool,

    /// Re-fetch every completed listing page and pick up missing parts
    #[arg(long)]
    rescrape: bool,

    /// Download diagram images that have no local file yet
    #[arg(long)]
    download_images: bool,

    /// Run every consolidation pass
    #[arg(long)]
    consolidate: bool,

    /// Rebuild part tags
    #[arg(long)]
    tags: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["query", "search"])]
    stats: bool,

    /// Run a SQL query against the database, print the rows and exit
    #[arg(long, value_name = "SQL", conflicts_with_all = ["stats", "search"])]
    query: Option<String>,

    /// Full-text search over parts and exit
    #[arg(long, value_name = "TEXT", conflicts_with_all = ["stats", "query"])]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.stats {
        return handle_stats(&config);
    }
    if let Some(sql) = &cli.query {
        return handle_query(&config, sql);
    }
    if let Some(text) = &cli.search {
        return handle_search(&config, text);
    }

    handle_harvest(config, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> Result<catalog_harvest::SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    open_storage(path).with_context(|| format!("failed to open database {}", path.display()))
}

/// Handles the --stats mode
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);
    let storage = open_database(config)?;
    let stats = HarvestStats::collect(&storage).context("failed to collect statistics")?;
    print_stats(&stats);
    Ok(())
}

/// Handles the --query mode
fn handle_query(config: &Config, sql: &str) -> Result<()> {
    let storage = open_database(config)?;
    let result = storage
        .execute_query(sql)
        .with_context(|| format!("query failed: {}", sql))?;
    print_query_result(&result);
    Ok(())
}

/// Handles the --search mode
fn handle_search(config: &Config, text: &str) -> Result<()> {
    let storage = open_database(config)?;
    let parts = storage
        .search_parts(text)
        .with_context(|| format!("search failed: {}", text))?;
    print_search_results(text, &parts);
    Ok(())
}

/// Handles the harvest run and any extra passes requested by flags
async fn handle_harvest(config: Config, cli: &Cli) -> Result<()> {
    tracing::info!(
        "Catalog root: {} ({} seeds)",
        config.catalog.base_url,
        config.catalog.seeds.len()
    );

    let mut harvester = Harvester::new(config).context("failed to start harvester")?;

    if cli.reset_failed {
        harvester.reset_failed()?;
    }

    harvester.seed()?;
    let crawl = harvester.crawl_pending().await?;

    if cli.rescrape {
        harvester.rescrape_completed().await?;
    }

    let replacements = harvester.merge_replacements()?;
    if !replacements.unmerged.is_empty() {
        tracing::warn!(
            "{} replacement rows have no preceding part and were left in place",
            replacements.unmerged.len()
        );
    }

    if cli.download_images {
        let images = harvester.download_images().await?;
        if images.failed > 0 {
            tracing::warn!("{} images failed to download", images.failed);
        }
    }

    if cli.consolidate {
        let report = harvester.consolidate()?;
        log_consolidation(&report);
    }

    if cli.tags {
        let report = harvester.regenerate_tags()?;
        for (tag, count) in report.most_common(20) {
            tracing::info!("  {}: {} parts", tag, count);
        }
    }

    let stats = HarvestStats::collect(harvester.storage())?;
    tracing::info!(
        "Harvest finished: {} of {} listing URLs failed this run; {} parts in {} diagrams",
        crawl.failed,
        crawl.attempted,
        stats.parts,
        stats.diagrams
    );
    Ok(())
}

fn log_consolidation(report: &ConsolidationReport) {
    tracing::info!(
        "Consolidation: {} ids renamed, {} merged; {} names cleaned; {} image files removed; {} diagrams merged; {} replacement rows merged",
        report.identifiers.renamed,
        report.identifiers.merged,
        report.names.subgroups + report.names.diagrams,
        report.images.removed,
        report.diagrams.merged,
        report.replacements.merged
    );
    for unmerged in &report.replacements.unmerged {
        tracing::warn!(
            "Unmerged replacement row {} ({})",
            unmerged.id,
            unmerged.part_number
        );
    }
}
