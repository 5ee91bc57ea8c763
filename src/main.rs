//! Wikisnap main entry point
//!
//! Command-line interface for taking and inspecting wiki snapshots.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wikisnap::config::{load_config, Config};
use wikisnap::crawl::take_snapshot;
use wikisnap::{Snapshot, SnapshotStore};

/// Wikisnap: a point-in-time wiki snapshotter
///
/// Wikisnap crawls a Wikidot-style wiki and stores every page's HTML,
/// revision history, votes, discussion thread and tags in a single SQLite
/// database, which can then be queried offline.
#[derive(Parser, Debug)]
#[command(name = "wikisnap")]
#[command(version = "1.0.0")]
#[command(about = "A point-in-time wiki snapshotter", long_about = None)]
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

    /// Show a page from an existing snapshot and exit
    #[arg(long, value_name = "URL", conflicts_with = "stats")]
    page: Option<String>,

    /// Show statistics from an existing snapshot and exit
    #[arg(long, conflicts_with = "page")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    if let Some(url) = cli.page {
        handle_page(&config, &url)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_snapshot(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("wikisnap=info,warn"),
            1 => EnvFilter::new("wikisnap=debug,info"),
            2 => EnvFilter::new("wikisnap=trace,debug"),
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

/// Handles the --page mode: prints one page from an existing snapshot
fn handle_page(config: &Config, url: &str) -> anyhow::Result<()> {
    let snapshot = Snapshot::open(&config.output.database_path, &config.site.base_url)?;
    let page = snapshot.page(url);

    if !page.exists()? {
        anyhow::bail!("page {} is not in the snapshot", page.url());
    }

    println!("URL:      {}", page.url());
    println!("Title:    {}", page.title()?);
    println!("Rating:   {}", page.rating()?);
    println!("Tags:     {}", page.tags()?.join(", "));
    if let Some(author) = page.author()? {
        println!("Author:   {}", author);
    }
    if let Some(first) = page.history()?.first() {
        println!("Created:  {}", first.time);
    }
    println!("Revisions: {}", page.history()?.len());
    println!("Comments:  {}", page.comments()?.len());

    let children = page.children()?;
    if !children.is_empty() {
        println!("Children:");
        for child in children {
            println!("  - {}", child);
        }
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from an existing snapshot
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = SnapshotStore::open(std::path::Path::new(&config.output.database_path))?;
    println!("Pages:  {}", store.count_pages()?);
    println!("Images: {}", store.images()?.len());

    Ok(())
}

/// Handles the default mode: takes a full snapshot of the configured site
async fn handle_snapshot(config: Config) -> anyhow::Result<()> {
    tracing::info!("Taking a snapshot of {}", config.site.base_url);

    let report = take_snapshot(config).await?;

    println!("Pages saved: {}/{}", report.pages_saved, report.pages_total);
    if report.failure_count() > 0 {
        println!(
            "Failures:    {} page(s), {} dropped write(s)",
            report.page_failures.len(),
            report.write_failures
        );
        for failure in &report.page_failures {
            tracing::warn!("failed page {}: {}", failure.url, failure.error);
        }
    }

    Ok(())
}
