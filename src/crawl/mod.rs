//! Crawl module: turns a live wiki into a stored snapshot
//!
//! Fetching is latency-bound, so pages are scraped by a pool of parallel
//! workers; the store only ever sees one writer, which drains a shared queue
//! sequentially. See [`orchestrator`] for the full protocol.

mod orchestrator;

pub use orchestrator::{CrawlReport, Orchestrator, PageFailure, WriteJob};

use crate::config::Config;
use crate::Result;

/// Takes a complete snapshot of the configured site
///
/// Purges any existing snapshot data first: a snapshot is a full, self-
/// consistent generation, and an interrupted crawl leaves an invalid one.
pub async fn take_snapshot(config: Config) -> Result<CrawlReport> {
    let orchestrator = Orchestrator::new(config)?;
    orchestrator.take().await
}
