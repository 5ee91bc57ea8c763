//! Crawl orchestration: parallel fetch workers, one serialized writer
//!
//! The full page-URL list is partitioned round-robin across a fixed pool of
//! fetch workers. Each worker builds one page's record bundle through the
//! connector and enqueues write jobs onto a single FIFO queue; exactly one
//! writer task applies them to the snapshot store. Workers signal completion
//! with a sentinel job, and the writer exits only after receiving every
//! worker's sentinel — per-sender FIFO ordering guarantees every job a
//! worker enqueued has already been delivered by then, so no job can be
//! lost to a drain/liveness race.

use crate::config::Config;
use crate::connector::{parse, WikidotConnector};
use crate::store::{ForumPost, PageRecord, Revision, SnapshotStore, TagRecord, Vote};
use crate::{Result, WikisnapError};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// One unit of work for the serialized writer
#[derive(Debug)]
pub enum WriteJob {
    Page(PageRecord),
    Revisions(Vec<Revision>),
    Votes(Vec<Vote>),
    ForumPosts(Vec<ForumPost>),
    Tags(Vec<TagRecord>),
    /// Sentinel: one fetch worker has finished producing
    Done,
}

/// A page that could not be scraped; the crawl continued without it
#[derive(Debug, Clone)]
pub struct PageFailure {
    pub url: String,
    pub error: String,
}

/// Summary of a completed crawl
#[derive(Debug)]
pub struct CrawlReport {
    pub pages_total: usize,
    pub pages_saved: usize,
    pub page_failures: Vec<PageFailure>,
    pub write_failures: usize,
    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn failure_count(&self) -> usize {
        self.page_failures.len() + self.write_failures
    }
}

/// What one worker produced over its URL partition
#[derive(Debug, Default)]
struct WorkerReport {
    saved: usize,
    failures: Vec<PageFailure>,
}

/// Main crawl orchestrator
pub struct Orchestrator {
    config: Config,
    connector: Arc<WikidotConnector>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Result<Self> {
        let connector = Arc::new(WikidotConnector::new(&config.site.base_url)?);
        Ok(Self { config, connector })
    }

    /// Runs the full snapshot protocol
    ///
    /// 1. Purge the store.
    /// 2. Materialize the complete URL list (failures here are fatal).
    /// 3. Partition URLs round-robin across the worker pool.
    /// 4. Workers scrape pages and enqueue write jobs; per-page failures are
    ///    recorded and skipped.
    /// 5. The single writer drains the queue until all sentinels arrive.
    /// 6. The auxiliary image and author scrapes run once, sequentially.
    pub async fn take(&self) -> Result<CrawlReport> {
        let started = Instant::now();
        let worker_count = self.config.crawler.worker_count;

        let mut store = SnapshotStore::open(Path::new(&self.config.output.database_path))?;
        store.set_chunk_size(self.config.crawler.write_chunk_size);
        store.purge_all()?;

        let urls = self.connector.list_all_pages().await?;
        let pages_total = urls.len();
        tracing::info!(
            "Enumerated {} pages, crawling with {} workers",
            pages_total,
            worker_count
        );

        let (tx, rx) = mpsc::unbounded_channel();

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let partition: Vec<String> = urls
                .iter()
                .skip(i)
                .step_by(worker_count)
                .cloned()
                .collect();
            let connector = Arc::clone(&self.connector);
            let tx = tx.clone();
            workers.push(tokio::spawn(run_worker(connector, partition, tx)));
        }
        drop(tx);

        let writer = tokio::spawn(run_writer(store, rx, worker_count));

        let mut pages_saved = 0;
        let mut page_failures = Vec::new();
        for worker in workers {
            let report = worker.await.map_err(|e| {
                WikisnapError::Crawl(format!("fetch worker panicked: {}", e))
            })?;
            pages_saved += report.saved;
            page_failures.extend(report.failures);
        }

        let (mut store, write_failures) = writer.await.map_err(|e| {
            WikisnapError::Crawl(format!("writer task panicked: {}", e))
        })?;

        self.scrape_auxiliary_tables(&mut store).await;

        let elapsed = started.elapsed();
        let report = CrawlReport {
            pages_total,
            pages_saved,
            page_failures,
            write_failures,
            elapsed,
        };

        let secs = elapsed.as_secs();
        tracing::info!(
            "Snapshot successfully taken. [{:02}:{:02}:{:02}] {} pages saved, {} failures",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60,
            report.pages_saved,
            report.failure_count()
        );

        Ok(report)
    }

    /// Scrapes the image whitelist and author-override tables
    ///
    /// These run after all page writes are committed, non-concurrently, and
    /// are individually non-fatal.
    async fn scrape_auxiliary_tables(&self, store: &mut SnapshotStore) {
        if let Some(url) = &self.config.site.image_whitelist_url {
            tracing::info!("Downloading image metadata.");
            match self.connector.scrape_images(url).await {
                Ok(images) => {
                    if let Err(e) = store.insert_images(&images) {
                        tracing::error!("Failed to store image metadata: {}", e);
                    }
                }
                Err(e) => tracing::error!("Failed to scrape image whitelist: {}", e),
            }
        }

        if let Some(url) = &self.config.site.author_overrides_url {
            tracing::info!("Downloading author metadata.");
            match self.connector.scrape_authors(url).await {
                Ok(authors) => {
                    if let Err(e) = store.insert_authors(&authors) {
                        tracing::error!("Failed to store author metadata: {}", e);
                    }
                }
                Err(e) => tracing::error!("Failed to scrape author overrides: {}", e),
            }
        }
    }
}

/// Scrapes every URL in one worker's partition
///
/// A failure on one URL is logged and recorded, and the worker moves on to
/// its next URL; per-page failure is never fatal to the crawl.
async fn run_worker(
    connector: Arc<WikidotConnector>,
    urls: Vec<String>,
    tx: UnboundedSender<WriteJob>,
) -> WorkerReport {
    let mut report = WorkerReport::default();
    for url in urls {
        match scrape_page(&connector, &url, &tx).await {
            Ok(true) => report.saved += 1,
            Ok(false) => {} // missing page, already logged
            Err(e) => {
                tracing::error!("Failed to save page {}: {}", url, e);
                report.failures.push(PageFailure {
                    url,
                    error: e.to_string(),
                });
            }
        }
    }
    // The sentinel must be this worker's last send.
    let _ = tx.send(WriteJob::Done);
    report
}

/// Builds one page's record bundle and enqueues it
///
/// Jobs for a page are enqueued in the order page, revisions, votes, forum
/// posts, tags; no order is guaranteed across different pages' bundles.
/// Returns `Ok(false)` when the page itself is absent.
async fn scrape_page(
    connector: &WikidotConnector,
    url: &str,
    tx: &UnboundedSender<WriteJob>,
) -> Result<bool> {
    tracing::info!("Saving page: {}", url);

    let Some(html) = connector.get_page_html(url).await? else {
        tracing::warn!("Page {} is empty and will not be saved.", url);
        return Ok(false);
    };

    let page_id = parse::parse_page_id(&html);
    let thread_id = parse::parse_discussion_id(&html);
    let content = parse::parse_main_content(&html).ok_or_else(|| WikisnapError::MalformedPage {
        url: url.to_string(),
        message: "no main-content element".to_string(),
    })?;

    let tags: Vec<TagRecord> = parse::parse_tags(&content)
        .into_iter()
        .map(|tag| TagRecord {
            url: url.to_string(),
            tag,
        })
        .collect();

    let history = connector.get_page_history(page_id).await?;
    let votes = connector.get_page_votes(page_id).await?;
    let comments = connector.get_forum_thread(thread_id).await?;

    let jobs = [
        WriteJob::Page(PageRecord {
            page_id,
            url: url.to_string(),
            html: content,
            thread_id,
        }),
        WriteJob::Revisions(history),
        WriteJob::Votes(votes),
        WriteJob::ForumPosts(comments),
        WriteJob::Tags(tags),
    ];
    for job in jobs {
        if tx.send(job).is_err() {
            // Writer is gone; nothing left to do for this crawl.
            return Err(WikisnapError::Crawl("write queue closed".to_string()));
        }
    }

    tracing::debug!("Finished saving page: {}", url);
    Ok(true)
}

/// Drains the write queue into the store
///
/// Exits once all `worker_count` sentinels have been received: each worker
/// sends its sentinel after its last job, and the channel preserves
/// per-sender order, so at that point every enqueued job has been applied.
/// A failed write is logged and dropped; the crawl continues.
pub(crate) async fn run_writer(
    mut store: SnapshotStore,
    mut rx: UnboundedReceiver<WriteJob>,
    worker_count: usize,
) -> (SnapshotStore, usize) {
    let mut done = 0;
    let mut write_failures = 0;

    while done < worker_count {
        let Some(job) = rx.recv().await else {
            // All senders dropped without sentinels; treat as finished.
            break;
        };
        let result = match job {
            WriteJob::Page(page) => store.create_page(&page).map(|_| 0),
            WriteJob::Revisions(rows) => store.insert_revisions(&rows),
            WriteJob::Votes(rows) => store.insert_votes(&rows),
            WriteJob::ForumPosts(rows) => store.insert_forum_posts(&rows),
            WriteJob::Tags(rows) => store.insert_tags(&rows),
            WriteJob::Done => {
                done += 1;
                continue;
            }
        };
        if let Err(e) = result {
            tracing::error!("Unable to write to the database: {}", e);
            write_failures += 1;
        }
    }

    (store, write_failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    fn page(url: &str, page_id: i64) -> PageRecord {
        PageRecord {
            page_id: Some(page_id),
            url: url.to_string(),
            html: "<div id=\"page-content\"></div>".to_string(),
            thread_id: None,
        }
    }

    #[tokio::test]
    async fn test_writer_exits_after_all_sentinels() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(WriteJob::Page(page("http://example.com/a", 1)))
            .unwrap();
        tx.send(WriteJob::Done).unwrap();
        tx.send(WriteJob::Done).unwrap();
        drop(tx);

        let (store, write_failures) = run_writer(store, rx, 2).await;
        assert_eq!(store.count_pages().unwrap(), 1);
        assert_eq!(write_failures, 0);
    }

    #[tokio::test]
    async fn test_writer_sees_job_enqueued_after_other_worker_finished() {
        // One worker finishes immediately; the other delays its last enqueue
        // past that point. The sentinel protocol must still deliver the late
        // job to the store.
        let store = SnapshotStore::open_in_memory().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        let fast = tx.clone();
        let fast_task = tokio::spawn(async move {
            fast.send(WriteJob::Page(page("http://example.com/fast", 1)))
                .unwrap();
            fast.send(WriteJob::Done).unwrap();
        });

        let slow = tx.clone();
        let slow_task = tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            slow.send(WriteJob::Page(page("http://example.com/slow", 2)))
                .unwrap();
            slow.send(WriteJob::Done).unwrap();
        });
        drop(tx);

        let (store, _) = run_writer(store, rx, 2).await;
        fast_task.await.unwrap();
        slow_task.await.unwrap();

        assert!(store
            .page_by_url("http://example.com/fast")
            .unwrap()
            .is_some());
        assert!(store
            .page_by_url("http://example.com/slow")
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_writer_counts_failed_jobs_and_continues() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        // Duplicate URL violates the unique constraint on pages.url.
        tx.send(WriteJob::Page(page("http://example.com/a", 1)))
            .unwrap();
        tx.send(WriteJob::Page(page("http://example.com/a", 1)))
            .unwrap();
        tx.send(WriteJob::Page(page("http://example.com/b", 2)))
            .unwrap();
        tx.send(WriteJob::Done).unwrap();
        drop(tx);

        let (store, write_failures) = run_writer(store, rx, 1).await;
        assert_eq!(write_failures, 1);
        assert_eq!(store.count_pages().unwrap(), 2);
    }
}
