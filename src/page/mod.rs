//! Read-side view of a stored snapshot
//!
//! [`Snapshot`] opens the database produced by a crawl and hands out
//! [`Page`] values. Pages are cheap to create and touch the store lazily,
//! so walking thousands of URLs only pays for the fields actually read.

mod hierarchy;
mod title_index;

pub use title_index::TitleIndex;

use crate::connector::parse;
use crate::store::{ForumPost, PageRecord, Revision, SnapshotStore, Vote};
use crate::{Result, WikisnapError};
use regex::Regex;
use scraper::{Html, Selector};
use std::cell::OnceCell;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

/// Vote rows left behind by deleted accounts, excluded from ratings
const DELETED_ACCOUNT: &str = "(account deleted)";

const IMAGE_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".gif"];

/// Read handle over a completed snapshot database
pub struct Snapshot {
    store: SnapshotStore,
    site: String,
    title_index: OnceCell<TitleIndex>,
}

impl Snapshot {
    /// Opens the snapshot database at `path` for the given site origin
    pub fn open<P: AsRef<Path>>(path: P, site: &str) -> Result<Snapshot> {
        let store = SnapshotStore::open(path.as_ref())?;
        Ok(Snapshot::from_store(store, site))
    }

    pub fn from_store(store: SnapshotStore, site: &str) -> Snapshot {
        let mut site = site.to_string();
        if !site.ends_with('/') {
            site.push('/');
        }
        Snapshot {
            store,
            site,
            title_index: OnceCell::new(),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Site origin with a trailing slash
    pub fn site(&self) -> &str {
        &self.site
    }

    /// A lazy view of the page at `url`, which may be a full URL or a slug
    pub fn page(&self, url: &str) -> Page<'_> {
        let url = if url.contains("://") {
            url.to_string()
        } else {
            format!("{}{}", self.site, url.trim_start_matches('/'))
        };
        Page::new(self, url)
    }

    /// A lazy view of every page in the snapshot
    pub fn all_pages(&self) -> Result<Vec<Page<'_>>> {
        let urls = self.store.all_urls()?;
        Ok(urls.into_iter().map(|url| Page::new(self, url)).collect())
    }

    /// The title index, built from the stored series listings on first use
    pub fn title_index(&self) -> Result<&TitleIndex> {
        if let Some(index) = self.title_index.get() {
            return Ok(index);
        }
        let built = TitleIndex::build(self)?;
        Ok(self.title_index.get_or_init(|| built))
    }
}

/// Lazy view of a single page in a snapshot
///
/// Every accessor reads from the store at most once and caches the result
/// for the lifetime of this value.
pub struct Page<'a> {
    snapshot: &'a Snapshot,
    url: String,
    record: OnceCell<Option<PageRecord>>,
    tags: OnceCell<Vec<String>>,
    links: OnceCell<Vec<String>>,
    history: OnceCell<Vec<Revision>>,
    votes: OnceCell<Vec<Vote>>,
    comments: OnceCell<Vec<ForumPost>>,
    children: OnceCell<Vec<String>>,
}

impl<'a> Page<'a> {
    fn new(snapshot: &'a Snapshot, url: String) -> Page<'a> {
        Page {
            snapshot,
            url,
            record: OnceCell::new(),
            tags: OnceCell::new(),
            links: OnceCell::new(),
            history: OnceCell::new(),
            votes: OnceCell::new(),
            comments: OnceCell::new(),
            children: OnceCell::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.snapshot
    }

    fn record(&self) -> Result<&Option<PageRecord>> {
        if let Some(record) = self.record.get() {
            return Ok(record);
        }
        let fetched = self.snapshot.store.page_by_url(&self.url)?;
        Ok(self.record.get_or_init(|| fetched))
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.record()?.is_some())
    }

    /// Stored HTML of the page's main content, if the page was crawled
    pub fn html(&self) -> Result<Option<String>> {
        Ok(self.record()?.as_ref().map(|r| r.html.clone()))
    }

    pub fn page_id(&self) -> Result<Option<i64>> {
        Ok(self.record()?.as_ref().and_then(|r| r.page_id))
    }

    pub fn thread_id(&self) -> Result<Option<i64>> {
        Ok(self.record()?.as_ref().and_then(|r| r.thread_id))
    }

    pub fn tags(&self) -> Result<&[String]> {
        if let Some(tags) = self.tags.get() {
            return Ok(tags);
        }
        let fetched = self.snapshot.store.tags(&self.url)?;
        Ok(self.tags.get_or_init(|| fetched))
    }

    /// Outbound same-site article links, absolutized and deduplicated
    pub fn links(&self) -> Result<&[String]> {
        if let Some(links) = self.links.get() {
            return Ok(links);
        }
        let extracted = match self.html()? {
            Some(html) => extract_links(&html, &self.snapshot.site),
            None => Vec::new(),
        };
        Ok(self.links.get_or_init(|| extracted))
    }

    /// Revisions ordered oldest first
    pub fn history(&self) -> Result<&[Revision]> {
        if let Some(history) = self.history.get() {
            return Ok(history);
        }
        let fetched = match self.page_id()? {
            Some(id) => self.snapshot.store.history(id)?,
            None => Vec::new(),
        };
        Ok(self.history.get_or_init(|| fetched))
    }

    pub fn votes(&self) -> Result<&[Vote]> {
        if let Some(votes) = self.votes.get() {
            return Ok(votes);
        }
        let fetched = match self.page_id()? {
            Some(id) => self.snapshot.store.votes(id)?,
            None => Vec::new(),
        };
        Ok(self.votes.get_or_init(|| fetched))
    }

    /// Discussion thread posts, oldest first
    pub fn comments(&self) -> Result<&[ForumPost]> {
        if let Some(comments) = self.comments.get() {
            return Ok(comments);
        }
        let fetched = match self.thread_id()? {
            Some(id) => self.snapshot.store.forum_thread(id)?,
            None => Vec::new(),
        };
        Ok(self.comments.get_or_init(|| fetched))
    }

    /// Net rating, with votes from deleted accounts excluded
    pub fn rating(&self) -> Result<i32> {
        Ok(self
            .votes()?
            .iter()
            .filter(|v| v.user != DELETED_ACCOUNT)
            .map(|v| v.value)
            .sum())
    }

    /// The page's display title
    ///
    /// Numbered skip articles get their descriptive title joined on, e.g.
    /// "SCP-173: The Sculpture". An indexed article missing from the title
    /// index is an error rather than a silently bare title.
    pub fn title(&self) -> Result<String> {
        let Some(html) = self.html()? else {
            return Err(WikisnapError::PageNotInSnapshot(self.url.clone()));
        };
        let wikidot_title = parse::parse_page_title(&html);
        if !self.tags()?.iter().any(|t| t == "scp") || !is_numbered_designation(&self.url) {
            return Ok(wikidot_title);
        }
        let index = self.snapshot.title_index()?;
        match index.get(&self.url) {
            Some(descriptive) => Ok(format!("{}: {}", wikidot_title, descriptive)),
            None => Err(WikisnapError::TitleNotIndexed(self.url.clone())),
        }
    }

    /// URLs of pages structurally subordinate to this one
    pub fn children(&self) -> Result<&[String]> {
        if let Some(children) = self.children.get() {
            return Ok(children);
        }
        let derived = hierarchy::children(self)?;
        Ok(self.children.get_or_init(|| derived))
    }

    /// Author of record: the first revision's user, unless overridden in
    /// the attribution table
    pub fn author(&self) -> Result<Option<String>> {
        if let Some(record) = self.snapshot.store.author(&self.url)? {
            if record.is_override {
                return Ok(Some(record.author));
            }
        }
        Ok(self.history()?.first().map(|r| r.user.clone()))
    }

    /// Supplementary attribution, e.g. the author of a rewrite
    pub fn rewrite_author(&self) -> Result<Option<String>> {
        match self.snapshot.store.author(&self.url)? {
            Some(record) if !record.is_override => Ok(Some(record.author)),
            _ => Ok(None),
        }
    }
}

fn is_numbered_designation(url: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)[scp]+-[0-9]+$").ok())
        .as_ref()
        .map(|re| re.is_match(url))
        .unwrap_or(false)
}

/// Same-site article links in `html`, in first-occurrence order
fn extract_links(html: &str, site: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(anchors) = Selector::parse("#page-content a") else {
        return Vec::new();
    };
    let origin = site.trim_end_matches('/');

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.starts_with('/') || href.starts_with("//") {
            continue;
        }
        if IMAGE_EXTENSIONS.iter().any(|ext| href.ends_with(ext)) {
            continue;
        }
        let url = format!("{}{}", origin, href.trim_end_matches('|'));
        if seen.insert(url.clone()) {
            links.push(url);
        }
    }
    links
}
