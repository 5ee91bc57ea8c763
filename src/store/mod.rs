//! Snapshot store for persisting crawled wiki data
//!
//! This module handles all database operations for the snapshotter, including:
//! - SQLite database initialization and schema management
//! - Page, revision, vote, forum post, and tag persistence
//! - Chunked bulk inserts with one transaction per chunk
//! - Point and range lookups used by the page facade

mod schema;
mod sqlite;

pub use sqlite::SnapshotStore;

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// One crawled page, as persisted in the snapshot
///
/// `html` holds the page's main-content subtree only. `page_id` and
/// `thread_id` are site-assigned and may be absent for pages that never
/// expose them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub page_id: Option<i64>,
    pub url: String,
    pub html: String,
    pub thread_id: Option<i64>,
}

/// One entry in a page's revision history
///
/// `number` is 1-based and ascending; the store always returns revisions
/// sorted by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub page_id: i64,
    pub number: u32,
    pub user: String,
    pub time: String,
    pub comment: String,
}

/// A single up- or downvote on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub page_id: i64,
    pub user: String,
    /// +1 or -1
    pub value: i32,
}

/// One post in a page's discussion thread
///
/// `parent_id` names another post in the same thread; the posts of one
/// thread form a forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumPost {
    pub thread_id: i64,
    pub post_id: i64,
    pub title: String,
    pub content: String,
    pub user: String,
    pub time: String,
    pub parent_id: Option<i64>,
}

/// A tag attached to a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub url: String,
    pub tag: String,
}

/// A whitelisted image, with its bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub url: String,
    pub source: String,
    pub data: Vec<u8>,
}

/// An author attribution override for a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRecord {
    pub url: String,
    pub author: String,
    pub is_override: bool,
}
