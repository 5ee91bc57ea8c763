//! SQLite snapshot store implementation

use crate::store::schema::initialize_schema;
use crate::store::{
    AuthorRecord, ForumPost, ImageRecord, PageRecord, Revision, StoreResult, TagRecord, Vote,
};
use rusqlite::{params, Connection, OptionalExtension, Statement};
use std::path::Path;

/// Default number of rows per bulk-insert transaction
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// SQLite-backed snapshot store
///
/// The crawl orchestrator is the only writer; the page facade reads. Bulk
/// inserts are applied in chunks, each chunk inside its own transaction, to
/// bound transaction size while keeping chunks atomic.
pub struct SnapshotStore {
    conn: Connection,
    chunk_size: usize,
}

impl SnapshotStore {
    /// Opens or creates a snapshot database at the given path
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Creates an in-memory snapshot store (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Sets the number of rows per bulk-insert transaction
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        assert!(chunk_size >= 1);
        self.chunk_size = chunk_size;
    }

    // ===== Write API (orchestrator only) =====

    /// Deletes all snapshot data
    ///
    /// A full crawl always starts from an empty store; a snapshot is a
    /// complete generation, never an incremental patch.
    pub fn purge_all(&mut self) -> StoreResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM pages;
            DELETE FROM revisions;
            DELETE FROM votes;
            DELETE FROM forum_posts;
            DELETE FROM tags;
            DELETE FROM images;
            DELETE FROM authors;
        ",
        )?;
        Ok(())
    }

    /// Inserts one page row
    pub fn create_page(&mut self, page: &PageRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO pages (page_id, url, html, thread_id) VALUES (?1, ?2, ?3, ?4)",
            params![page.page_id, page.url, page.html, page.thread_id],
        )?;
        Ok(())
    }

    pub fn insert_revisions(&mut self, rows: &[Revision]) -> StoreResult<usize> {
        self.insert_chunked(
            rows,
            "INSERT INTO revisions (page_id, number, user, time, comment)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            |stmt, r| stmt.execute(params![r.page_id, r.number, r.user, r.time, r.comment]),
        )
    }

    pub fn insert_votes(&mut self, rows: &[Vote]) -> StoreResult<usize> {
        self.insert_chunked(
            rows,
            "INSERT INTO votes (page_id, user, value) VALUES (?1, ?2, ?3)",
            |stmt, v| stmt.execute(params![v.page_id, v.user, v.value]),
        )
    }

    pub fn insert_forum_posts(&mut self, rows: &[ForumPost]) -> StoreResult<usize> {
        self.insert_chunked(
            rows,
            "INSERT INTO forum_posts (thread_id, post_id, title, content, user, time, parent_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            |stmt, p| {
                stmt.execute(params![
                    p.thread_id,
                    p.post_id,
                    p.title,
                    p.content,
                    p.user,
                    p.time,
                    p.parent_id
                ])
            },
        )
    }

    pub fn insert_tags(&mut self, rows: &[TagRecord]) -> StoreResult<usize> {
        self.insert_chunked(
            rows,
            "INSERT INTO tags (url, tag) VALUES (?1, ?2)",
            |stmt, t| stmt.execute(params![t.url, t.tag]),
        )
    }

    pub fn insert_images(&mut self, rows: &[ImageRecord]) -> StoreResult<usize> {
        self.insert_chunked(
            rows,
            "INSERT OR REPLACE INTO images (url, source, data) VALUES (?1, ?2, ?3)",
            |stmt, i| stmt.execute(params![i.url, i.source, i.data]),
        )
    }

    pub fn insert_authors(&mut self, rows: &[AuthorRecord]) -> StoreResult<usize> {
        self.insert_chunked(
            rows,
            "INSERT OR REPLACE INTO authors (url, author, is_override) VALUES (?1, ?2, ?3)",
            |stmt, a| stmt.execute(params![a.url, a.author, a.is_override as i32]),
        )
    }

    /// Applies a bulk insert in chunks, one transaction per chunk
    fn insert_chunked<T, F>(&mut self, rows: &[T], sql: &str, bind: F) -> StoreResult<usize>
    where
        F: Fn(&mut Statement<'_>, &T) -> rusqlite::Result<usize>,
    {
        let mut inserted = 0;
        for chunk in rows.chunks(self.chunk_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare(sql)?;
                for row in chunk {
                    inserted += bind(&mut stmt, row)?;
                }
            }
            tx.commit()?;
        }
        Ok(inserted)
    }

    // ===== Read API (page facade and export consumers) =====

    pub fn page_by_url(&self, url: &str) -> StoreResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                "SELECT page_id, url, html, thread_id FROM pages WHERE url = ?1",
                params![url],
                |row| {
                    Ok(PageRecord {
                        page_id: row.get(0)?,
                        url: row.get(1)?,
                        html: row.get(2)?,
                        thread_id: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(page)
    }

    /// Revisions for a page, ascending by revision number
    pub fn history(&self, page_id: i64) -> StoreResult<Vec<Revision>> {
        let mut stmt = self.conn.prepare(
            "SELECT page_id, number, user, time, comment FROM revisions
             WHERE page_id = ?1 ORDER BY number ASC",
        )?;

        let revisions = stmt
            .query_map(params![page_id], |row| {
                Ok(Revision {
                    page_id: row.get(0)?,
                    number: row.get(1)?,
                    user: row.get(2)?,
                    time: row.get(3)?,
                    comment: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(revisions)
    }

    pub fn votes(&self, page_id: i64) -> StoreResult<Vec<Vote>> {
        let mut stmt = self
            .conn
            .prepare("SELECT page_id, user, value FROM votes WHERE page_id = ?1")?;

        let votes = stmt
            .query_map(params![page_id], |row| {
                Ok(Vote {
                    page_id: row.get(0)?,
                    user: row.get(1)?,
                    value: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(votes)
    }

    pub fn tags(&self, url: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM tags WHERE url = ?1 ORDER BY tag")?;

        let tags = stmt
            .query_map(params![url], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tags)
    }

    /// Posts of a discussion thread, ascending by post id
    pub fn forum_thread(&self, thread_id: i64) -> StoreResult<Vec<ForumPost>> {
        let mut stmt = self.conn.prepare(
            "SELECT thread_id, post_id, title, content, user, time, parent_id
             FROM forum_posts WHERE thread_id = ?1 ORDER BY post_id ASC",
        )?;

        let posts = stmt
            .query_map(params![thread_id], |row| {
                Ok(ForumPost {
                    thread_id: row.get(0)?,
                    post_id: row.get(1)?,
                    title: row.get(2)?,
                    content: row.get(3)?,
                    user: row.get(4)?,
                    time: row.get(5)?,
                    parent_id: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    /// URLs of every page carrying the given tag
    pub fn pages_with_tag(&self, tag: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM tags WHERE tag = ?1 ORDER BY url")?;

        let urls = stmt
            .query_map(params![tag], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(urls)
    }

    /// All page URLs in the snapshot, sorted
    pub fn all_urls(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT url FROM pages ORDER BY url")?;

        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(urls)
    }

    pub fn author(&self, url: &str) -> StoreResult<Option<AuthorRecord>> {
        let author = self
            .conn
            .query_row(
                "SELECT url, author, is_override FROM authors WHERE url = ?1",
                params![url],
                |row| {
                    Ok(AuthorRecord {
                        url: row.get(0)?,
                        author: row.get(1)?,
                        is_override: row.get::<_, i32>(2)? != 0,
                    })
                },
            )
            .optional()?;

        Ok(author)
    }

    pub fn images(&self) -> StoreResult<Vec<ImageRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, source, data FROM images ORDER BY url")?;

        let images = stmt
            .query_map([], |row| {
                Ok(ImageRecord {
                    url: row.get(0)?,
                    source: row.get(1)?,
                    data: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(images)
    }

    pub fn count_pages(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, page_id: i64) -> PageRecord {
        PageRecord {
            page_id: Some(page_id),
            url: url.to_string(),
            html: "<div id=\"page-content\"></div>".to_string(),
            thread_id: None,
        }
    }

    #[test]
    fn test_open_in_memory() {
        assert!(SnapshotStore::open_in_memory().is_ok());
    }

    #[test]
    fn test_create_and_lookup_page() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        let record = page("http://example.com/scp-001", 42);
        store.create_page(&record).unwrap();

        let loaded = store.page_by_url("http://example.com/scp-001").unwrap();
        assert_eq!(loaded, Some(record));

        let missing = store.page_by_url("http://example.com/missing").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_history_sorted_by_number() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        let rows: Vec<Revision> = [3, 1, 2]
            .iter()
            .map(|n| Revision {
                page_id: 7,
                number: *n,
                user: format!("user{}", n),
                time: "2014-01-01 00:00:00".to_string(),
                comment: String::new(),
            })
            .collect();
        store.insert_revisions(&rows).unwrap();

        let history = store.history(7).unwrap();
        let numbers: Vec<u32> = history.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_insert_chunked_spans_chunks() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        store.set_chunk_size(10);

        let rows: Vec<Vote> = (0..25)
            .map(|i| Vote {
                page_id: 1,
                user: format!("user{}", i),
                value: 1,
            })
            .collect();

        let inserted = store.insert_votes(&rows).unwrap();
        assert_eq!(inserted, 25);
        assert_eq!(store.votes(1).unwrap().len(), 25);
    }

    #[test]
    fn test_forum_thread_sorted_by_post_id() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        let rows: Vec<ForumPost> = [30, 10, 20]
            .iter()
            .map(|id| ForumPost {
                thread_id: 5,
                post_id: *id,
                title: String::new(),
                content: String::new(),
                user: "alice".to_string(),
                time: "2014-01-01 00:00:00".to_string(),
                parent_id: None,
            })
            .collect();
        store.insert_forum_posts(&rows).unwrap();

        let posts = store.forum_thread(5).unwrap();
        let ids: Vec<i64> = posts.iter().map(|p| p.post_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert!(store.forum_thread(99).unwrap().is_empty());
    }

    #[test]
    fn test_pages_with_tag() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        store
            .insert_tags(&[
                TagRecord {
                    url: "http://example.com/a".to_string(),
                    tag: "scp".to_string(),
                },
                TagRecord {
                    url: "http://example.com/b".to_string(),
                    tag: "tale".to_string(),
                },
                TagRecord {
                    url: "http://example.com/c".to_string(),
                    tag: "scp".to_string(),
                },
            ])
            .unwrap();

        let urls = store.pages_with_tag("scp").unwrap();
        assert_eq!(
            urls,
            vec![
                "http://example.com/a".to_string(),
                "http://example.com/c".to_string()
            ]
        );
    }

    #[test]
    fn test_purge_all() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        store.create_page(&page("http://example.com/a", 1)).unwrap();
        store
            .insert_tags(&[TagRecord {
                url: "http://example.com/a".to_string(),
                tag: "scp".to_string(),
            }])
            .unwrap();

        store.purge_all().unwrap();

        assert_eq!(store.count_pages().unwrap(), 0);
        assert!(store.tags("http://example.com/a").unwrap().is_empty());
    }

    #[test]
    fn test_author_override_roundtrip() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        store
            .insert_authors(&[AuthorRecord {
                url: "http://example.com/scp-001".to_string(),
                author: "alice".to_string(),
                is_override: true,
            }])
            .unwrap();

        let author = store.author("http://example.com/scp-001").unwrap().unwrap();
        assert_eq!(author.author, "alice");
        assert!(author.is_override);
        assert!(store.author("http://example.com/other").unwrap().is_none());
    }
}
