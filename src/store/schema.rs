//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the snapshot database.

/// SQL schema for the snapshot database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawled page
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER,
    url TEXT NOT NULL UNIQUE,
    html TEXT NOT NULL,
    thread_id INTEGER
);

CREATE INDEX IF NOT EXISTS idx_pages_page_id ON pages(page_id);

-- Full revision history per page
CREATE TABLE IF NOT EXISTS revisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL,
    number INTEGER NOT NULL,
    user TEXT NOT NULL,
    time TEXT NOT NULL,
    comment TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_revisions_page ON revisions(page_id);

-- Individual votes per page
CREATE TABLE IF NOT EXISTS votes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL,
    user TEXT NOT NULL,
    value INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_votes_page ON votes(page_id);

-- Discussion thread posts
CREATE TABLE IF NOT EXISTS forum_posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id INTEGER NOT NULL,
    post_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    user TEXT NOT NULL,
    time TEXT NOT NULL,
    parent_id INTEGER
);

CREATE INDEX IF NOT EXISTS idx_forum_posts_thread ON forum_posts(thread_id);

-- Free-form tags per page
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    tag TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tags_url ON tags(url);
CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag);

-- Image whitelist, populated from an auxiliary listing page
CREATE TABLE IF NOT EXISTS images (
    url TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    data BLOB NOT NULL
);

-- Author overrides, populated from an auxiliary listing page
CREATE TABLE IF NOT EXISTS authors (
    url TEXT PRIMARY KEY,
    author TEXT NOT NULL,
    is_override INTEGER NOT NULL DEFAULT 0
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let tables = vec![
            "pages",
            "revisions",
            "votes",
            "forum_posts",
            "tags",
            "images",
            "authors",
        ];

        for table in tables {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
