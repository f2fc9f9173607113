//! SQLite article store
//!
//! Stands in for the platform's relational article table. Rows are read back
//! in insertion order so indexes built from the store are reproducible.

use super::CorpusEntry;
use crate::error::{ArticleCraftError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    raw_text TEXT NOT NULL,
    clean_text TEXT NOT NULL,
    lemmatized TEXT,
    url TEXT,
    imported_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_title ON articles(title);
"#;

pub struct ArticleStore {
    pool: DbPool,
}

impl ArticleStore {
    /// Open (or create) the store at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ArticleCraftError::io(
                    e,
                    format!("Failed to create database directory: {:?}", parent),
                )
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| ArticleCraftError::Config(format!("Failed to create connection pool: {}", e)))?;

        let store = Self { pool };
        {
            let conn = store.get_conn()?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            conn.execute_batch(SCHEMA)?;
        }

        Ok(store)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| ArticleCraftError::Config(format!("Failed to get connection: {}", e)))
    }

    /// Insert or replace entries by id, in one transaction
    pub fn upsert(&self, entries: &[CorpusEntry]) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO articles (id, title, raw_text, clean_text, lemmatized, url, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    raw_text = excluded.raw_text,
                    clean_text = excluded.clean_text,
                    lemmatized = excluded.lemmatized,
                    url = excluded.url,
                    imported_at = excluded.imported_at",
            )?;

            for entry in entries {
                stmt.execute(params![
                    entry.id,
                    entry.title,
                    entry.raw_text,
                    entry.clean_text,
                    entry.lemmatized,
                    entry.url,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!("Upserted {} articles", entries.len());
        Ok(entries.len())
    }

    /// All entries in insertion order
    pub fn load_all(&self) -> Result<Vec<CorpusEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, raw_text, clean_text, lemmatized, url FROM articles ORDER BY seq",
        )?;

        let rows = stmt.query_map([], row_to_entry)?;
        let entries = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// First entry with exactly this title
    pub fn find_by_title(&self, title: &str) -> Result<Option<CorpusEntry>> {
        let conn = self.get_conn()?;
        let entry = conn
            .query_row(
                "SELECT id, title, raw_text, clean_text, lemmatized, url FROM articles
                 WHERE title = ?1 ORDER BY seq LIMIT 1",
                params![title],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CorpusEntry> {
    Ok(CorpusEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        raw_text: row.get(2)?,
        clean_text: row.get(3)?,
        lemmatized: row.get(4)?,
        url: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: &str, title: &str) -> CorpusEntry {
        CorpusEntry::new(id, title, format!("{} text", title), format!("{} text", title))
    }

    #[test]
    fn test_store_roundtrip_preserves_order() {
        let temp = TempDir::new().unwrap();
        let store = ArticleStore::open(&temp.path().join("db").join("articles.sqlite")).unwrap();

        store
            .upsert(&[entry("b", "Second"), entry("a", "First")])
            .unwrap();
        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "b");
        assert_eq!(all[1].id, "a");
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let temp = TempDir::new().unwrap();
        let store = ArticleStore::open(&temp.path().join("articles.sqlite")).unwrap();

        store.upsert(&[entry("a", "Old")]).unwrap();
        store
            .upsert(&[entry("a", "New").with_url("https://example.com/a")])
            .unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let found = store.find_by_title("New").unwrap().unwrap();
        assert_eq!(found.url.as_deref(), Some("https://example.com/a"));
        assert!(store.find_by_title("Old").unwrap().is_none());
    }
}
