//! SQLite persistence for Reddit Archiver
//!
//! This module provides the single persistent store for:
//! 1. Tracked users and their poll watermarks
//! 2. Harvested posts and comments (insert-once, keyed by id)
//! 3. Albums and media assets, with the dedup checks the pipeline relies on
//! 4. Excluded subreddits, runtime config rows, and service credentials

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::archiver::reddit::{Comment, Post};
use crate::archiver::resolve::MediaType;

/// Error types for the store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("duplicate {what} \"{id}\"")]
    Duplicate { what: &'static str, id: String },

    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A media asset row about to be persisted.
#[derive(Debug)]
pub struct NewMediaAsset<'a> {
    pub path: &'a Path,
    pub owner: &'a str,
    pub source_url: &'a str,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    pub thumbnail_path: &'a Path,
    pub media_type: MediaType,
    pub album_id: Option<i64>,
    pub post_id: &'a str,
    pub comment_id: Option<&'a str>,
}

/// Store for all persisted archiver state
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at `path` and initialize the schema.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                handle TEXT NOT NULL UNIQUE COLLATE NOCASE,
                is_new INTEGER NOT NULL DEFAULT 1,
                deleted INTEGER NOT NULL DEFAULT 0,
                watermark TEXT,
                created INTEGER NOT NULL,
                updated INTEGER NOT NULL,
                last_downloaded INTEGER
            );
            CREATE TABLE IF NOT EXISTS excluded_subreddits (
                name TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                author TEXT NOT NULL,
                subreddit TEXT NOT NULL,
                permalink TEXT NOT NULL,
                created_utc INTEGER NOT NULL,
                title TEXT NOT NULL,
                selftext TEXT,
                url TEXT
            );
            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                author TEXT NOT NULL,
                subreddit TEXT NOT NULL,
                permalink TEXT NOT NULL,
                created_utc INTEGER NOT NULL,
                body TEXT NOT NULL,
                post_id TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS albums (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                owner TEXT NOT NULL,
                source_url TEXT NOT NULL UNIQUE,
                post_id TEXT NOT NULL,
                comment_id TEXT
            );
            CREATE TABLE IF NOT EXISTS media_assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                owner TEXT NOT NULL,
                source_url TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                thumbnail_path TEXT NOT NULL,
                media_type TEXT NOT NULL,
                album_id INTEGER,
                post_id TEXT NOT NULL,
                comment_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_media_assets_owner ON media_assets (owner);
            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS credentials (
                service TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                secret TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn is_user_registered(&self, handle: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE handle = ?1",
            params![handle],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Register a user. A no-op if the handle is already present; callers
    /// that want to report the duplicate check `is_user_registered` first.
    pub fn add_user(&self, handle: &str, is_new: bool) -> StoreResult<()> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO users (handle, is_new, created, updated)
             VALUES (?1, ?2, ?3, ?3)",
            params![handle, is_new as i64, now],
        )?;
        Ok(())
    }

    /// List users in registration order. `new_only = true` returns users not
    /// yet polled once; `false` returns the steady-state round-robin set,
    /// deleted users included (their polls are cheap no-ops upstream).
    pub fn list_users(&self, new_only: bool) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let sql = if new_only {
            "SELECT handle FROM users WHERE is_new = 1 AND deleted = 0 ORDER BY id"
        } else {
            "SELECT handle FROM users WHERE is_new = 0 ORDER BY id"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    pub fn get_watermark(&self, handle: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        let watermark: Option<Option<String>> = conn
            .query_row(
                "SELECT watermark FROM users WHERE handle = ?1",
                params![handle],
                |row| row.get(0),
            )
            .optional()?;
        Ok(watermark.flatten())
    }

    /// Persist the watermark. Callers pass only the newest id of a fetched
    /// batch, so successive values never move backwards.
    pub fn set_watermark(&self, handle: &str, id: &str) -> StoreResult<()> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users SET watermark = ?2, updated = ?3 WHERE handle = ?1",
            params![handle, id, now],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("user {handle}")));
        }
        Ok(())
    }

    /// Flag a user whose upstream account disappeared. The row stays in the
    /// round-robin set; discovery will not re-add the handle because it is
    /// still registered.
    pub fn mark_deleted(&self, handle: &str) -> StoreResult<()> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET deleted = 1, updated = ?2 WHERE handle = ?1",
            params![handle, now],
        )?;
        Ok(())
    }

    /// Clear the new flag once a user has been polled.
    pub fn clear_new(&self, handle: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET is_new = 0 WHERE handle = ?1",
            params![handle],
        )?;
        Ok(())
    }

    pub fn touch_user(&self, handle: &str) -> StoreResult<()> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_downloaded = ?2, updated = ?2 WHERE handle = ?1",
            params![handle, now],
        )?;
        Ok(())
    }

    pub fn excluded_subreddits(&self) -> StoreResult<HashSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM excluded_subreddits")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<HashSet<String>, _>>()?)
    }

    pub fn add_excluded(&self, name: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO excluded_subreddits (name) VALUES (?1)",
            params![normalize_subreddit(name)],
        )?;
        Ok(())
    }

    pub fn remove_excluded(&self, name: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM excluded_subreddits WHERE name = ?1",
            params![normalize_subreddit(name)],
        )?;
        Ok(())
    }

    pub fn album_exists(&self, source_url: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM albums WHERE source_url = ?1",
            params![source_url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn add_album(
        &self,
        path: &Path,
        owner: &str,
        source_url: &str,
        post_id: &str,
        comment_id: Option<&str>,
    ) -> StoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO albums (path, owner, source_url, post_id, comment_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                path.to_string_lossy(),
                owner,
                source_url,
                post_id,
                comment_id
            ],
        )
        .map_err(|e| duplicate_guard(e, "album", source_url))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn add_post(&self, post: &Post) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO posts (id, author, subreddit, permalink, created_utc, title, selftext, url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                post.id,
                post.author,
                post.subreddit,
                post.permalink,
                post.created_utc,
                post.title,
                post.selftext,
                post.url
            ],
        )
        .map_err(|e| duplicate_guard(e, "post", &post.id))?;
        Ok(())
    }

    pub fn add_comment(&self, comment: &Comment) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO comments (id, author, subreddit, permalink, created_utc, body, post_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                comment.id,
                comment.author,
                comment.subreddit,
                comment.permalink,
                comment.created_utc,
                comment.body,
                comment.post_id
            ],
        )
        .map_err(|e| duplicate_guard(e, "comment", &comment.id))?;
        Ok(())
    }

    pub fn add_media_asset(&self, asset: &NewMediaAsset<'_>) -> StoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO media_assets (
                path, owner, source_url, width, height, size_bytes,
                thumbnail_path, media_type, album_id, post_id, comment_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                asset.path.to_string_lossy(),
                asset.owner,
                asset.source_url,
                asset.width,
                asset.height,
                asset.size_bytes,
                asset.thumbnail_path.to_string_lossy(),
                asset.media_type.as_str(),
                asset.album_id,
                asset.post_id,
                asset.comment_id
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_config(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_config(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_credentials(&self, service: &str) -> StoreResult<(String, String)> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT username, secret FROM credentials WHERE service = ?1",
            params![service],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("credentials for {service}")))
    }

    pub fn set_credentials(&self, service: &str, username: &str, secret: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO credentials (service, username, secret) VALUES (?1, ?2, ?3)",
            params![service, username, secret],
        )?;
        Ok(())
    }
}

/// Strip `/r/` prefixes and slashes, lowercase. Exclusion checks are
/// case-insensitive so the stored form is the canonical one.
pub fn normalize_subreddit(name: &str) -> String {
    name.trim()
        .trim_start_matches("/r/")
        .replace('/', "")
        .to_ascii_lowercase()
}

fn duplicate_guard(err: rusqlite::Error, what: &'static str, id: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Duplicate {
                what,
                id: id.to_string(),
            }
        }
        other => StoreError::Database(other),
    }
}

#[cfg(test)]
pub(crate) struct AssetRow {
    pub path: String,
    pub thumbnail_path: String,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
    pub album_id: Option<i64>,
    pub post_id: String,
    pub comment_id: Option<String>,
}

#[cfg(test)]
impl Store {
    pub(crate) fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub(crate) fn count(&self, table: &str) -> i64 {
        let conn = self.conn.lock();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    pub(crate) fn media_assets(&self) -> Vec<AssetRow> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT path, thumbnail_path, media_type, width, height,
                        album_id, post_id, comment_id
                 FROM media_assets ORDER BY id",
            )
            .unwrap();
        let rows = stmt
            .query_map([], |row| {
                Ok(AssetRow {
                    path: row.get(0)?,
                    thumbnail_path: row.get(1)?,
                    media_type: row.get(2)?,
                    width: row.get(3)?,
                    height: row.get(4)?,
                    album_id: row.get(5)?,
                    post_id: row.get(6)?,
                    comment_id: row.get(7)?,
                })
            })
            .unwrap();
        rows.collect::<Result<Vec<_>, _>>().unwrap()
    }

    pub(crate) fn is_deleted(&self, handle: &str) -> bool {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT deleted FROM users WHERE handle = ?1",
            params![handle],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            author: "alice".to_string(),
            subreddit: "pics".to_string(),
            permalink: format!("https://www.reddit.com/r/pics/comments/{id}/"),
            created_utc: 1_400_000_000,
            title: "a title".to_string(),
            selftext: None,
            url: Some("http://img.example/x.jpg".to_string()),
        }
    }

    #[test]
    fn user_registration_and_listing() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.is_user_registered("alice").unwrap());

        store.add_user("alice", false).unwrap();
        store.add_user("bob", true).unwrap();
        // Idempotent re-add is a no-op.
        store.add_user("alice", true).unwrap();

        assert!(store.is_user_registered("alice").unwrap());
        assert_eq!(store.list_users(false).unwrap(), vec!["alice".to_string()]);
        assert_eq!(store.list_users(true).unwrap(), vec!["bob".to_string()]);

        store.clear_new("bob").unwrap();
        assert!(store.list_users(true).unwrap().is_empty());
        assert_eq!(
            store.list_users(false).unwrap(),
            vec!["alice".to_string(), "bob".to_string()]
        );
    }

    #[test]
    fn registration_check_is_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        store.add_user("Alice", false).unwrap();
        assert!(store.is_user_registered("alice").unwrap());
    }

    #[test]
    fn watermark_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        store.add_user("alice", true).unwrap();

        assert_eq!(store.get_watermark("alice").unwrap(), None);
        store.set_watermark("alice", "t3_abc").unwrap();
        assert_eq!(
            store.get_watermark("alice").unwrap(),
            Some("t3_abc".to_string())
        );

        assert!(matches!(
            store.set_watermark("nobody", "t3_abc"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn deleted_users_stay_in_round_robin() {
        let store = Store::open_in_memory().unwrap();
        store.add_user("alice", false).unwrap();
        store.mark_deleted("alice").unwrap();

        assert!(store.is_deleted("alice"));
        assert_eq!(store.list_users(false).unwrap(), vec!["alice".to_string()]);
        // Still registered, so discovery will not re-add the handle.
        assert!(store.is_user_registered("alice").unwrap());
    }

    #[test]
    fn excluded_subreddits_are_normalized() {
        let store = Store::open_in_memory().unwrap();
        store.add_excluded("/r/GoneWild/").unwrap();

        let excluded = store.excluded_subreddits().unwrap();
        assert!(excluded.contains("gonewild"));

        store.remove_excluded("gonewild").unwrap();
        assert!(store.excluded_subreddits().unwrap().is_empty());
    }

    #[test]
    fn duplicate_post_is_a_distinct_error() {
        let store = Store::open_in_memory().unwrap();
        store.add_post(&post("p1")).unwrap();

        match store.add_post(&post("p1")) {
            Err(StoreError::Duplicate { what: "post", id }) => assert_eq!(id, "p1"),
            other => panic!("expected duplicate error, got {other:?}"),
        }
        assert_eq!(store.count("posts"), 1);
    }

    #[test]
    fn album_dedup_by_source_url() {
        let store = Store::open_in_memory().unwrap();
        let url = "http://imgur.example/a/slug";
        assert!(!store.album_exists(url).unwrap());

        let id = store
            .add_album(Path::new("/tmp/a"), "alice", url, "p1", None)
            .unwrap();
        assert!(id > 0);
        assert!(store.album_exists(url).unwrap());

        assert!(matches!(
            store.add_album(Path::new("/tmp/b"), "alice", url, "p2", None),
            Err(StoreError::Duplicate { what: "album", .. })
        ));
    }

    #[test]
    fn credentials_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.get_credentials("reddit"),
            Err(StoreError::NotFound(_))
        ));

        store.set_credentials("reddit", "user", "hunter2").unwrap();
        assert_eq!(
            store.get_credentials("reddit").unwrap(),
            ("user".to_string(), "hunter2".to_string())
        );

        store.set_credentials("reddit", "user", "hunter3").unwrap();
        assert_eq!(store.get_credentials("reddit").unwrap().1, "hunter3");
    }

    #[test]
    fn config_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get_config("last_polled_user").unwrap(), None);

        store.set_config("last_polled_user", "alice").unwrap();
        store.set_config("last_polled_user", "bob").unwrap();
        assert_eq!(
            store.get_config("last_polled_user").unwrap(),
            Some("bob".to_string())
        );
    }
}
