//! Record store backed by SQLite
//!
//! The store lives in a `.mediadex/` directory next to the media library:
//! - `media.db`: file records, canonical ids per hash, tags (SQLite, WAL)
//! - `config.toml`: optional settings (see [`crate::config`])
//!
//! Every operation opens its own connection, so a `RecordStore` can be
//! shared by reference across threads. Writes go through [`RecordStore::write`],
//! which runs the closure inside one `BEGIN IMMEDIATE` transaction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{FileRecord, MediaId, Tag};

/// Default store directory name
pub const STORE_DIR: &str = ".mediadex";

/// File names within the store directory
pub const MEDIA_DB: &str = "media.db";
pub const CONFIG_TOML: &str = "config.toml";

/// Fingerprint of the schema this binary was built with
const SCHEMA_HASH: &str = env!("STORE_SCHEMA_HASH");

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const FILE_COLUMNS: &str = "path, size, modified, hash, id, missing";

/// Row counts for `mdx stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub files: u64,
    pub missing_files: u64,
    pub distinct_hashes: u64,
    pub canonical_ids: u64,
    pub live_tags: u64,
}

/// Handle on `media.db`
#[derive(Debug, Clone)]
pub struct RecordStore {
    db_path: PathBuf,
    busy_timeout: Duration,
}

impl RecordStore {
    /// Open (creating if needed) the store inside `<root>/.mediadex/`
    pub fn for_library(root: impl AsRef<Path>) -> Result<Self> {
        Self::open(root.as_ref().join(STORE_DIR).join(MEDIA_DB))
    }

    /// Open (creating if needed) the database at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(db_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path, busy_timeout };
        store.init_schema()?;
        Ok(store)
    }

    /// Path to `media.db`
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        log::debug!("Opening record store at {:?}", self.db_path);
        let conn = self.connect()?;

        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::trace!("journal_mode={}", mode);

        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                path TEXT NOT NULL PRIMARY KEY,
                size INTEGER NOT NULL,
                modified INTEGER NOT NULL,
                hash TEXT NOT NULL,
                id TEXT NOT NULL,
                missing INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_files_hash ON files(hash)", [])?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_files_id ON files(id)", [])?;

        // hash -> canonical id, insert only
        conn.execute(
            "CREATE TABLE IF NOT EXISTS hashes (
                hash TEXT NOT NULL PRIMARY KEY,
                id TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_hashes_id ON hashes(id)", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tags (
                file_id TEXT NOT NULL,
                tag TEXT NOT NULL COLLATE NOCASE,
                modified INTEGER NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                UNIQUE(file_id, tag)
            )",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag)", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_hash', ?)",
            [SCHEMA_HASH],
        )?;
        let stored: String = conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_hash'",
            [],
            |row| row.get(0),
        )?;
        if stored != SCHEMA_HASH {
            log::warn!(
                "{} was created by a different build (schema {} vs {})",
                self.db_path.display(),
                stored,
                SCHEMA_HASH
            );
        }

        Ok(())
    }

    /// Run `f` inside one immediate write transaction
    ///
    /// The transaction commits only when `f` returns `Ok`.
    pub fn write<T>(&self, f: impl FnOnce(&WriteTxn<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&WriteTxn { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }

    /// Read the record for one path
    pub fn read_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let conn = self.connect()?;
        read_file(&conn, path)
    }

    /// Canonical identifier recorded for a content hash
    pub fn canonical_id_for_hash(&self, hash: &str) -> Result<Option<MediaId>> {
        let conn = self.connect()?;
        canonical_id_for_hash(&conn, hash)
    }

    /// Live records currently holding `hash`, ordered by path
    pub fn sharing_group(&self, hash: &str) -> Result<Vec<FileRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE hash = ? AND missing = 0 ORDER BY path"
        ))?;
        let records = stmt
            .query_map([hash], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Live paths whose content currently maps to canonical `id`
    pub fn live_paths_for_id(&self, id: &MediaId) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT f.path FROM files f INNER JOIN hashes h ON f.hash = h.hash
             WHERE h.id = ? AND f.missing = 0 ORDER BY f.path",
        )?;
        let paths = stmt
            .query_map([id.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    /// Paths of every record not yet marked missing
    pub fn live_paths(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT path FROM files WHERE missing = 0 ORDER BY path")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.connect()?;
        let count = |sql: &str| -> Result<u64> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };
        Ok(StoreStats {
            files: count("SELECT COUNT(*) FROM files")?,
            missing_files: count("SELECT COUNT(*) FROM files WHERE missing = 1")?,
            distinct_hashes: count("SELECT COUNT(DISTINCT hash) FROM files")?,
            canonical_ids: count("SELECT COUNT(DISTINCT id) FROM hashes")?,
            live_tags: count("SELECT COUNT(*) FROM tags WHERE deleted = 0")?,
        })
    }

    /// Attach a tag, or revive a deleted one
    ///
    /// Returns false when the tag is already live or the stored row is not
    /// older than `modified`.
    pub fn add_tag(&self, id: &MediaId, tag: &str, modified: i64) -> Result<bool> {
        self.write(|w| w.merge_tag(id, tag, modified, false, false))
    }

    /// Soft-delete (or undelete) a tag, recording `modified`
    ///
    /// Creates the row when absent so a deletion seen before the addition
    /// is not lost. Returns false when the stored row is not older.
    pub fn set_tag_deleted(&self, id: &MediaId, tag: &str, deleted: bool, modified: i64) -> Result<bool> {
        self.write(|w| w.merge_tag(id, tag, modified, deleted, true))
    }

    /// Tags for an identifier, ordered case-insensitively
    pub fn get_tags(&self, id: &MediaId, include_deleted: bool) -> Result<Vec<Tag>> {
        let conn = self.connect()?;
        let sql = if include_deleted {
            "SELECT tag, modified, deleted FROM tags WHERE file_id = ?
             ORDER BY tag COLLATE NOCASE ASC"
        } else {
            "SELECT tag, modified, deleted FROM tags WHERE file_id = ? AND deleted = 0
             ORDER BY tag COLLATE NOCASE ASC"
        };
        let mut stmt = conn.prepare(sql)?;
        let tags = stmt
            .query_map([id.as_str()], tag_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }
}

/// Operations available inside a write transaction
pub struct WriteTxn<'c> {
    conn: &'c Connection,
}

impl WriteTxn<'_> {
    pub fn read_file(&self, path: &str) -> Result<Option<FileRecord>> {
        read_file(self.conn, path)
    }

    /// All records with `hash`, including ones marked missing
    pub fn files_with_hash(&self, hash: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FILE_COLUMNS} FROM files WHERE hash = ?"))?;
        let records = stmt
            .query_map([hash], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Paths of all records assigned `id`
    pub fn paths_with_id(&self, id: &MediaId) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM files WHERE id = ?")?;
        let paths = stmt
            .query_map([id.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    pub fn canonical_id_for_hash(&self, hash: &str) -> Result<Option<MediaId>> {
        canonical_id_for_hash(self.conn, hash)
    }

    /// Whether `id` was ever recorded as canonical for any hash
    pub fn id_has_hashes(&self, id: &MediaId) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM hashes WHERE id = ? LIMIT 1", [id.as_str()], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn store_canonical_id(&self, hash: &str, id: &MediaId) -> Result<()> {
        self.conn.execute(
            "INSERT INTO hashes (hash, id) VALUES (?, ?)",
            [hash, id.as_str()],
        )?;
        Ok(())
    }

    pub fn insert_file(&self, record: &FileRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO files (path, size, modified, hash, id, missing) VALUES (?, ?, ?, ?, ?, 0)",
            rusqlite::params![
                record.path,
                record.size as i64,
                record.modified,
                record.hash,
                record.id.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Overwrite stat, hash and id for an existing path; clears `missing`
    pub fn update_file(&self, record: &FileRecord) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE files SET size = ?, modified = ?, hash = ?, id = ?, missing = 0 WHERE path = ?",
            rusqlite::params![
                record.size as i64,
                record.modified,
                record.hash,
                record.id.as_str(),
                record.path,
            ],
        )?;
        if n < 1 {
            return Err(Error::constraint(format!("no record to update for {}", record.path)));
        }
        Ok(())
    }

    pub fn remove_file(&self, path: &str) -> Result<()> {
        self.conn.execute("DELETE FROM files WHERE path = ?", [path])?;
        Ok(())
    }

    /// Set or clear the missing flag, returning whether a row changed
    pub fn set_file_missing(&self, path: &str, missing: bool) -> Result<bool> {
        let n = self.conn.execute(
            "UPDATE files SET missing = ? WHERE path = ? AND missing != ?",
            rusqlite::params![missing, path, missing],
        )?;
        Ok(n > 0)
    }

    /// Insert or update one tag row
    ///
    /// Writes older than (or as old as) the stored row are ignored. Without
    /// `update_modified`, a write that does not change `deleted` is ignored
    /// too. A changed letter case is stored.
    pub fn merge_tag(
        &self,
        id: &MediaId,
        tag: &str,
        modified: i64,
        deleted: bool,
        update_modified: bool,
    ) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag, modified, deleted FROM tags WHERE file_id = ? AND tag = ?")?;
        let existing = stmt
            .query_map([id.as_str(), tag], tag_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if existing.len() > 1 {
            return Err(Error::constraint(format!(
                "duplicate tag rows for id={} tag='{}'",
                id, tag
            )));
        }

        if let Some(e) = existing.first() {
            if e.modified >= modified {
                return Ok(false);
            }
            if e.deleted == deleted && !update_modified {
                return Ok(false);
            }

            self.conn.execute(
                "UPDATE tags SET deleted = ?, modified = ? WHERE file_id = ? AND tag = ?",
                rusqlite::params![deleted, modified, id.as_str(), tag],
            )?;
            if e.tag != tag {
                self.conn.execute(
                    "UPDATE tags SET tag = ? WHERE file_id = ? AND tag = ?",
                    rusqlite::params![tag, id.as_str(), tag],
                )?;
            }
            return Ok(true);
        }

        // First write may be recording a deletion
        self.conn.execute(
            "INSERT INTO tags (file_id, tag, modified, deleted) VALUES (?, ?, ?, ?)",
            rusqlite::params![id.as_str(), tag, modified, deleted],
        )?;
        Ok(true)
    }
}

fn read_file(conn: &Connection, path: &str) -> Result<Option<FileRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?"),
            [path],
            record_from_row,
        )
        .optional()?;
    Ok(record)
}

fn canonical_id_for_hash(conn: &Connection, hash: &str) -> Result<Option<MediaId>> {
    let id = conn
        .query_row("SELECT id FROM hashes WHERE hash = ?", [hash], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(id.map(MediaId::from))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        size: row.get::<_, i64>(1)? as u64,
        modified: row.get(2)?,
        hash: row.get(3)?,
        id: MediaId::from(row.get::<_, String>(4)?),
        missing: row.get(5)?,
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        tag: row.get(0)?,
        modified: row.get(1)?,
        deleted: row.get(2)?,
    })
}
