//! Persisted fingerprint store
//!
//! SQLite table keyed by the canonical fingerprint hex string. Each record
//! keeps the source URL of the first sighting and a `matches` counter that
//! increments on every lookup hit; the counter is an observability signal
//! and never drives eviction. Records are never deleted.

use super::fingerprint::Fingerprint;
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Durable fingerprint table
pub struct HashStore {
    conn: Mutex<Connection>,
}

impl HashStore {
    /// Open (or create) the store at the given path
    ///
    /// # Errors
    ///
    /// Returns a database error if the file exists but cannot be opened,
    /// which is fatal at startup.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        tracing::info!(path = %path.display(), "Fingerprint store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (tests)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS image_hashes (
                fingerprint TEXT PRIMARY KEY,
                source_url  TEXT,
                matches     INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check whether a fingerprint was already seen
    ///
    /// A hit atomically increments the record's `matches` counter.
    pub fn contains(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE image_hashes SET matches = matches + 1 WHERE fingerprint = ?1",
            params![fingerprint.to_hex()],
        )?;
        Ok(updated > 0)
    }

    /// Record a fingerprint if absent
    ///
    /// Idempotent: an existing record is left untouched, including its
    /// `matches` counter. Returns whether a new record was inserted.
    pub fn insert(&self, fingerprint: &Fingerprint, source_url: Option<&str>) -> Result<bool> {
        let conn = self.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO image_hashes (fingerprint, source_url, matches)
             VALUES (?1, ?2, 0)",
            params![fingerprint.to_hex(), source_url],
        )?;
        Ok(inserted > 0)
    }

    /// Look up the match counter for a fingerprint
    pub fn match_count(&self, fingerprint: &Fingerprint) -> Result<Option<u64>> {
        let conn = self.lock();
        let count = conn
            .query_row(
                "SELECT matches FROM image_hashes WHERE fingerprint = ?1",
                params![fingerprint.to_hex()],
                |row| row.get::<_, u64>(0),
            )
            .optional()?;
        Ok(count)
    }

    /// Total number of recorded fingerprints
    pub fn len(&self) -> Result<usize> {
        let conn = self.lock();
        let count: usize =
            conn.query_row("SELECT COUNT(*) FROM image_hashes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Check whether the store holds no records
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
