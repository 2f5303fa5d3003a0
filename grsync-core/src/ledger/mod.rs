//! Persistent dedup ledger: one append-only SQLite table of completed archives.

use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GrsyncError, Result};
use crate::service::ArchiveMeta;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sync_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    mtime REAL NOT NULL,
    archive_id TEXT NOT NULL,
    location TEXT NOT NULL,
    checksum TEXT NOT NULL,
    compression TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS sync_history_identity ON sync_history (path, file_size, mtime);";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Dedup key: (absolute path, size, mtime). Equal only when all three match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileIdentity {
    pub path: String,
    pub size: u64,
    /// Seconds since the Unix epoch, with sub-second precision.
    pub mtime: f64,
}

impl FileIdentity {
    pub fn from_metadata(path: &Path, md: &std::fs::Metadata) -> Self {
        let mtime = md
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            path: path.to_string_lossy().into_owned(),
            size: md.len(),
            mtime,
        }
    }

    pub fn stat(path: &Path) -> Result<Self> {
        let md = std::fs::metadata(path)?;
        Ok(Self::from_metadata(path, &md))
    }
}

/// Content transform applied before upload, stored as the `compression` column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveMode {
    #[serde(rename = "plain")]
    Plain,
    #[serde(rename = "plain+zstd")]
    PlainZstd,
    #[serde(rename = "encrypted")]
    Encrypted,
    #[serde(rename = "encrypted+zstd")]
    EncryptedZstd,
}

impl ArchiveMode {
    pub fn new(encrypted: bool, compressed: bool) -> Self {
        match (encrypted, compressed) {
            (false, false) => ArchiveMode::Plain,
            (false, true) => ArchiveMode::PlainZstd,
            (true, false) => ArchiveMode::Encrypted,
            (true, true) => ArchiveMode::EncryptedZstd,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveMode::Plain => "plain",
            ArchiveMode::PlainZstd => "plain+zstd",
            ArchiveMode::Encrypted => "encrypted",
            ArchiveMode::EncryptedZstd => "encrypted+zstd",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "plain" => Some(ArchiveMode::Plain),
            "plain+zstd" => Some(ArchiveMode::PlainZstd),
            "encrypted" => Some(ArchiveMode::Encrypted),
            "encrypted+zstd" => Some(ArchiveMode::EncryptedZstd),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArchiveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub id: i64,
    pub identity: FileIdentity,
    pub archive_id: String,
    pub location: String,
    pub checksum: String,
    pub mode: ArchiveMode,
    pub timestamp: String,
}

pub struct DedupLedger {
    conn: Connection,
    path: PathBuf,
}

impl DedupLedger {
    /// Open (or create) the ledger database in WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable =
            |e: rusqlite::Error| GrsyncError::StorageUnavailable(format!("{}: {e}", path.display()));
        let conn = Connection::open(path).map_err(unavailable)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(unavailable)?;
        // journal_mode returns the resulting mode as a row
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(unavailable)?;
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        info!(path = %path.display(), journal_mode = %mode, "opened dedup ledger");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_archived(&self, identity: &FileIdentity) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM sync_history WHERE path = ?1 AND file_size = ?2 AND mtime = ?3 LIMIT 1",
                params![identity.path, identity.size as i64, identity.mtime],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Append one record. Returns the new row id.
    pub fn commit(&self, identity: &FileIdentity, meta: &ArchiveMeta, mode: ArchiveMode) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sync_history
                (path, file_size, mtime, archive_id, location, checksum, compression, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                identity.path,
                identity.size as i64,
                identity.mtime,
                meta.archive_id,
                meta.location,
                meta.checksum,
                mode.as_str(),
                meta.timestamp,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(path = %identity.path, archive_id = %meta.archive_id, id, "recorded archive");
        Ok(id)
    }

    /// Most recent record matching the identity.
    pub fn latest(&self, identity: &FileIdentity) -> Result<Option<ArchiveRecord>> {
        let rec = self
            .conn
            .query_row(
                "SELECT id, path, file_size, mtime, archive_id, location, checksum, compression, timestamp
                 FROM sync_history WHERE path = ?1 AND file_size = ?2 AND mtime = ?3
                 ORDER BY id DESC LIMIT 1",
                params![identity.path, identity.size as i64, identity.mtime],
                record_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    /// All records for a path, oldest first.
    pub fn history(&self, path: &str) -> Result<Vec<ArchiveRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, file_size, mtime, archive_id, location, checksum, compression, timestamp
             FROM sync_history WHERE path = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![path], record_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_history", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Checkpoint the WAL and release the connection.
    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        self.conn.close().map_err(|(_, e)| GrsyncError::from(e))?;
        info!(path = %path.display(), "closed dedup ledger");
        Ok(())
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ArchiveRecord> {
    let size: i64 = row.get(2)?;
    let tag: String = row.get(7)?;
    let mode = ArchiveMode::parse(&tag).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("unknown archive mode {tag:?}").into(),
        )
    })?;
    Ok(ArchiveRecord {
        id: row.get(0)?,
        identity: FileIdentity {
            path: row.get(1)?,
            size: size as u64,
            mtime: row.get(3)?,
        },
        archive_id: row.get(4)?,
        location: row.get(5)?,
        checksum: row.get(6)?,
        mode,
        timestamp: row.get(8)?,
    })
}
