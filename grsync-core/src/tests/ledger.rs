use rusqlite::Connection;
use tempfile::TempDir;

use crate::error::GrsyncError;
use crate::ledger::{ArchiveMode, DedupLedger, FileIdentity};
use crate::service::ArchiveMeta;

fn identity(path: &str, size: u64, mtime: f64) -> FileIdentity {
    FileIdentity {
        path: path.to_string(),
        size,
        mtime,
    }
}

fn meta(archive_id: &str) -> ArchiveMeta {
    ArchiveMeta {
        archive_id: archive_id.to_string(),
        location: format!("/vault/archives/{archive_id}"),
        checksum: "ab".repeat(32),
        timestamp: "2024-03-17T12:00:00Z".to_string(),
    }
}

#[test]
fn open_creates_the_history_table() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("glacier.db");
    DedupLedger::open(&db).unwrap().close().unwrap();

    let conn = Connection::open(&db).unwrap();
    let name: String = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='sync_history'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(name, "sync_history");
    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[test]
fn commit_makes_identity_archived() {
    let dir = TempDir::new().unwrap();
    let ledger = DedupLedger::open(&dir.path().join("l.db")).unwrap();
    let id = identity("/data/a.txt", 1024, 1_700_000_000.25);

    assert!(!ledger.is_archived(&id).unwrap());
    ledger.commit(&id, &meta("arch-1"), ArchiveMode::PlainZstd).unwrap();
    assert!(ledger.is_archived(&id).unwrap());

    let rec = ledger.latest(&id).unwrap().unwrap();
    assert_eq!(rec.identity, id);
    assert_eq!(rec.archive_id, "arch-1");
    assert_eq!(rec.mode, ArchiveMode::PlainZstd);
    assert_eq!(rec.timestamp, "2024-03-17T12:00:00Z");
}

#[test]
fn every_identity_field_must_match() {
    let dir = TempDir::new().unwrap();
    let ledger = DedupLedger::open(&dir.path().join("l.db")).unwrap();
    let id = identity("/data/a.txt", 1024, 1_700_000_000.25);
    ledger.commit(&id, &meta("arch-1"), ArchiveMode::Plain).unwrap();

    assert!(!ledger.is_archived(&identity("/data/b.txt", 1024, 1_700_000_000.25)).unwrap());
    assert!(!ledger.is_archived(&identity("/data/a.txt", 1025, 1_700_000_000.25)).unwrap());
    assert!(!ledger.is_archived(&identity("/data/a.txt", 1024, 1_700_000_000.5)).unwrap());
}

#[test]
fn duplicate_commits_append_and_latest_wins() {
    let dir = TempDir::new().unwrap();
    let ledger = DedupLedger::open(&dir.path().join("l.db")).unwrap();
    let id = identity("/data/a.txt", 10, 5.0);
    let first = ledger.commit(&id, &meta("arch-1"), ArchiveMode::Plain).unwrap();
    let second = ledger.commit(&id, &meta("arch-2"), ArchiveMode::Encrypted).unwrap();

    assert!(second > first);
    assert_eq!(ledger.count().unwrap(), 2);
    assert_eq!(ledger.latest(&id).unwrap().unwrap().archive_id, "arch-2");
    let history = ledger.history("/data/a.txt").unwrap();
    let ids: Vec<&str> = history.iter().map(|r| r.archive_id.as_str()).collect();
    assert_eq!(ids, ["arch-1", "arch-2"]);
}

#[test]
fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("l.db");
    let id = identity("/data/a.txt", 10, 5.0);
    {
        let ledger = DedupLedger::open(&db).unwrap();
        ledger.commit(&id, &meta("arch-1"), ArchiveMode::EncryptedZstd).unwrap();
        ledger.close().unwrap();
    }
    let ledger = DedupLedger::open(&db).unwrap();
    assert!(ledger.is_archived(&id).unwrap());
    assert_eq!(ledger.latest(&id).unwrap().unwrap().mode, ArchiveMode::EncryptedZstd);
}

#[test]
fn commits_survive_exit_without_close() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("l.db");
    let id = identity("/data/a.txt", 10, 5.0);
    let ledger = DedupLedger::open(&db).unwrap();
    ledger.commit(&id, &meta("arch-1"), ArchiveMode::Plain).unwrap();
    // no checkpoint, no connection teardown: as after a forced exit
    std::mem::forget(ledger);

    let reopened = DedupLedger::open(&db).unwrap();
    assert!(reopened.is_archived(&id).unwrap());
    assert_eq!(reopened.count().unwrap(), 1);
}

#[test]
fn unopenable_store_is_storage_unavailable() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("missing-dir").join("l.db");
    let err = DedupLedger::open(&db).err().expect("parent directory does not exist");
    assert!(matches!(err, GrsyncError::StorageUnavailable(_)), "{err}");
    assert!(err.is_fatal());
}

#[test]
fn mode_tags_round_trip() {
    for (enc, zstd, tag) in [
        (false, false, "plain"),
        (false, true, "plain+zstd"),
        (true, false, "encrypted"),
        (true, true, "encrypted+zstd"),
    ] {
        let mode = ArchiveMode::new(enc, zstd);
        assert_eq!(mode.as_str(), tag);
        assert_eq!(ArchiveMode::parse(tag), Some(mode));
    }
    assert_eq!(ArchiveMode::parse("gzip"), None);
}

#[test]
fn identity_reflects_file_metadata() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("f.bin");
    std::fs::write(&path, vec![0u8; 333]).unwrap();
    let id = FileIdentity::stat(&path).unwrap();
    assert_eq!(id.size, 333);
    assert!(id.mtime > 0.0);
    assert_eq!(id, FileIdentity::stat(&path).unwrap());
}
