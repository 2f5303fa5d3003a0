use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use grsync_core::crypto::EncryptionKey;
use grsync_core::error::{GrsyncError, Result};
use grsync_core::{
    ArchivePipeline, ArchiveService, BackupOptions, DedupLedger, FsVault, GlacierVault, codec,
};
use tracing::{error, info, warn};

use crate::application::keyfile;
use crate::application::progress::LogProgress;
use crate::presentation::cli::{BackupArgs, GlobalArgs};
use crate::signal;

fn vault_name(global: &GlobalArgs) -> Result<&str> {
    global
        .vault
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| GrsyncError::Configuration("--vault (or GRSYNC_VAULT) is required".into()))
}

/// Where archives go: Glacier when a region is configured, else the local store.
enum Store {
    Local(Arc<FsVault>),
    Glacier(Arc<GlacierVault>),
}

impl Store {
    fn service(&self) -> Arc<dyn ArchiveService> {
        match self {
            Store::Local(fs) => fs.clone() as Arc<dyn ArchiveService>,
            Store::Glacier(glacier) => glacier.clone(),
        }
    }

    fn create_vault(&self, vault: &str) -> Result<String> {
        match self {
            Store::Local(fs) => fs.create_vault(vault).map(|dir| dir.display().to_string()),
            Store::Glacier(glacier) => glacier.create_vault(vault),
        }
    }
}

fn open_store(global: &GlobalArgs) -> Result<Store> {
    match global.region.as_deref().filter(|r| !r.trim().is_empty()) {
        Some(region) => Ok(Store::Glacier(Arc::new(GlacierVault::connect(region)?))),
        None => Ok(Store::Local(Arc::new(FsVault::new(&global.store)))),
    }
}

/// Resolve the key from the flag, the environment, or a key file.
fn load_key(inline: Option<String>, file: Option<PathBuf>) -> Result<Option<EncryptionKey>> {
    if let Some(encoded) = inline {
        return EncryptionKey::from_base64(&encoded).map(Some);
    }
    file.as_deref().map(keyfile::read_key_file).transpose()
}

fn backup_options(vault: &str, args: BackupArgs) -> Result<(PathBuf, BackupOptions)> {
    let mut opts = BackupOptions::new(vault);
    opts.description = args.desc;
    opts.base_part_size = args.part_size;
    opts.encrypt = args.encrypt;
    opts.compression_level = args.level;
    if args.compress {
        opts.compressor = Some(codec::select(&args.codec)?);
    }
    opts.encryption_key = load_key(args.encryption_key, args.encryption_key_file)?;
    if opts.encryption_key.is_some() && !opts.encrypt {
        warn!("encryption key given without --encrypt; files will be uploaded unencrypted");
    }
    Ok((args.src, opts))
}

pub fn handle_backup(global: &GlobalArgs, args: BackupArgs) -> Result<ExitCode> {
    let vault = vault_name(global)?;
    let (src, opts) = backup_options(vault, args)?;

    let ledger = DedupLedger::open(&global.db)?;
    info!(ledger = %ledger.path().display(), src = %src.display(), "starting backup");
    let pipeline = ArchivePipeline::new(open_store(global)?.service(), ledger, opts)?
        .with_progress(Arc::new(LogProgress));
    signal::install(pipeline.stop_handle());

    let outcome = pipeline.run(&src);
    // flush the ledger even when the run failed part-way
    let closed = pipeline.close();
    let summary = outcome?;
    closed?;

    for failure in &summary.failed {
        error!(
            path = %failure.path.display(),
            stage = %failure.stage,
            "not archived: {}",
            failure.error
        );
    }
    println!(
        "{} files: {} uploaded, {} skipped, {} failed{}",
        summary.total,
        summary.uploaded,
        summary.skipped,
        summary.failed.len(),
        if summary.stopped_early {
            format!(", {} not visited (stopped)", summary.total - summary.processed())
        } else {
            String::new()
        }
    );
    Ok(if summary.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub fn handle_list_uploads(global: &GlobalArgs, json: bool) -> Result<ExitCode> {
    let vault = vault_name(global)?;
    let uploads = open_store(global)?.service().list_incomplete_uploads(vault)?;
    if json {
        let out = serde_json::to_string_pretty(&uploads)
            .map_err(|e| GrsyncError::Transform(e.to_string()))?;
        println!("{out}");
        return Ok(ExitCode::SUCCESS);
    }
    if uploads.is_empty() {
        println!("No incomplete uploads in {vault}");
        return Ok(ExitCode::SUCCESS);
    }
    for u in &uploads {
        println!("{}  {}  part={}  {}", u.upload_id, u.created_at, u.part_size, u.description);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn handle_abort_uploads(global: &GlobalArgs, upload_ids: Vec<String>, all: bool) -> Result<ExitCode> {
    let vault = vault_name(global)?;
    let store = open_store(global)?.service();
    let ids = if all {
        store
            .list_incomplete_uploads(vault)?
            .into_iter()
            .map(|u| u.upload_id)
            .collect()
    } else {
        upload_ids
    };

    let mut failed = 0usize;
    for id in &ids {
        match store.abort_upload(vault, id) {
            Ok(()) => info!(upload_id = %id, "aborted"),
            Err(e) => {
                error!(upload_id = %id, "abort failed: {e}");
                failed += 1;
            }
        }
    }
    println!("aborted {} of {} uploads", ids.len() - failed, ids.len());
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub fn handle_history(global: &GlobalArgs, path: PathBuf, json: bool) -> Result<ExitCode> {
    let ledger = DedupLedger::open(&global.db)?;
    let key = ledger_key(&path)?;
    let records = ledger.history(&key)?;
    ledger.close()?;

    if json {
        let out = serde_json::to_string_pretty(&records)
            .map_err(|e| GrsyncError::Transform(e.to_string()))?;
        println!("{out}");
    } else if records.is_empty() {
        println!("{key}: never archived");
    } else {
        for r in &records {
            println!(
                "{}  {}  {} bytes  {}  {}",
                r.timestamp, r.archive_id, r.identity.size, r.mode, r.checksum
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Ledger paths are the absolute paths the walk produced; deleted files
/// still resolve.
fn ledger_key(path: &Path) -> Result<String> {
    std::path::absolute(path)
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|e| GrsyncError::Configuration(format!("bad path {}: {e}", path.display())))
}

pub fn handle_keygen(path: PathBuf, force: bool, verify: bool) -> Result<ExitCode> {
    if verify {
        return match keyfile::read_key_file(&path) {
            Ok(_) => {
                println!("{} contains a valid encryption key", path.display());
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                println!("{} is not a usable key file: {e}", path.display());
                Ok(ExitCode::FAILURE)
            }
        };
    }
    keyfile::generate_key_file(&path, force)?;
    println!("wrote new encryption key to {} (mode 600)", path.display());
    println!("keep a copy somewhere safe: archives encrypted with it cannot be read without it");
    Ok(ExitCode::SUCCESS)
}

pub fn handle_create_vault(global: &GlobalArgs) -> Result<ExitCode> {
    let vault = vault_name(global)?;
    let location = open_store(global)?.create_vault(vault)?;
    println!("vault {vault} ready at {location}");
    Ok(ExitCode::SUCCESS)
}
