//! Per-file archive loop: dedup check, transform, multipart upload, ledger commit.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::config::BackupOptions;
use crate::crypto::{EncryptingReader, sealed_len};
use crate::error::{GrsyncError, Result};
use crate::ledger::{DedupLedger, FileIdentity};
use crate::progress::{FileOutcome, Progress};
use crate::read::TransformReader;
use crate::service::{ArchiveMeta, ArchiveService};
use crate::upload::{UploadSession, choose_part_size};

/// Cooperative stop flag, observed between files only.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Stat,
    Transform,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Stat => "stat",
            Stage::Transform => "transform",
            Stage::Upload => "upload",
        })
    }
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub stage: Stage,
    pub error: GrsyncError,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: Vec<FileFailure>,
    /// The loop exited on a stop request before visiting every file.
    pub stopped_early: bool,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.uploaded + self.skipped + self.failed.len()
    }
}

pub struct ArchivePipeline {
    service: Arc<dyn ArchiveService>,
    ledger: DedupLedger,
    options: BackupOptions,
    stop: StopHandle,
    progress: Option<Arc<dyn Progress>>,
}

impl ArchivePipeline {
    pub fn new(
        service: Arc<dyn ArchiveService>,
        ledger: DedupLedger,
        options: BackupOptions,
    ) -> Result<Self> {
        options.validate()?;
        if let Some(codec) = &options.compressor {
            // a codec that cannot start is a setup problem, not a per-file one
            codec.encoder(options.compression_level).map_err(|e| {
                GrsyncError::Configuration(format!("{} codec unavailable: {e}", codec.id().tag()))
            })?;
        }
        info!(
            vault = %options.vault,
            mode = %options.mode(),
            part_size = options.base_part_size,
            "archive pipeline ready"
        );
        Ok(Self {
            service,
            ledger,
            options,
            stop: StopHandle::default(),
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Share an externally created stop flag (e.g. one owned by a signal handler).
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Finish the current file, then stop.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Archive every regular file under `src` (or `src` itself).
    ///
    /// A failing file is recorded in the summary and the loop moves on.
    /// Ledger errors end the run.
    pub fn run(&self, src: &Path) -> Result<RunSummary> {
        let SourceListing { files, unreadable } = collect_files(src)?;
        info!("Number of files to backup: {}", files.len());

        let mut summary = RunSummary {
            total: files.len() + unreadable.len(),
            failed: unreadable,
            ..Default::default()
        };
        for (index, path) in files.iter().enumerate() {
            if self.stop.is_stop_requested() {
                info!("Exiting early, {} files left", files.len() - index);
                summary.stopped_early = true;
                break;
            }
            let label = path.to_string_lossy();
            if let Some(p) = &self.progress {
                p.file_started(&label, index, files.len());
            }

            let outcome = match self.process(path, &label)? {
                Ok(true) => {
                    summary.uploaded += 1;
                    FileOutcome::Uploaded
                }
                Ok(false) => {
                    summary.skipped += 1;
                    FileOutcome::Skipped
                }
                Err((stage, e)) => {
                    error!(path = %label, %stage, "Error backing up file: {e}");
                    summary.failed.push(FileFailure {
                        path: path.clone(),
                        stage,
                        error: e,
                    });
                    FileOutcome::Failed
                }
            };
            if let Some(p) = &self.progress {
                p.file_finished(&label, outcome);
            }
        }

        info!(
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "All files are processed."
        );
        Ok(summary)
    }

    /// Outer `Err` is a ledger failure; inner result is this file's outcome
    /// (`true` = uploaded, `false` = already archived).
    fn process(
        &self,
        path: &Path,
        label: &str,
    ) -> Result<std::result::Result<bool, (Stage, GrsyncError)>> {
        let identity = match FileIdentity::stat(path) {
            Ok(identity) => identity,
            Err(e) => return Ok(Err((Stage::Stat, e))),
        };
        if self.ledger.is_archived(&identity)? {
            debug!(path = %label, "already archived, skipping");
            return Ok(Ok(false));
        }

        info!(path = %label, size = identity.size, "Processing");
        let meta = match self.archive_file(path, label, &identity) {
            Ok(meta) => meta,
            Err(failure) => return Ok(Err(failure)),
        };
        self.ledger.commit(&identity, &meta, self.options.mode())?;
        info!(path = %label, archive_id = %meta.archive_id, "backed up successfully");
        Ok(Ok(true))
    }

    fn archive_file(
        &self,
        path: &Path,
        label: &str,
        identity: &FileIdentity,
    ) -> std::result::Result<ArchiveMeta, (Stage, GrsyncError)> {
        let opts = &self.options;
        let part_size = choose_part_size(self.upload_size_bound(identity.size), opts.base_part_size);
        let description = describe(identity, opts.description.as_deref());

        let file = File::open(path).map_err(|e| (Stage::Transform, e.into()))?;
        let source: Box<dyn Read + Send> = match (opts.encrypt, &opts.encryption_key) {
            (true, Some(key)) => Box::new(
                EncryptingReader::new(BufReader::new(file), key).map_err(|e| (Stage::Transform, e))?,
            ),
            (true, None) => {
                return Err((
                    Stage::Transform,
                    GrsyncError::Configuration("encryption enabled without a key".into()),
                ));
            }
            (false, _) => Box::new(BufReader::new(file)),
        };
        let mut reader = match &opts.compressor {
            Some(codec) => TransformReader::compressed(
                source,
                codec
                    .encoder(opts.compression_level)
                    .map_err(|e| (Stage::Transform, e))?,
            ),
            None => TransformReader::plain(source),
        };

        let mut session = UploadSession::initiate(
            self.service.as_ref(),
            &opts.vault,
            part_size,
            &description,
            &opts.retry,
        )
        .map_err(|e| (Stage::Upload, e))?;
        if let Some(p) = &self.progress {
            session = session.with_progress(p.as_ref(), label);
        }
        session.upload_from(&mut reader).map_err(|e| {
            let stage = match e {
                GrsyncError::Service { .. } => Stage::Upload,
                _ => Stage::Transform,
            };
            (stage, e)
        })
    }

    /// Upper bound on the bytes actually uploaded for a source of `size`.
    fn upload_size_bound(&self, size: u64) -> u64 {
        let mut bound = size;
        if self.options.encrypt {
            bound = sealed_len(bound);
        }
        if let Some(codec) = &self.options.compressor {
            bound = codec.max_output(bound);
        }
        bound
    }

    /// Flush and release the ledger.
    pub fn close(self) -> Result<()> {
        self.ledger.close()
    }
}

/// Archive description: `grsync|<path>|<size>|<mtime>|<desc>`.
pub fn describe(identity: &FileIdentity, desc: Option<&str>) -> String {
    format!(
        "grsync|{}|{}|{}|{}",
        identity.path,
        identity.size,
        identity.mtime,
        desc.unwrap_or("")
    )
}

/// Result of walking a backup source.
#[derive(Debug, Default)]
pub struct SourceListing {
    /// Absolute paths of regular files, in file-name order.
    pub files: Vec<PathBuf>,
    /// Entries the walk could not read, reported at the stat stage.
    pub unreadable: Vec<FileFailure>,
}

/// Walk `src`; a file path yields itself. Symlinks and special files are skipped.
pub fn collect_files(src: &Path) -> Result<SourceListing> {
    let root = std::path::absolute(src)
        .map_err(|e| GrsyncError::Configuration(format!("bad source path {}: {e}", src.display())))?;
    let md = fs::metadata(&root).map_err(|e| {
        GrsyncError::Configuration(format!("cannot read source {}: {e}", root.display()))
    })?;
    if !md.is_dir() {
        return Ok(SourceListing {
            files: vec![root],
            unreadable: Vec::new(),
        });
    }

    let mut listing = SourceListing::default();
    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        match entry {
            Ok(e) if e.file_type().is_file() => listing.files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().map_or_else(|| root.clone(), Path::to_path_buf);
                error!(path = %path.display(), stage = %Stage::Stat, "cannot read entry: {e}");
                listing.unreadable.push(FileFailure {
                    path,
                    stage: Stage::Stat,
                    error: GrsyncError::Io(e.into()),
                });
            }
        }
    }
    Ok(listing)
}
