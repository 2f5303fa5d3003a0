//! Archive service backed by a local directory.
//!
//! ```text
//! <root>/<vault>/uploads/<upload_id>/upload.json
//! <root>/<vault>/uploads/<upload_id>/<start offset>.part
//! <root>/<vault>/archives/<archive_id>
//! <root>/<vault>/archives/<archive_id>.json
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ArchiveMeta, ArchiveService, ByteRange, IncompleteUpload, now_rfc3339};
use crate::error::{GrsyncError, Result};
use crate::hash::{fold_checksums, hash_part};

const UPLOAD_META: &str = "upload.json";
const PART_EXT: &str = "part";

#[derive(Serialize, Deserialize)]
struct UploadMeta {
    upload_id: String,
    description: String,
    part_size: u64,
    created_at: String,
}

#[derive(Serialize, Deserialize)]
struct StoredArchive {
    archive_id: String,
    description: String,
    size: u64,
    checksum: String,
    created_at: String,
}

pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the vault directory; succeeds if it already exists.
    pub fn create_vault(&self, vault: &str) -> Result<PathBuf> {
        let dir = self.root.join(vault);
        fs::create_dir_all(dir.join("uploads"))?;
        fs::create_dir_all(dir.join("archives"))?;
        info!(vault, path = %dir.display(), "vault ready");
        Ok(dir)
    }

    /// Location of an archive's assembled bytes.
    pub fn archive_path(&self, vault: &str, archive_id: &str) -> PathBuf {
        self.root.join(vault).join("archives").join(archive_id)
    }

    fn vault_dir(&self, op: &'static str, vault: &str) -> Result<PathBuf> {
        let dir = self.root.join(vault);
        if !dir.is_dir() {
            return Err(GrsyncError::service(op, format!("vault {vault:?} does not exist")));
        }
        Ok(dir)
    }

    fn upload_dir(&self, op: &'static str, vault: &str, upload_id: &str) -> Result<PathBuf> {
        if upload_id.is_empty() || upload_id.contains(['/', '\\', '.']) {
            return Err(GrsyncError::service(op, format!("invalid upload id {upload_id:?}")));
        }
        let dir = self.vault_dir(op, vault)?.join("uploads").join(upload_id);
        if !dir.is_dir() {
            return Err(GrsyncError::service(op, format!("upload {upload_id} not found")));
        }
        Ok(dir)
    }

    fn read_meta(op: &'static str, dir: &Path) -> Result<UploadMeta> {
        let raw = fs::read(dir.join(UPLOAD_META)).map_err(io_failure(op))?;
        serde_json::from_slice(&raw)
            .map_err(|e| GrsyncError::service(op, format!("corrupt upload metadata: {e}")))
    }

    /// Parts of an upload sorted by start offset.
    fn parts(op: &'static str, dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
        let mut parts = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_failure(op))? {
            let path = entry.map_err(io_failure(op))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PART_EXT) {
                continue;
            }
            let start = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| GrsyncError::service(op, format!("stray part file {}", path.display())))?;
            parts.push((start, path));
        }
        parts.sort_by_key(|(start, _)| *start);
        Ok(parts)
    }
}

impl ArchiveService for FsVault {
    fn initiate_upload(&self, vault: &str, part_size: u64, description: &str) -> Result<String> {
        const OP: &str = "initiate_upload";
        if part_size == 0 {
            return Err(GrsyncError::service(OP, "part size must be positive"));
        }
        let uploads = self.vault_dir(OP, vault)?.join("uploads");
        let upload_id = new_id(OP)?;
        let dir = uploads.join(&upload_id);
        fs::create_dir_all(&dir).map_err(io_failure(OP))?;
        let meta = UploadMeta {
            upload_id: upload_id.clone(),
            description: description.to_string(),
            part_size,
            created_at: now_rfc3339(OP)?,
        };
        let raw = serde_json::to_vec_pretty(&meta)
            .map_err(|e| GrsyncError::service(OP, e.to_string()))?;
        fs::write(dir.join(UPLOAD_META), raw).map_err(io_failure(OP))?;
        debug!(vault, %upload_id, part_size, "upload initiated");
        Ok(upload_id)
    }

    fn upload_part(&self, vault: &str, upload_id: &str, range: ByteRange, body: &[u8]) -> Result<String> {
        const OP: &str = "upload_part";
        let dir = self.upload_dir(OP, vault, upload_id)?;
        let meta = Self::read_meta(OP, &dir)?;
        if body.len() as u64 != range.len() {
            return Err(GrsyncError::service(
                OP,
                format!("range {} does not match body length {}", range.header(), body.len()),
            ));
        }
        if range.start % meta.part_size != 0 || range.len() > meta.part_size {
            return Err(GrsyncError::service(
                OP,
                format!("range {} is not aligned to part size {}", range.header(), meta.part_size),
            ));
        }
        let checksum = hash_part(body);
        let path = dir.join(format!("{:020}.{PART_EXT}", range.start));
        fs::write(&path, body).map_err(io_failure(OP))?;
        Ok(checksum)
    }

    fn complete_upload(
        &self,
        vault: &str,
        upload_id: &str,
        total_size: u64,
        root_checksum: &str,
    ) -> Result<ArchiveMeta> {
        const OP: &str = "complete_upload";
        let dir = self.upload_dir(OP, vault, upload_id)?;
        let meta = Self::read_meta(OP, &dir)?;
        let parts = Self::parts(OP, &dir)?;

        let mut expected_start = 0u64;
        let mut checksums = Vec::with_capacity(parts.len());
        let mut bodies = Vec::with_capacity(parts.len());
        for (i, (start, path)) in parts.iter().enumerate() {
            if *start != expected_start {
                return Err(GrsyncError::service(
                    OP,
                    format!("missing bytes {expected_start}-{}", start.saturating_sub(1)),
                ));
            }
            let body = fs::read(path).map_err(io_failure(OP))?;
            let is_last = i + 1 == parts.len();
            if !is_last && body.len() as u64 != meta.part_size {
                return Err(GrsyncError::service(
                    OP,
                    format!("part at {start} is {} bytes, expected {}", body.len(), meta.part_size),
                ));
            }
            expected_start += body.len() as u64;
            checksums.push(hash_part(&body));
            bodies.push(path.clone());
        }
        if expected_start != total_size {
            return Err(GrsyncError::service(
                OP,
                format!("archive size {total_size} does not match uploaded {expected_start} bytes"),
            ));
        }
        let computed = fold_checksums(&checksums)?;
        if !computed.eq_ignore_ascii_case(root_checksum.trim()) {
            return Err(GrsyncError::service(
                OP,
                format!("tree hash mismatch: expected {computed}, got {root_checksum}"),
            ));
        }

        let archives = self.vault_dir(OP, vault)?.join("archives");
        fs::create_dir_all(&archives).map_err(io_failure(OP))?;
        let archive_id = new_id(OP)?;
        let mut out = File::create(archives.join(&archive_id)).map_err(io_failure(OP))?;
        for path in &bodies {
            let mut part = File::open(path).map_err(io_failure(OP))?;
            io::copy(&mut part, &mut out).map_err(io_failure(OP))?;
        }
        out.flush().map_err(io_failure(OP))?;

        let timestamp = now_rfc3339(OP)?;
        let stored = StoredArchive {
            archive_id: archive_id.clone(),
            description: meta.description,
            size: total_size,
            checksum: computed.clone(),
            created_at: timestamp.clone(),
        };
        let raw = serde_json::to_vec_pretty(&stored)
            .map_err(|e| GrsyncError::service(OP, e.to_string()))?;
        fs::write(archives.join(format!("{archive_id}.json")), raw).map_err(io_failure(OP))?;
        fs::remove_dir_all(&dir).map_err(io_failure(OP))?;

        debug!(vault, upload_id, %archive_id, total_size, "upload completed");
        Ok(ArchiveMeta {
            location: format!("/{vault}/archives/{archive_id}"),
            archive_id,
            checksum: computed,
            timestamp,
        })
    }

    fn abort_upload(&self, vault: &str, upload_id: &str) -> Result<()> {
        const OP: &str = "abort_upload";
        let dir = self.upload_dir(OP, vault, upload_id)?;
        fs::remove_dir_all(&dir).map_err(io_failure(OP))?;
        debug!(vault, upload_id, "upload aborted");
        Ok(())
    }

    fn list_incomplete_uploads(&self, vault: &str) -> Result<Vec<IncompleteUpload>> {
        const OP: &str = "list_incomplete_uploads";
        let uploads = self.vault_dir(OP, vault)?.join("uploads");
        let mut out = Vec::new();
        if !uploads.is_dir() {
            return Ok(out);
        }
        for entry in fs::read_dir(&uploads).map_err(io_failure(OP))? {
            let dir = entry.map_err(io_failure(OP))?.path();
            if !dir.is_dir() {
                continue;
            }
            let meta = Self::read_meta(OP, &dir)?;
            out.push(IncompleteUpload {
                upload_id: meta.upload_id,
                description: meta.description,
                created_at: meta.created_at,
                part_size: meta.part_size,
            });
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.upload_id.cmp(&b.upload_id)));
        Ok(out)
    }
}

fn io_failure(op: &'static str) -> impl Fn(io::Error) -> GrsyncError {
    move |e| GrsyncError::service(op, e.to_string())
}

fn new_id(op: &'static str) -> Result<String> {
    let mut raw = [0u8; 16];
    getrandom::getrandom(&mut raw).map_err(|e| GrsyncError::service(op, e.to_string()))?;
    Ok(hex::encode(raw))
}
