//! One file's multipart upload.
//!
//! ```text
//! Initiated -> Uploading -> Completing -> Completed
//!                  |             |
//!                  +--> Aborting <+ --> Aborted
//! ```
//!
//! Parts go out strictly in offset order. A part is retried per the
//! [`RetryPolicy`]; exhaustion or a terminal error aborts the remote upload and
//! fails the whole file. Dropping a session that never finished also aborts it.

use std::io::Read;

use tracing::{debug, error, info};

use crate::error::{GrsyncError, Result};
use crate::hash::{fold_checksums, hash_part};
use crate::progress::Progress;
use crate::read::{ReadOutcome, TransformReader};
use crate::service::{ArchiveMeta, ArchiveService, ByteRange};
use crate::upload::retry::{RetryPolicy, retry_with_backoff};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Initiated,
    Uploading,
    Completing,
    Completed,
    Aborting,
    Aborted,
}

pub struct UploadSession<'a> {
    service: &'a dyn ArchiveService,
    vault: &'a str,
    retry: &'a RetryPolicy,
    progress: Option<(&'a dyn Progress, &'a str)>,
    upload_id: String,
    part_size: u64,
    checksums: Vec<String>,
    offset: u64,
    state: SessionState,
}

impl<'a> UploadSession<'a> {
    /// Open the remote session. Rejection here is terminal and nothing needs
    /// aborting.
    pub fn initiate(
        service: &'a dyn ArchiveService,
        vault: &'a str,
        part_size: u64,
        description: &str,
        retry: &'a RetryPolicy,
    ) -> Result<Self> {
        let upload_id = service.initiate_upload(vault, part_size, description)?;
        debug!(vault, %upload_id, part_size, "session initiated");
        Ok(Self {
            service,
            vault,
            retry,
            progress: None,
            upload_id,
            part_size,
            checksums: Vec::new(),
            offset: 0,
            state: SessionState::Initiated,
        })
    }

    /// Report acknowledged bytes for `label` to `progress`.
    pub fn with_progress(mut self, progress: &'a dyn Progress, label: &'a str) -> Self {
        self.progress = Some((progress, label));
        self
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Tree hashes of the acknowledged parts, in offset order.
    pub fn checksums(&self) -> &[String] {
        &self.checksums
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.offset
    }

    /// Send the next part at the current offset.
    pub fn upload_part(&mut self, chunk: &[u8]) -> Result<()> {
        self.ensure_open("upload_part")?;
        if chunk.is_empty() {
            return Ok(());
        }
        if chunk.len() as u64 > self.part_size {
            let err = GrsyncError::service(
                "upload_part",
                format!("part of {} bytes exceeds part size {}", chunk.len(), self.part_size),
            );
            self.abort();
            return Err(err);
        }
        self.state = SessionState::Uploading;

        let range = ByteRange::at(self.offset, chunk.len() as u64);
        let local = hash_part(chunk);
        let (service, vault, upload_id) = (self.service, self.vault, self.upload_id.as_str());
        let sent = retry_with_backoff(self.retry, "upload_part", |attempt| {
            debug!(upload_id, range = %range.header(), attempt, "uploading part");
            service.upload_part(vault, upload_id, range, chunk)
        });

        let remote = match sent {
            Ok(remote) => remote,
            Err(e) => {
                error!(upload_id = %self.upload_id, range = %range.header(), "part upload failed: {e}");
                self.abort();
                return Err(e);
            }
        };
        if !remote.eq_ignore_ascii_case(&local) {
            let err = GrsyncError::service(
                "upload_part",
                format!(
                    "service checksum {remote} for {} does not match local {local}",
                    range.header()
                ),
            );
            self.abort();
            return Err(err);
        }

        self.checksums.push(local);
        self.offset += chunk.len() as u64;
        if let Some((progress, label)) = self.progress {
            progress.bytes_uploaded(label, self.offset);
        }
        Ok(())
    }

    /// Drain `reader` in part-size chunks, then complete.
    pub fn upload_from<R: Read>(mut self, reader: &mut TransformReader<R>) -> Result<ArchiveMeta> {
        let part_size = usize::try_from(self.part_size)
            .map_err(|_| GrsyncError::Configuration(format!("part size {} too large", self.part_size)))?;
        loop {
            match reader.read_chunk(part_size)? {
                ReadOutcome::Data(chunk) => self.upload_part(&chunk)?,
                ReadOutcome::End | ReadOutcome::Exhausted => break,
            }
        }
        self.complete()
    }

    /// Fold the part checksums and finalize. A rejection is not retried.
    pub fn complete(mut self) -> Result<ArchiveMeta> {
        self.ensure_open("complete_upload")?;
        self.state = SessionState::Completing;

        let root = match fold_checksums(&self.checksums) {
            Ok(root) => root,
            Err(e) => {
                self.abort();
                return Err(e);
            }
        };
        match self
            .service
            .complete_upload(self.vault, &self.upload_id, self.offset, &root)
        {
            Ok(meta) => {
                self.state = SessionState::Completed;
                debug!(upload_id = %self.upload_id, archive_id = %meta.archive_id, "session completed");
                Ok(meta)
            }
            Err(e) => {
                error!(upload_id = %self.upload_id, "completion rejected: {e}");
                self.abort();
                Err(e)
            }
        }
    }

    /// Best-effort remote abort; failures are logged only.
    pub fn abort(&mut self) {
        if matches!(self.state, SessionState::Completed | SessionState::Aborted) {
            return;
        }
        self.state = SessionState::Aborting;
        match self.service.abort_upload(self.vault, &self.upload_id) {
            Ok(()) => info!(upload_id = %self.upload_id, "aborted multipart upload"),
            Err(e) => error!(upload_id = %self.upload_id, "error aborting multipart upload: {e}"),
        }
        self.state = SessionState::Aborted;
    }

    fn ensure_open(&self, op: &'static str) -> Result<()> {
        match self.state {
            SessionState::Initiated | SessionState::Uploading => Ok(()),
            other => Err(GrsyncError::service(op, format!("session is {other:?}"))),
        }
    }
}

impl Drop for UploadSession<'_> {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Initiated | SessionState::Uploading) {
            self.abort();
        }
    }
}
