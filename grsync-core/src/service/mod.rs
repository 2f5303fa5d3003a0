use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{GrsyncError, Result};

pub mod fs;
pub mod glacier;

pub use fs::FsVault;
pub use glacier::GlacierVault;

/// Inclusive byte range of one part within the (unknown-length) upload stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Range covering `len` bytes from `start`. `len` must be non-zero.
    pub fn at(start: u64, len: u64) -> Self {
        debug_assert!(len > 0);
        Self {
            start,
            end: start + len - 1,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` style rendering: `bytes 0-1048575/*`.
    pub fn header(&self) -> String {
        format!("bytes {}-{}/*", self.start, self.end)
    }
}

/// What the service returns for a completed upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMeta {
    pub archive_id: String,
    pub location: String,
    pub checksum: String,
    pub timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteUpload {
    pub upload_id: String,
    pub description: String,
    pub created_at: String,
    pub part_size: u64,
}

/// Cold-storage multipart upload protocol.
///
/// Implementations classify failures: a retryable `Service` error is a
/// transient fault the caller may repeat, anything else is final.
pub trait ArchiveService: Send + Sync {
    fn initiate_upload(&self, vault: &str, part_size: u64, description: &str) -> Result<String>;

    /// Store one part; returns the service's tree hash of `body`.
    fn upload_part(&self, vault: &str, upload_id: &str, range: ByteRange, body: &[u8]) -> Result<String>;

    fn complete_upload(
        &self,
        vault: &str,
        upload_id: &str,
        total_size: u64,
        root_checksum: &str,
    ) -> Result<ArchiveMeta>;

    fn abort_upload(&self, vault: &str, upload_id: &str) -> Result<()>;

    fn list_incomplete_uploads(&self, vault: &str) -> Result<Vec<IncompleteUpload>>;
}

/// Current UTC time as RFC 3339, failing as a terminal error of `op`.
pub(crate) fn now_rfc3339(op: &'static str) -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| GrsyncError::service(op, e.to_string()))
}
