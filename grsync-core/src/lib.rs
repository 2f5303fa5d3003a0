#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod pipeline;
pub mod progress;
pub mod read;
pub mod service;
pub mod upload;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;

// Re-exports: stable API surface
pub use config::BackupOptions;
pub use error::{GrsyncError, Result};
pub use ledger::{ArchiveMode, ArchiveRecord, DedupLedger, FileIdentity};
pub use pipeline::{ArchivePipeline, RunSummary, StopHandle};
pub use service::{ArchiveMeta, ArchiveService, FsVault, GlacierVault, IncompleteUpload};
pub use upload::{RetryPolicy, choose_part_size};
