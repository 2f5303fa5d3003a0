use std::sync::Arc;

use crate::codec::Compressor;
use crate::crypto::EncryptionKey;
use crate::error::{GrsyncError, Result};
use crate::ledger::ArchiveMode;
use crate::upload::RetryPolicy;

pub const MIB: u64 = 1024 * 1024;
pub const DEFAULT_PART_SIZE: u64 = MIB;
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

#[derive(Clone)]
pub struct BackupOptions {
    pub vault: String,
    /// Free text embedded in every archive description.
    pub description: Option<String>,
    /// Starting part size; doubled per file as needed to stay under the part limit.
    pub base_part_size: u64,
    pub encrypt: bool,
    pub encryption_key: Option<EncryptionKey>,
    /// Compression codec; `None` uploads the (possibly encrypted) bytes as-is.
    pub compressor: Option<Arc<dyn Compressor>>,
    pub compression_level: i32,
    pub retry: RetryPolicy,
}

impl BackupOptions {
    pub fn new(vault: impl Into<String>) -> Self {
        Self {
            vault: vault.into(),
            description: None,
            base_part_size: DEFAULT_PART_SIZE,
            encrypt: false,
            encryption_key: None,
            compressor: None,
            compression_level: DEFAULT_ZSTD_LEVEL,
            retry: RetryPolicy::default(),
        }
    }

    pub fn mode(&self) -> ArchiveMode {
        ArchiveMode::new(self.encrypt, self.compressor.is_some())
    }

    /// Startup checks. Anything rejected here would fail every file anyway.
    pub fn validate(&self) -> Result<()> {
        if self.vault.trim().is_empty() {
            return Err(GrsyncError::Configuration("vault name is required".into()));
        }
        let p = self.base_part_size;
        if p < MIB || p % MIB != 0 || !(p / MIB).is_power_of_two() {
            return Err(GrsyncError::Configuration(format!(
                "part size {p} must be a power-of-two multiple of 1 MiB"
            )));
        }
        if self.encrypt && self.encryption_key.is_none() {
            return Err(GrsyncError::Configuration(
                "encryption key required when encryption is enabled".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(GrsyncError::Configuration("retry attempts must be at least 1".into()));
        }
        Ok(())
    }
}
