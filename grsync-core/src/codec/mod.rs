use crate::error::{GrsyncError, Result};
use std::io::{Read, Write};
use std::sync::Arc;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodecId {
    Zstd = 1,
}

impl CodecId {
    /// Suffix appended to the archive mode tag (`plain+zstd`).
    pub fn tag(self) -> &'static str {
        match self {
            CodecId::Zstd => "zstd",
        }
    }
}

/// Push-style incremental encoder: input is fed as it is read, compressed
/// output is appended to the caller's buffer.
pub trait StreamEncoder: Send {
    fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()>;

    /// Flush the remaining frame (including the epilogue) into `out`.
    fn finish(self: Box<Self>, out: &mut Vec<u8>) -> Result<()>;
}

pub trait Compressor: Send + Sync {
    fn id(&self) -> CodecId;
    fn encoder(&self, level: i32) -> Result<Box<dyn StreamEncoder>>;
    /// Worst-case encoded size for `input` bytes.
    fn max_output(&self, input: u64) -> u64;
    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64>;
}

/// Resolve a codec by name. Unknown names are a startup error.
pub fn select(name: &str) -> Result<Arc<dyn Compressor>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "zstd" => Ok(Arc::new(zstdc::ZstdCompressor)),
        other => Err(GrsyncError::Configuration(format!(
            "unsupported compression codec {other:?} (only zstd is available)"
        ))),
    }
}

pub mod zstdc;
