use super::{CodecId, Compressor, StreamEncoder};
use crate::error::{GrsyncError, Result};
use std::io::{Read, Write};

pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn id(&self) -> CodecId {
        CodecId::Zstd
    }

    fn encoder(&self, level: i32) -> Result<Box<dyn StreamEncoder>> {
        let enc = zstd::stream::write::Encoder::new(Vec::new(), level.max(1))
            .map_err(|e| GrsyncError::Transform(format!("zstd init: {e}")))?;
        Ok(Box::new(ZstdStream { enc }))
    }

    fn max_output(&self, input: u64) -> u64 {
        match usize::try_from(input) {
            Ok(n) => zstd::zstd_safe::compress_bound(n) as u64,
            Err(_) => input.saturating_add(input >> 7),
        }
    }

    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64> {
        let mut dec = zstd::stream::Decoder::new(src)
            .map_err(|e| GrsyncError::Transform(format!("zstd init: {e}")))?;
        let written_uncompressed = std::io::copy(&mut dec, dst)
            .map_err(|e| GrsyncError::Transform(format!("zstd decode: {e}")))?;
        Ok(written_uncompressed)
    }
}

struct ZstdStream {
    enc: zstd::stream::write::Encoder<'static, Vec<u8>>,
}

impl StreamEncoder for ZstdStream {
    fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.enc
            .write_all(input)
            .map_err(|e| GrsyncError::Transform(format!("zstd encode: {e}")))?;
        // drain whatever the encoder has produced so far
        out.append(self.enc.get_mut());
        Ok(())
    }

    fn finish(self: Box<Self>, out: &mut Vec<u8>) -> Result<()> {
        let mut tail = self
            .enc
            .finish()
            .map_err(|e| GrsyncError::Transform(format!("zstd finish: {e}")))?;
        out.append(&mut tail);
        Ok(())
    }
}
