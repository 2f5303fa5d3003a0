//! Segmented XChaCha20-Poly1305 stream.
//!
//! Layout: `MAGIC || salt || seg_0 || seg_1 || ...` where every segment but
//! the last seals exactly [`SEGMENT_LEN`] plaintext bytes. The associated data
//! is one byte flagging the final segment, so a truncated stream fails to open.

use std::io::{self, Read};

use chacha20poly1305::XChaCha20Poly1305;

use crate::crypto::aead::{SALT_LEN, TAG_LEN, cipher, derive_nonce, open, seal};
use crate::crypto::key::EncryptionKey;
use crate::error::{GrsyncError, Result};

pub const MAGIC: &[u8; 8] = b"GRSENC1\0";
pub const SEGMENT_LEN: usize = 64 * 1024;

const AD_MORE: &[u8] = &[0];
const AD_FINAL: &[u8] = &[1];

/// Pull-based encrypting adapter; yields the sealed stream as it reads the
/// plaintext source, holding at most one segment in memory.
pub struct EncryptingReader<R: Read> {
    inner: R,
    aead: XChaCha20Poly1305,
    salt: [u8; SALT_LEN],
    segment: u64,
    carry: Option<u8>,
    out: Vec<u8>,
    out_pos: usize,
    done: bool,
}

impl<R: Read> EncryptingReader<R> {
    /// Start a stream with a fresh random salt.
    pub fn new(inner: R, key: &EncryptionKey) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        getrandom::getrandom(&mut salt)
            .map_err(|e| GrsyncError::Transform(format!("salt generation: {e}")))?;
        Ok(Self::with_salt(inner, key, salt))
    }

    pub fn with_salt(inner: R, key: &EncryptionKey, salt: [u8; SALT_LEN]) -> Self {
        let mut header = Vec::with_capacity(MAGIC.len() + SALT_LEN);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&salt);
        Self {
            inner,
            aead: cipher(key),
            salt,
            segment: 0,
            carry: None,
            out: header,
            out_pos: 0,
            done: false,
        }
    }

    fn seal_next(&mut self) -> io::Result<()> {
        // One byte past the segment tells us whether more plaintext follows.
        let mut plain = Vec::with_capacity(SEGMENT_LEN + 1);
        if let Some(b) = self.carry.take() {
            plain.push(b);
        }
        let want = (SEGMENT_LEN + 1 - plain.len()) as u64;
        self.inner.by_ref().take(want).read_to_end(&mut plain)?;

        let last = plain.len() <= SEGMENT_LEN;
        if !last {
            self.carry = plain.pop();
        }
        let ad = if last { AD_FINAL } else { AD_MORE };
        let nonce = derive_nonce(&self.salt, self.segment);
        self.out = seal(&self.aead, &nonce, ad, &plain).map_err(io::Error::other)?;
        self.out_pos = 0;
        self.segment += 1;
        self.done = last;
        Ok(())
    }
}

impl<R: Read> Read for EncryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let pending = &self.out[self.out_pos..];
            if !pending.is_empty() {
                let n = pending.len().min(buf.len());
                buf[..n].copy_from_slice(&pending[..n]);
                self.out_pos += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }
            self.seal_next()?;
        }
    }
}

/// Exact length of the sealed stream for `plain` bytes of input.
pub fn sealed_len(plain: u64) -> u64 {
    let segments = plain.div_ceil(SEGMENT_LEN as u64).max(1);
    (MAGIC.len() + SALT_LEN) as u64 + plain + segments * TAG_LEN as u64
}

/// Open a whole sealed stream produced by [`EncryptingReader`].
pub fn decrypt_stream(key: &EncryptionKey, sealed: &[u8]) -> Result<Vec<u8>> {
    let header_len = MAGIC.len() + SALT_LEN;
    if sealed.len() < header_len || &sealed[..MAGIC.len()] != MAGIC {
        return Err(GrsyncError::Transform("not an encrypted grsync stream".into()));
    }
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&sealed[MAGIC.len()..header_len]);
    let body = &sealed[header_len..];
    if body.is_empty() {
        return Err(GrsyncError::Transform("encrypted stream is truncated".into()));
    }

    let aead = cipher(key);
    let full = SEGMENT_LEN + TAG_LEN;
    let mut plain = Vec::with_capacity(body.len());
    let mut pos = 0usize;
    let mut segment = 0u64;
    loop {
        let remaining = body.len() - pos;
        let nonce = derive_nonce(&salt, segment);
        if remaining <= full {
            plain.extend(open(&aead, &nonce, AD_FINAL, &body[pos..])?);
            return Ok(plain);
        }
        plain.extend(open(&aead, &nonce, AD_MORE, &body[pos..pos + full])?);
        pos += full;
        segment += 1;
    }
}
