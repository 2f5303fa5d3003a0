//! SHA-256 tree hash used by the archive service to verify multipart uploads.
//!
//! A part is split into 1 MiB sub-blocks, each sub-block is hashed, and the
//! digests are folded pairwise into one root. The same fold combines the
//! per-part roots of a whole upload.

use crate::error::{GrsyncError, Result};
use sha2::{Digest, Sha256};

pub const SUB_BLOCK_LEN: usize = 1024 * 1024;

/// Tree hash of one part, hex encoded.
pub fn hash_part(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return empty_root();
    }
    let leaves: Vec<[u8; 32]> = bytes
        .chunks(SUB_BLOCK_LEN)
        .map(|block| Sha256::digest(block).into())
        .collect();
    hex::encode(fold_raw(leaves))
}

/// Fold hex digests into a single root digest.
///
/// Adjacent pairs are hashed over their raw bytes; an unpaired trailing
/// digest moves up a level unchanged. An empty list folds to the SHA-256 of
/// empty input.
pub fn fold_checksums<S: AsRef<str>>(checksums: &[S]) -> Result<String> {
    if checksums.is_empty() {
        return Ok(empty_root());
    }
    if checksums.len() == 1 {
        // Returned verbatim, even when it is not canonical lowercase hex.
        return Ok(checksums[0].as_ref().to_string());
    }
    let leaves = checksums
        .iter()
        .map(|c| decode_digest(c.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(hex::encode(fold_raw(leaves)))
}

fn fold_raw(mut level: Vec<[u8; 32]>) -> [u8; 32] {
    debug_assert!(!level.is_empty());
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                if let [a, b] = pair {
                    let mut h = Sha256::new();
                    h.update(a);
                    h.update(b);
                    h.finalize().into()
                } else {
                    pair[0]
                }
            })
            .collect();
    }
    level[0]
}

fn decode_digest(hex_str: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| GrsyncError::Transform(format!("invalid checksum {hex_str:?}: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        GrsyncError::Transform(format!(
            "checksum {hex_str:?} is {} bytes, expected 32",
            b.len()
        ))
    })
}

fn empty_root() -> String {
    hex::encode(Sha256::digest(b""))
}
