use blake3::Hasher;
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::crypto::key::EncryptionKey;
use crate::error::{GrsyncError, Result};

pub const TAG_LEN: usize = 16;
pub const SALT_LEN: usize = 32;

/// Nonce derivation: XChaCha requires 24-byte nonce.
/// nonce = blake3(salt || segment_index).take(24)
pub fn derive_nonce(salt: &[u8; SALT_LEN], segment: u64) -> XNonce {
    let mut h = Hasher::new();
    h.update(salt);
    h.update(&segment.to_le_bytes());
    let out = h.finalize();
    XNonce::from_slice(&out.as_bytes()[..24]).to_owned()
}

pub fn cipher(key: &EncryptionKey) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

pub fn seal(aead: &XChaCha20Poly1305, nonce: &XNonce, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    aead.encrypt(
        nonce,
        Payload {
            msg: plaintext,
            aad: ad,
        },
    )
    .map_err(|_| GrsyncError::Transform("segment encryption failed".into()))
}

pub fn open(aead: &XChaCha20Poly1305, nonce: &XNonce, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    aead.decrypt(
        nonce,
        Payload {
            msg: ciphertext,
            aad: ad,
        },
    )
    .map_err(|_| GrsyncError::Transform("segment authentication failed".into()))
}
