use crate::error::{GrsyncError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;

pub const KEY_LEN: usize = 32;

/// Raw symmetric key, stored as URL-safe base64 (44 characters with padding).
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Fresh key from the OS random source.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| GrsyncError::Configuration(format!("key generation: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = URL_SAFE
            .decode(encoded.trim())
            .map_err(|e| GrsyncError::Configuration(format!("encryption key is not base64: {e}")))?;
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            GrsyncError::Configuration(format!(
                "encryption key must decode to {KEY_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}
