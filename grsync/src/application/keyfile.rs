//! Key files: one line of URL-safe base64, readable by the owner only.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use grsync_core::crypto::EncryptionKey;
use grsync_core::error::{GrsyncError, Result};

const KEY_FILE_MODE: u32 = 0o600;

/// Generate a key and write it to `path`, creating parent directories.
/// An existing file is replaced only with `force`.
pub fn generate_key_file(path: &Path, force: bool) -> Result<EncryptionKey> {
    if path.exists() && !force {
        return Err(GrsyncError::Configuration(format!(
            "key file {} already exists; use --force to overwrite",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let key = EncryptionKey::generate()?;
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(KEY_FILE_MODE);
    }
    let mut file = opts.open(path)?;
    // mode() only applies on creation; tighten an overwritten file as well
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(KEY_FILE_MODE))?;
    }
    file.write_all(key.to_base64().as_bytes())?;
    file.sync_all()?;
    Ok(key)
}

/// Read and decode a key file.
pub fn read_key_file(path: &Path) -> Result<EncryptionKey> {
    let encoded = fs::read_to_string(path).map_err(|e| {
        GrsyncError::Configuration(format!("cannot read key file {}: {e}", path.display()))
    })?;
    EncryptionKey::from_base64(&encoded)
}
