//! Keypair management utilities

use std::path::Path;

use thiserror::Error;
use tracing::info;

use fetchcraft_crypto::SigningKeypair;

use crate::paths::expand_path;

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("Failed to read keyfile: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write keyfile: {0}")]
    WriteError(std::io::Error),

    #[error("Invalid keyfile format: {0}")]
    InvalidFormat(String),

    #[error("Failed to create directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Keyfile not found: {0}")]
    NotFound(String),
}

/// Load an existing signing keypair from disk
///
/// The keyfile holds the raw 32-byte secret key. Unlike
/// [`load_or_generate_signing_keypair`], a missing file is an error: the
/// client refuses to start without its configured key.
pub fn load_signing_keypair(keyfile: &Path) -> Result<SigningKeypair, KeystoreError> {
    let path = expand_path(keyfile);
    if !path.exists() {
        return Err(KeystoreError::NotFound(path.display().to_string()));
    }
    let bytes = std::fs::read(&path).map_err(KeystoreError::ReadError)?;
    let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        KeystoreError::InvalidFormat(format!("Expected 32 bytes, got {}", bytes.len()))
    })?;
    info!("Loaded signing keypair from {:?}", path);
    Ok(SigningKeypair::from_secret_bytes(&key_bytes))
}

/// Load an existing signing keypair from disk, or generate a new one
///
/// # Arguments
///
/// * `keyfile` - Path to the keyfile (supports `~` expansion)
///
/// # Returns
///
/// The loaded or newly generated signing keypair
pub fn load_or_generate_signing_keypair(keyfile: &Path) -> Result<SigningKeypair, KeystoreError> {
    let path = expand_path(keyfile);

    // Create parent directory if needed
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(KeystoreError::CreateDirError)?;
        }
    }

    if path.exists() {
        return load_signing_keypair(&path);
    }

    // Generate new keypair
    let keypair = SigningKeypair::generate();
    let bytes = keypair.secret_key_bytes();

    std::fs::write(&path, bytes).map_err(KeystoreError::WriteError)?;

    info!("Generated new signing keypair, saved to {:?}", path);
    Ok(keypair)
}
