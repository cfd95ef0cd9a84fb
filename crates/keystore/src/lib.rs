//! FetchCraft Keystore
//!
//! Loads the client's signing key from disk, generating one on first use.

mod keypair;
mod paths;

pub use keypair::{load_or_generate_signing_keypair, load_signing_keypair, KeystoreError};
pub use paths::{default_config_dir, default_keyfile, default_keystore_dir, expand_path};
