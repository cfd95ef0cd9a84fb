//! FetchCraft Crypto
//!
//! Ed25519 signing keys, the wire signature format, offer signing and
//! verification, and the SHA-256 binary Merkle tree that commits a provider's
//! content ids.

mod keys;
pub mod merkle;
mod offer;
mod sign;

pub use keys::{KeyAlgorithm, KeyVersion, SigningKeypair};
pub use merkle::{cid_leaf, hash_pair, verify_cid_inclusion, MerkleTree};
pub use offer::{build_group_offer, sub_offer_for};
pub use sign::{
    sign_data, sign_group_offer, sign_message, verified_key_version, verify_message,
    verify_offer_signature, verify_signature, WireSignature,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("Unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] fetchcraft_core::CoreError),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
