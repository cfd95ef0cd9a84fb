//! FetchCraft Core
//!
//! Identity and record types shared by every FetchCraft crate.
//!
//! - [`NodeId`] / [`ContentId`]: fixed-length identifiers with a canonical
//!   lowercase-hex form
//! - [`GatewayRegistration`] / [`ProviderRegistration`]: records fetched from
//!   the registry, with validation predicates
//! - [`CidGroupOffer`] / [`SubCidOffer`]: signed, Merkle-committed offers
//! - [`canonical`]: the deterministic byte encoding every signature covers

pub mod canonical;
mod offer;
mod registration;
mod types;

pub use offer::{CidGroupOffer, SubCidOffer};
pub use registration::{GatewayRegistration, ProviderRegistration};
pub use types::{hex32, hex32_vec, ContentId, Hash, MerkleProof, NodeId, PublicKey};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
