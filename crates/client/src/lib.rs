//! FetchCraft Client
//!
//! Client-side engine of the FetchCraft retrieval network.
//!
//! ## Overview
//!
//! - Pick gateways from the registry by region and add them to the pool
//! - Establish signed sessions with them, kept fresh by a background task
//! - Fan out discovery requests and verify every returned offer against the
//!   provider's signing key and the offer's Merkle proof
//!
//! ## Example
//!
//! ```ignore
//! use fetchcraft_client::{ClientSettings, RetrievalClient};
//!
//! let settings = ClientSettings::builder()
//!     .client_id(client_id)
//!     .signing_keypair(keypair)
//!     .build()?;
//! let client = RetrievalClient::new(settings)?;
//!
//! let gateways = client.find_gateways("US", 16).await?;
//! client.add_gateways_to_use(&gateways).await;
//! client.add_active_gateways(&gateways).await;
//!
//! let offers = client.find_best_offers(&piece_cid, 1_000, None).await?;
//! client.shutdown().await;
//! ```

mod client;
mod manager;
mod settings;
mod verifier;

pub use client::RetrievalClient;
pub use manager::{ActiveGateway, GatewayManager, RefreshStats};
pub use settings::{
    ClientSettings, ClientSettingsBuilder, DEFAULT_ESTABLISHMENT_TTL, DEFAULT_REFRESH_INTERVAL,
    DEFAULT_REGISTER_URL, DEFAULT_REQUEST_TIMEOUT,
};
pub use verifier::{check_offer, dedup_offers, OfferFilter, OfferRejection, OfferVerifier};

use thiserror::Error;

use fetchcraft_core::CoreError;
use fetchcraft_gateway_api::GatewayApiError;
use fetchcraft_registry::RegistryError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayApiError),

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] CoreError),

    #[error("No Tokio runtime available")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, ClientError>;
