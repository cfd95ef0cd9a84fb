//! FetchCraft Gateway API
//!
//! Client side of the gateway wire protocol. Every request and response is a
//! JSON object carrying a common header (protocol version, supported
//! versions, message type, sender node id) and a signature over the
//! canonical encoding of everything else.
//!
//! Two exchanges are supported:
//!
//! 1. **Establishment**: the client sends a random challenge and a TTL; the
//!    gateway echoes the challenge in a signed response. A verified response
//!    yields a [`GatewaySession`].
//! 2. **Standard discovery**: the client asks an established gateway for
//!    offers on a content id, tagged with a random nonce the gateway must
//!    echo.
//!
//! [`GatewayApi`] is the seam used by the pool manager; [`GatewayClient`] is
//! the HTTP implementation and [`MemoryGateway`] an in-process one.

mod client;
mod host;
mod memory;
mod messages;

pub use client::{GatewayApi, GatewayClient, GatewaySession};
pub use host::{api_url, validate_host, DEFAULT_PORT};
pub use memory::MemoryGateway;
pub use messages::{
    DiscoveryRequest, DiscoveryResponse, EstablishmentRequest, EstablishmentResponse,
    MessageHeader, MessageType, ProtocolInfo, CURRENT_PROTOCOL_VERSION,
};

use thiserror::Error;

use fetchcraft_crypto::CryptoError;

#[derive(Error, Debug)]
pub enum GatewayApiError {
    #[error("Invalid gateway host: {0}")]
    InvalidHost(String),

    #[error("Failed to resolve {host}: {reason}")]
    HostResolution { host: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),

    #[error("Unexpected message type: expected {expected}, got {got}")]
    UnexpectedMessageType { expected: i32, got: i32 },

    #[error("Unsupported protocol version {0}")]
    UnsupportedProtocol(i32),

    #[error("Gateway did not echo the establishment challenge")]
    ChallengeMismatch,

    #[error("Gateway did not echo the discovery nonce")]
    NonceMismatch,

    #[error("Invalid gateway signature")]
    InvalidSignature,

    #[error("Failed to sign request: {0}")]
    Signing(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, GatewayApiError>;
