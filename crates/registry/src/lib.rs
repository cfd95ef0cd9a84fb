//! FetchCraft Registry
//!
//! The registry is an external directory service mapping node ids to
//! gateway and provider registration records. This crate consumes it:
//!
//! - `GET {base}/registers/gateway` → all gateway registrations
//! - `GET {base}/registers/gateway/{id}` → one gateway registration
//! - `GET {base}/registers/provider/{id}` → one provider registration
//!
//! [`HttpRegistry`] talks to the real service. [`MemoryRegistry`] serves
//! records from process memory for tests and offline runs.

mod http;
mod memory;

pub use http::{HttpRegistry, DEFAULT_REGISTRY_TIMEOUT};
pub use memory::MemoryRegistry;

use futures::future::BoxFuture;
use thiserror::Error;

use fetchcraft_core::{GatewayRegistration, NodeId, ProviderRegistration};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Malformed registry response: {0}")]
    Decode(String),

    #[error("Not registered: {0}")]
    NotFound(String),

    #[error("Registry unreachable")]
    Offline,
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Read access to the registry.
///
/// Every lookup is a network round trip in production; callers must not
/// hold locks across these futures.
pub trait Registry: Send + Sync {
    /// All registered gateways, in registry order
    fn gateways(&self) -> BoxFuture<'_, Result<Vec<GatewayRegistration>>>;

    /// One gateway by node id
    fn gateway_by_id<'a>(&'a self, id: &'a NodeId) -> BoxFuture<'a, Result<GatewayRegistration>>;

    /// One provider by node id
    fn provider_by_id<'a>(&'a self, id: &'a NodeId) -> BoxFuture<'a, Result<ProviderRegistration>>;
}
