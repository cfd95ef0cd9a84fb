//! HTTP client for the registry service

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use fetchcraft_core::{GatewayRegistration, NodeId, ProviderRegistration};

use crate::{Registry, RegistryError, Result};

/// Default timeout for one registry round trip
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry client over HTTP/JSON.
///
/// One request per lookup, no retries: the caller decides whether a failed
/// lookup skips one record or fails a whole operation.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRegistry {
    /// Create a registry client for `base_url` (e.g. `http://localhost:9020`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, http))
    }

    /// Create a registry client sharing an existing HTTP client.
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Registry GET {}", url);

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            warn!("Registry returned HTTP {} for {}", status, url);
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| RegistryError::Decode(format!("{url}: {e}")))
    }
}

impl Registry for HttpRegistry {
    fn gateways(&self) -> BoxFuture<'_, Result<Vec<GatewayRegistration>>> {
        async move {
            let gateways: Vec<GatewayRegistration> = self.get_json("/registers/gateway").await?;
            if gateways.is_empty() {
                warn!("Registry returned no gateways");
            }
            Ok(gateways)
        }
        .boxed()
    }

    fn gateway_by_id<'a>(&'a self, id: &'a NodeId) -> BoxFuture<'a, Result<GatewayRegistration>> {
        async move {
            let gateway: GatewayRegistration =
                self.get_json(&format!("/registers/gateway/{id}")).await?;
            if gateway.node_id != *id {
                return Err(RegistryError::Decode(format!(
                    "asked for gateway {id}, registry answered with {}",
                    gateway.node_id
                )));
            }
            Ok(gateway)
        }
        .boxed()
    }

    fn provider_by_id<'a>(&'a self, id: &'a NodeId) -> BoxFuture<'a, Result<ProviderRegistration>> {
        async move {
            let provider: ProviderRegistration =
                self.get_json(&format!("/registers/provider/{id}")).await?;
            if provider.node_id != *id {
                return Err(RegistryError::Decode(format!(
                    "asked for provider {id}, registry answered with {}",
                    provider.node_id
                )));
            }
            Ok(provider)
        }
        .boxed()
    }
}
