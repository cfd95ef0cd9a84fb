//! Retrieval client facade

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use fetchcraft_core::{ContentId, NodeId, SubCidOffer};
use fetchcraft_gateway_api::{GatewayApi, GatewayClient};
use fetchcraft_registry::{HttpRegistry, Registry};

use crate::manager::GatewayManager;
use crate::settings::ClientSettings;
use crate::verifier::OfferFilter;
use crate::Result;

/// Entry point for applications: one gateway pool plus offer discovery.
///
/// Owns its [`GatewayManager`]; the background refresh runs until
/// [`RetrievalClient::shutdown`] or drop.
pub struct RetrievalClient {
    settings: ClientSettings,
    manager: GatewayManager,
}

impl RetrievalClient {
    /// Build a client against the configured registry over HTTP.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let registry = HttpRegistry::new(settings.register_url(), settings.request_timeout())?;
        let gateway_api = GatewayClient::new(
            *settings.client_id(),
            settings.signing_keypair().clone(),
            settings.key_version(),
            settings.request_timeout(),
        )?;
        Self::with_components(settings, Arc::new(registry), Arc::new(gateway_api))
    }

    /// Build a client over caller-supplied registry and gateway
    /// implementations.
    pub fn with_components(
        settings: ClientSettings,
        registry: Arc<dyn Registry>,
        gateway_api: Arc<dyn GatewayApi>,
    ) -> Result<Self> {
        let manager = GatewayManager::new(registry, gateway_api, settings.establishment_ttl());
        manager.start_refresh(settings.refresh_interval())?;
        info!(
            "Retrieval client {} started ({} key {})",
            settings.client_id(),
            settings.key_algorithm().as_str(),
            settings.key_version()
        );
        Ok(Self { settings, manager })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn manager(&self) -> &GatewayManager {
        &self.manager
    }

    pub async fn find_gateways(&self, location: &str, max_count: usize) -> Result<Vec<NodeId>> {
        self.manager.find_gateways(location, max_count).await
    }

    pub async fn add_gateways_to_use(&self, ids: &[NodeId]) -> usize {
        self.manager.add_gateways_to_use(ids).await
    }

    pub fn remove_gateways_to_use(&self, ids: &[NodeId]) -> usize {
        self.manager.remove_gateways_to_use(ids)
    }

    pub fn remove_all_gateways_to_use(&self) -> usize {
        self.manager.remove_all_gateways_to_use()
    }

    pub fn gateways_to_use(&self) -> Vec<NodeId> {
        self.manager.gateways_to_use()
    }

    pub async fn add_active_gateways(&self, ids: &[NodeId]) -> usize {
        self.manager.add_active_gateways(ids).await
    }

    pub fn remove_active_gateways(&self, ids: &[NodeId]) -> usize {
        self.manager.remove_active_gateways(ids)
    }

    pub fn remove_all_active_gateways(&self) -> usize {
        self.manager.remove_all_active_gateways()
    }

    pub fn active_gateways(&self) -> Vec<NodeId> {
        self.manager.active_gateways()
    }

    pub fn connected_gateways(&self) -> Vec<String> {
        self.manager.connected_gateways()
    }

    /// Verified offers for `content_id` from every active gateway
    pub async fn find_offers_standard_discovery(
        &self,
        content_id: &ContentId,
    ) -> Result<Vec<SubCidOffer>> {
        self.manager.find_offers_standard_discovery(content_id).await
    }

    /// Verified offers strictly cheaper than `max_price`, cheapest first.
    ///
    /// `max_latency` is accepted for forward compatibility and not enforced.
    pub async fn find_best_offers(
        &self,
        content_id: &ContentId,
        max_price: u64,
        max_latency: Option<Duration>,
    ) -> Result<Vec<SubCidOffer>> {
        let mut filter = OfferFilter::new(max_price);
        if let Some(latency) = max_latency {
            filter = filter.with_max_latency(latency);
        }
        let offers = self.find_offers_standard_discovery(content_id).await?;
        let mut best = filter.apply(offers);
        best.sort_by_key(|offer| offer.price);
        Ok(best)
    }

    /// Stop background work; safe to call more than once
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}
