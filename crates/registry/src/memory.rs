//! In-process registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;

use fetchcraft_core::{GatewayRegistration, NodeId, ProviderRegistration};

use crate::{Registry, RegistryError, Result};

/// Registry backed by process memory.
///
/// Gateways keep insertion order so listing is deterministic. Can be flipped
/// offline to simulate an unreachable registry.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    gateways: RwLock<Vec<GatewayRegistration>>,
    providers: RwLock<HashMap<NodeId, ProviderRegistration>>,
    offline: AtomicBool,
    provider_lookups: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a gateway. A replaced gateway keeps its position.
    pub fn insert_gateway(&self, gateway: GatewayRegistration) {
        let mut gateways = self.gateways.write();
        match gateways.iter_mut().find(|g| g.node_id == gateway.node_id) {
            Some(existing) => *existing = gateway,
            None => gateways.push(gateway),
        }
    }

    pub fn remove_gateway(&self, id: &NodeId) -> bool {
        let mut gateways = self.gateways.write();
        let before = gateways.len();
        gateways.retain(|g| g.node_id != *id);
        gateways.len() != before
    }

    pub fn insert_provider(&self, provider: ProviderRegistration) {
        self.providers.write().insert(provider.node_id, provider);
    }

    pub fn remove_provider(&self, id: &NodeId) -> bool {
        self.providers.write().remove(id).is_some()
    }

    /// While offline every lookup fails with [`RegistryError::Offline`]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `provider_by_id` calls served so far, including failed ones
    pub fn provider_lookups(&self) -> usize {
        self.provider_lookups.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RegistryError::Offline)
        } else {
            Ok(())
        }
    }
}

impl Registry for MemoryRegistry {
    fn gateways(&self) -> BoxFuture<'_, Result<Vec<GatewayRegistration>>> {
        async move {
            self.check_online()?;
            Ok(self.gateways.read().clone())
        }
        .boxed()
    }

    fn gateway_by_id<'a>(&'a self, id: &'a NodeId) -> BoxFuture<'a, Result<GatewayRegistration>> {
        async move {
            self.check_online()?;
            self.gateways
                .read()
                .iter()
                .find(|g| g.node_id == *id)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(format!("gateway {id}")))
        }
        .boxed()
    }

    fn provider_by_id<'a>(&'a self, id: &'a NodeId) -> BoxFuture<'a, Result<ProviderRegistration>> {
        async move {
            self.provider_lookups.fetch_add(1, Ordering::SeqCst);
            self.check_online()?;
            self.providers
                .read()
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(format!("provider {id}")))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(byte: u8, region: &str) -> GatewayRegistration {
        GatewayRegistration {
            node_id: NodeId::from_bytes([byte; 32]),
            hostname: format!("127.0.0.{byte}:8080"),
            region_code: region.to_string(),
            country_code: "US".to_string(),
            subdivision_code: "US-CA".to_string(),
            signing_key: hex::encode([byte; 32]),
        }
    }

    fn provider(byte: u8) -> ProviderRegistration {
        ProviderRegistration {
            node_id: NodeId::from_bytes([byte; 32]),
            hostname: format!("provider{byte}.example.org"),
            region_code: "A".to_string(),
            signing_key: hex::encode([byte; 32]),
        }
    }

    #[tokio::test]
    async fn test_gateways_keep_insertion_order() {
        let registry = MemoryRegistry::new();
        registry.insert_gateway(gateway(3, "C"));
        registry.insert_gateway(gateway(1, "A"));
        registry.insert_gateway(gateway(2, "B"));

        // Replacing keeps the slot
        registry.insert_gateway(gateway(1, "Z"));

        let regions: Vec<_> = registry
            .gateways()
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.region_code)
            .collect();
        assert_eq!(regions, vec!["C", "Z", "B"]);
    }

    #[tokio::test]
    async fn test_lookup_by_id() {
        let registry = MemoryRegistry::new();
        registry.insert_gateway(gateway(1, "A"));
        registry.insert_provider(provider(7));

        let gw = registry.gateway_by_id(&NodeId::from_bytes([1; 32])).await.unwrap();
        assert_eq!(gw.region_code, "A");

        let p = registry.provider_by_id(&NodeId::from_bytes([7; 32])).await.unwrap();
        assert_eq!(p.hostname, "provider7.example.org");

        let missing = registry.provider_by_id(&NodeId::from_bytes([8; 32])).await;
        assert!(matches!(missing, Err(RegistryError::NotFound(_))));
        assert_eq!(registry.provider_lookups(), 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = MemoryRegistry::new();
        registry.insert_gateway(gateway(1, "A"));
        registry.insert_provider(provider(7));

        assert!(registry.remove_gateway(&NodeId::from_bytes([1; 32])));
        assert!(!registry.remove_gateway(&NodeId::from_bytes([1; 32])));
        assert!(registry.remove_provider(&NodeId::from_bytes([7; 32])));
        assert!(registry.gateways().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline() {
        let registry = MemoryRegistry::new();
        registry.insert_gateway(gateway(1, "A"));
        registry.set_offline(true);

        assert!(matches!(registry.gateways().await, Err(RegistryError::Offline)));
        assert!(matches!(
            registry.gateway_by_id(&NodeId::from_bytes([1; 32])).await,
            Err(RegistryError::Offline)
        ));

        registry.set_offline(false);
        assert_eq!(registry.gateways().await.unwrap().len(), 1);
    }
}
