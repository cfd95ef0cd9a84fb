//! In-process gateway

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;

use fetchcraft_core::{ContentId, GatewayRegistration, NodeId, SubCidOffer};
use fetchcraft_crypto::KeyVersion;

use crate::client::{GatewayApi, GatewaySession};
use crate::host::api_url;
use crate::{GatewayApiError, Result};

#[derive(Debug, Default)]
struct Node {
    offers: HashMap<ContentId, Vec<SubCidOffer>>,
    failing: bool,
    latency: Option<Duration>,
}

/// Gateways served from process memory.
///
/// Only gateways added with [`MemoryGateway::add_gateway`] answer; any other
/// id fails like an unreachable host. Offers are returned exactly as stored,
/// so callers can plant tampered offers.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    nodes: RwLock<HashMap<NodeId, Node>>,
    latency: RwLock<Option<Duration>>,
    establish_calls: AtomicUsize,
    discovery_calls: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_gateway(&self, id: NodeId) {
        self.nodes.write().entry(id).or_default();
    }

    /// A failing gateway rejects every call
    pub fn set_failing(&self, id: &NodeId, failing: bool) {
        if let Some(node) = self.nodes.write().get_mut(id) {
            node.failing = failing;
        }
    }

    /// Plant an offer on `gateway` for the offer's `sub_cid`
    pub fn add_offer(&self, gateway: &NodeId, offer: SubCidOffer) {
        if let Some(node) = self.nodes.write().get_mut(gateway) {
            node.offers.entry(offer.sub_cid).or_default().push(offer);
        }
    }

    /// Delay applied to every call before it answers
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Delay for one gateway only; overrides [`MemoryGateway::set_latency`]
    pub fn set_gateway_latency(&self, id: &NodeId, latency: Option<Duration>) {
        if let Some(node) = self.nodes.write().get_mut(id) {
            node.latency = latency;
        }
    }

    pub fn establish_calls(&self) -> usize {
        self.establish_calls.load(Ordering::SeqCst)
    }

    pub fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self, id: &NodeId) {
        let per_gateway = self.nodes.read().get(id).and_then(|node| node.latency);
        let latency = per_gateway.or(*self.latency.read());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_reachable(&self, id: &NodeId) -> Result<()> {
        match self.nodes.read().get(id) {
            Some(node) if !node.failing => Ok(()),
            _ => Err(GatewayApiError::Status {
                status: 503,
                url: format!("memory://{id}"),
            }),
        }
    }
}

impl GatewayApi for MemoryGateway {
    fn establish<'a>(
        &'a self,
        gateway: &'a GatewayRegistration,
        challenge: [u8; 32],
        ttl: i64,
    ) -> BoxFuture<'a, Result<GatewaySession>> {
        async move {
            self.establish_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency(&gateway.node_id).await;
            self.check_reachable(&gateway.node_id)?;
            let signing_key = gateway
                .signing_key_bytes()
                .map_err(|e| GatewayApiError::InvalidHost(e.to_string()))?;
            Ok(GatewaySession {
                gateway_id: gateway.node_id,
                api_url: api_url(&gateway.hostname),
                signing_key,
                challenge,
                key_version: KeyVersion::default(),
                expires_at: ttl,
            })
        }
        .boxed()
    }

    fn standard_discovery<'a>(
        &'a self,
        session: &'a GatewaySession,
        piece_cid: &'a ContentId,
        _nonce: i64,
        _ttl: i64,
    ) -> BoxFuture<'a, Result<Vec<SubCidOffer>>> {
        async move {
            self.discovery_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency(&session.gateway_id).await;
            self.check_reachable(&session.gateway_id)?;
            Ok(self
                .nodes
                .read()
                .get(&session.gateway_id)
                .and_then(|node| node.offers.get(piece_cid))
                .cloned()
                .unwrap_or_default())
        }
        .boxed()
    }
}
