//! Gateway pool manager
//!
//! Two maps make up the pool:
//!
//! - **gateways to use**: candidate gateways picked by the caller, keyed by
//!   node id, holding their registry records
//! - **active gateways**: candidates with an established session
//!
//! Every active id is also a candidate. Each map has its own lock; code that
//! needs both takes the candidates lock first. No lock is held across a
//! network call: operations snapshot what they need, release, do I/O, then
//! re-acquire only to commit.
//!
//! A background task re-establishes lapsed sessions and evicts entries that
//! are no longer candidates. It stops on [`GatewayManager::shutdown`] or when
//! the manager is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use fetchcraft_core::{ContentId, GatewayRegistration, NodeId, SubCidOffer};
use fetchcraft_gateway_api::{validate_host, GatewayApi, GatewaySession};
use fetchcraft_registry::Registry;

use crate::verifier::{dedup_offers, OfferVerifier};
use crate::{ClientError, Result};

/// Current time in unix seconds
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A candidate gateway with an established session
#[derive(Debug, Clone)]
pub struct ActiveGateway {
    pub registration: GatewayRegistration,
    pub session: GatewaySession,
}

impl ActiveGateway {
    pub fn node_id(&self) -> &NodeId {
        &self.registration.node_id
    }

    /// Unix seconds after which the session must be re-established
    pub fn expires_at(&self) -> i64 {
        self.session.expires_at
    }
}

/// Outcome of one refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Active entries dropped because they are no longer candidates
    pub evicted: usize,
    /// Sessions established or renewed
    pub established: usize,
    /// Establishment attempts that failed
    pub failed: usize,
    /// Expired sessions dropped after a failed renewal
    pub expired: usize,
}

struct PoolState {
    registry: Arc<dyn Registry>,
    gateway_api: Arc<dyn GatewayApi>,
    verifier: OfferVerifier,
    establishment_ttl: Duration,
    gateways_to_use: RwLock<HashMap<NodeId, GatewayRegistration>>,
    active_gateways: RwLock<HashMap<NodeId, ActiveGateway>>,
}

struct RefreshTask {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the gateway pool of one client
pub struct GatewayManager {
    state: Arc<PoolState>,
    refresh: Mutex<Option<RefreshTask>>,
}

impl GatewayManager {
    pub fn new(
        registry: Arc<dyn Registry>,
        gateway_api: Arc<dyn GatewayApi>,
        establishment_ttl: Duration,
    ) -> Self {
        let verifier = OfferVerifier::new(registry.clone());
        Self {
            state: Arc::new(PoolState {
                registry,
                gateway_api,
                verifier,
                establishment_ttl,
                gateways_to_use: RwLock::new(HashMap::new()),
                active_gateways: RwLock::new(HashMap::new()),
            }),
            refresh: Mutex::new(None),
        }
    }

    /// Gateways registered in `location`, in registry order, at most
    /// `max_count` of them.
    pub async fn find_gateways(&self, location: &str, max_count: usize) -> Result<Vec<NodeId>> {
        let gateways = self.state.registry.gateways().await?;
        let found: Vec<NodeId> = gateways
            .into_iter()
            .filter(|g| g.region_code == location)
            .take(max_count)
            .map(|g| g.node_id)
            .collect();
        debug!("Found {} gateways in region {}", found.len(), location);
        Ok(found)
    }

    /// Add gateways to the candidate set.
    ///
    /// Each new id is looked up in the registry and its record validated;
    /// failures are logged and skipped. Returns how many were added.
    pub async fn add_gateways_to_use(&self, ids: &[NodeId]) -> usize {
        let pending: Vec<NodeId> = {
            let to_use = self.state.gateways_to_use.read();
            let mut seen = HashSet::new();
            ids.iter()
                .filter(|id| !to_use.contains_key(*id) && seen.insert(**id))
                .copied()
                .collect()
        };
        if pending.is_empty() {
            return 0;
        }

        let lookups = pending.iter().map(|id| async move {
            let result = self.state.lookup_candidate(id).await;
            (*id, result)
        });
        let results = join_all(lookups).await;

        let mut added = 0;
        let mut to_use = self.state.gateways_to_use.write();
        for (id, result) in results {
            match result {
                Ok(registration) => {
                    if !to_use.contains_key(&id) {
                        to_use.insert(id, registration);
                        added += 1;
                    }
                }
                Err(e) => warn!("Skipping gateway {}: {}", id, e),
            }
        }
        info!("Added {} gateways to use ({} total)", added, to_use.len());
        added
    }

    /// Remove candidates, along with their active sessions
    pub fn remove_gateways_to_use(&self, ids: &[NodeId]) -> usize {
        let mut to_use = self.state.gateways_to_use.write();
        let mut active = self.state.active_gateways.write();
        let mut removed = 0;
        for id in ids {
            if to_use.remove(id).is_some() {
                removed += 1;
            }
            active.remove(id);
        }
        info!("Removed {} gateways to use ({} left)", removed, to_use.len());
        removed
    }

    /// Clear both maps. Returns the number of candidates removed.
    pub fn remove_all_gateways_to_use(&self) -> usize {
        let mut to_use = self.state.gateways_to_use.write();
        let mut active = self.state.active_gateways.write();
        let removed = to_use.len();
        to_use.clear();
        active.clear();
        info!("Removed all {} gateways to use", removed);
        removed
    }

    /// Candidate ids, sorted
    pub fn gateways_to_use(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.state.gateways_to_use.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Active ids, sorted
    pub fn active_gateways(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.state.active_gateways.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// API URLs of the gateways with an active session
    pub fn connected_gateways(&self) -> Vec<String> {
        let active = self.state.active_gateways.read();
        let mut entries: Vec<&ActiveGateway> = active.values().collect();
        entries.sort_by_key(|a| *a.node_id());
        entries.into_iter().map(|a| a.session.api_url.clone()).collect()
    }

    /// Snapshot of one active entry
    pub fn active_gateway(&self, id: &NodeId) -> Option<ActiveGateway> {
        self.state.active_gateways.read().get(id).cloned()
    }

    /// Establish sessions with candidates that are not active yet.
    ///
    /// Handshakes run concurrently; one failure never aborts the others.
    /// Returns how many gateways became active.
    pub async fn add_active_gateways(&self, ids: &[NodeId]) -> usize {
        let pending: Vec<GatewayRegistration> = {
            let to_use = self.state.gateways_to_use.read();
            let active = self.state.active_gateways.read();
            let mut seen = HashSet::new();
            ids.iter()
                .filter(|id| !active.contains_key(*id) && seen.insert(**id))
                .filter_map(|id| to_use.get(id).cloned())
                .collect()
        };
        if pending.is_empty() {
            return 0;
        }

        let results = join_all(pending.iter().map(|g| self.state.establish(g))).await;
        let established: Vec<ActiveGateway> = results
            .into_iter()
            .zip(&pending)
            .filter_map(|(result, gateway)| match result {
                Ok(active) => Some(active),
                Err(e) => {
                    warn!("Failed to establish with gateway {}: {}", gateway.node_id, e);
                    None
                }
            })
            .collect();

        let to_use = self.state.gateways_to_use.read();
        let mut active = self.state.active_gateways.write();
        let mut added = 0;
        for gateway in established {
            let id = *gateway.node_id();
            // Removed while the handshake was in flight
            if !to_use.contains_key(&id) || active.contains_key(&id) {
                continue;
            }
            active.insert(id, gateway);
            added += 1;
        }
        info!("Added {} active gateways ({} total)", added, active.len());
        added
    }

    /// Drop active sessions; candidates stay
    pub fn remove_active_gateways(&self, ids: &[NodeId]) -> usize {
        let mut active = self.state.active_gateways.write();
        let removed = ids.iter().filter(|id| active.remove(*id).is_some()).count();
        info!("Removed {} active gateways ({} left)", removed, active.len());
        removed
    }

    pub fn remove_all_active_gateways(&self) -> usize {
        let mut active = self.state.active_gateways.write();
        let removed = active.len();
        active.clear();
        info!("Removed all {} active gateways", removed);
        removed
    }

    /// Ask every active gateway for offers on `content_id`.
    ///
    /// Failing gateways are logged and skipped. Offers are verified, then
    /// deduplicated in the order gateways answered.
    pub async fn find_offers_standard_discovery(
        &self,
        content_id: &ContentId,
    ) -> Result<Vec<SubCidOffer>> {
        let sessions: Vec<GatewaySession> = self
            .state
            .active_gateways
            .read()
            .values()
            .map(|a| a.session.clone())
            .collect();
        if sessions.is_empty() {
            debug!("No active gateways, skipping discovery for {}", content_id);
            return Ok(Vec::new());
        }

        let ttl = self.state.session_deadline();
        let mut pending: FuturesUnordered<_> = sessions
            .iter()
            .map(|session| async move {
                let nonce = rand::random::<i64>();
                let result = self
                    .state
                    .gateway_api
                    .standard_discovery(session, content_id, nonce, ttl)
                    .await;
                (session.gateway_id, result)
            })
            .collect();

        let mut raw = Vec::new();
        while let Some((gateway_id, result)) = pending.next().await {
            match result {
                Ok(offers) => {
                    debug!("Gateway {} returned {} offers", gateway_id, offers.len());
                    raw.extend(offers);
                }
                Err(e) => warn!("Discovery on gateway {} failed: {}", gateway_id, e),
            }
        }

        // Verify before dedup so a tampered copy cannot shadow the genuine one
        let verified = self.state.verifier.verify(raw).await;
        Ok(dedup_offers(verified))
    }

    /// Run one refresh pass now
    pub async fn refresh_now(&self) -> RefreshStats {
        self.state.refresh().await
    }

    /// Start the background refresh task.
    ///
    /// The first pass runs one `interval` after the call. Starting twice is a
    /// no-op. Must be called from within a Tokio runtime.
    pub fn start_refresh(&self, interval: Duration) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let mut refresh = self.refresh.lock();
        if refresh.is_some() {
            debug!("Refresh task already running");
            return Ok(());
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let state = self.state.clone();
        let handle = runtime.spawn(refresh_loop(state, interval, stop_rx));
        *refresh = Some(RefreshTask { stop_tx, handle });
        info!("Gateway refresh started (every {:?})", interval);
        Ok(())
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.lock().is_some()
    }

    /// Stop the refresh task and wait for it to exit.
    ///
    /// An in-flight pass is abandoned. Safe to call more than once.
    pub async fn shutdown(&self) {
        let task = self.refresh.lock().take();
        let Some(RefreshTask { stop_tx, handle }) = task else {
            return;
        };
        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            warn!("Refresh task ended abnormally: {}", e);
        }
        info!("Gateway refresh stopped");
    }
}

impl PoolState {
    fn session_deadline(&self) -> i64 {
        unix_now() + self.establishment_ttl.as_secs() as i64
    }

    /// Registry lookup plus validation of a prospective candidate
    async fn lookup_candidate(&self, id: &NodeId) -> Result<GatewayRegistration> {
        let registration = self.registry.gateway_by_id(id).await?;
        registration.validate()?;
        validate_host(&registration.hostname).await?;
        Ok(registration)
    }

    async fn establish(&self, gateway: &GatewayRegistration) -> Result<ActiveGateway> {
        let challenge: [u8; 32] = rand::random();
        let session = self
            .gateway_api
            .establish(gateway, challenge, self.session_deadline())
            .await?;
        Ok(ActiveGateway {
            registration: gateway.clone(),
            session,
        })
    }

    async fn refresh(&self) -> RefreshStats {
        let mut stats = RefreshStats::default();

        {
            let to_use = self.gateways_to_use.read();
            let mut active = self.active_gateways.write();
            let before = active.len();
            active.retain(|id, _| to_use.contains_key(id));
            stats.evicted = before - active.len();
        }

        let now = unix_now();
        let (due, expired): (Vec<GatewayRegistration>, HashSet<NodeId>) = {
            let to_use = self.gateways_to_use.read();
            let active = self.active_gateways.read();
            let mut due = Vec::new();
            let mut expired = HashSet::new();
            for (id, registration) in to_use.iter() {
                match active.get(id) {
                    None => due.push(registration.clone()),
                    Some(entry) if entry.session.is_expired(now) => {
                        due.push(registration.clone());
                        expired.insert(*id);
                    }
                    Some(_) => {}
                }
            }
            (due, expired)
        };

        if !due.is_empty() {
            let results = join_all(due.iter().map(|g| self.establish(g))).await;

            let to_use = self.gateways_to_use.read();
            let mut active = self.active_gateways.write();
            for (gateway, result) in due.iter().zip(results) {
                let id = gateway.node_id;
                match result {
                    Ok(entry) => {
                        if to_use.contains_key(&id) {
                            active.insert(id, entry);
                            stats.established += 1;
                        }
                    }
                    Err(e) => {
                        stats.failed += 1;
                        warn!("Refresh: establishment with {} failed: {}", id, e);
                        let stale = expired.contains(&id)
                            && active.get(&id).is_some_and(|a| a.session.is_expired(now));
                        if stale {
                            active.remove(&id);
                            stats.expired += 1;
                        }
                    }
                }
            }
        }

        if stats != RefreshStats::default() {
            info!(
                "Refresh: {} evicted, {} established, {} failed, {} expired",
                stats.evicted, stats.established, stats.failed, stats.expired
            );
        }
        stats
    }
}

async fn refresh_loop(state: Arc<PoolState>, period: Duration, mut stop_rx: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Fires on shutdown() or when the manager is dropped
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = state.refresh() => {}
                }
            }
        }
    }
    debug!("Refresh loop exited");
}
