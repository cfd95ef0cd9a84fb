//! Offer verification
//!
//! Gateways relay offers they did not create, so nothing they return is
//! trusted until the provider's own signature and the Merkle proof check
//! out. Each failed check discards one offer and never the batch.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use fetchcraft_core::{NodeId, PublicKey, SubCidOffer};
use fetchcraft_crypto::{verify_cid_inclusion, verify_offer_signature};
use fetchcraft_registry::Registry;

/// Why an offer was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferRejection {
    /// The provider could not be looked up in the registry
    ProviderLookup,
    /// The provider's registration is malformed
    InvalidProvider,
    /// The offer signature does not verify under the provider's key
    BadSignature,
    /// The content id is not under the offer's Merkle root
    MerkleProof,
    /// The price is not below the caller's ceiling
    PriceCeiling,
}

impl fmt::Display for OfferRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ProviderLookup => "provider lookup failed",
            Self::InvalidProvider => "invalid provider registration",
            Self::BadSignature => "bad offer signature",
            Self::MerkleProof => "merkle proof does not verify",
            Self::PriceCeiling => "price at or above ceiling",
        };
        f.write_str(reason)
    }
}

/// Caller constraints applied after verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferFilter {
    /// Offers must be strictly cheaper than this
    pub max_price: u64,
    /// Accepted but not enforced yet; gateways report no latency figures
    pub max_latency: Option<Duration>,
}

impl OfferFilter {
    pub fn new(max_price: u64) -> Self {
        Self {
            max_price,
            max_latency: None,
        }
    }

    pub fn with_max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = Some(max_latency);
        self
    }

    pub fn check(&self, offer: &SubCidOffer) -> Result<(), OfferRejection> {
        if offer.price < self.max_price {
            Ok(())
        } else {
            Err(OfferRejection::PriceCeiling)
        }
    }

    pub fn apply(&self, offers: Vec<SubCidOffer>) -> Vec<SubCidOffer> {
        if let Some(latency) = self.max_latency {
            debug!("Latency ceiling {:?} requested; not applied", latency);
        }
        offers
            .into_iter()
            .filter(|offer| match self.check(offer) {
                Ok(()) => true,
                Err(reason) => {
                    debug!(
                        "Dropping offer from {} at price {}: {}",
                        offer.provider_id, offer.price, reason
                    );
                    false
                }
            })
            .collect()
    }
}

/// Drop repeated offers, keeping the first occurrence of each
/// `(provider, merkle root, content id)`.
pub fn dedup_offers(offers: Vec<SubCidOffer>) -> Vec<SubCidOffer> {
    let mut seen = HashSet::new();
    offers
        .into_iter()
        .filter(|offer| seen.insert(offer.dedup_key()))
        .collect()
}

/// Check one offer against its provider's signing key
pub fn check_offer(provider_key: &PublicKey, offer: &SubCidOffer) -> Result<(), OfferRejection> {
    if !verify_offer_signature(provider_key, offer) {
        return Err(OfferRejection::BadSignature);
    }
    if !verify_cid_inclusion(&offer.merkle_root, &offer.sub_cid, &offer.merkle_proof) {
        return Err(OfferRejection::MerkleProof);
    }
    Ok(())
}

/// Verifies offers against provider keys fetched from the registry
pub struct OfferVerifier {
    registry: Arc<dyn Registry>,
}

impl OfferVerifier {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    /// Keep only offers whose signature and Merkle proof verify.
    ///
    /// Each distinct provider is looked up once, concurrently. Order of the
    /// surviving offers is preserved.
    pub async fn verify(&self, offers: Vec<SubCidOffer>) -> Vec<SubCidOffer> {
        if offers.is_empty() {
            return offers;
        }

        let mut providers: Vec<NodeId> = Vec::new();
        for offer in &offers {
            if !providers.contains(&offer.provider_id) {
                providers.push(offer.provider_id);
            }
        }

        let lookups = providers.iter().map(|id| async move {
            let key = match self.registry.provider_by_id(id).await {
                Ok(provider) => provider
                    .validate()
                    .and_then(|_| provider.signing_key_bytes())
                    .map_err(|e| {
                        warn!("Provider {} has an invalid registration: {}", id, e);
                        OfferRejection::InvalidProvider
                    }),
                Err(e) => {
                    warn!("Provider {} lookup failed: {}", id, e);
                    Err(OfferRejection::ProviderLookup)
                }
            };
            (*id, key)
        });
        let keys: HashMap<NodeId, Result<PublicKey, OfferRejection>> =
            join_all(lookups).await.into_iter().collect();

        let total = offers.len();
        let verified: Vec<SubCidOffer> = offers
            .into_iter()
            .filter(|offer| {
                let outcome = match keys.get(&offer.provider_id) {
                    Some(Ok(key)) => check_offer(key, offer),
                    Some(Err(reason)) => Err(*reason),
                    None => Err(OfferRejection::ProviderLookup),
                };
                match outcome {
                    Ok(()) => true,
                    Err(reason) => {
                        warn!(
                            "Rejected offer for {} from provider {}: {}",
                            offer.sub_cid, offer.provider_id, reason
                        );
                        false
                    }
                }
            })
            .collect();

        debug!("{} of {} offers verified", verified.len(), total);
        verified
    }
}
