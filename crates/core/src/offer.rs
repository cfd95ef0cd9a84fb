//! Provider offers
//!
//! A provider commits to a set of content ids with a Merkle root and signs
//! the group-level terms `{provider_id, merkle_root, price, expiry, qos}`.
//! A [`SubCidOffer`] is the same signed terms narrowed to one content id,
//! carrying an inclusion proof for that id under the committed root.
//!
//! Offers are never mutated after receipt. Verification only accepts or
//! discards them.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::canonical;
use crate::types::{hex32, Hash, MerkleProof};
use crate::{ContentId, NodeId};

/// Offer covering a Merkle-committed group of content ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidGroupOffer {
    pub provider_id: NodeId,
    pub cids: Vec<ContentId>,
    /// Price in the network's smallest unit
    pub price: u64,
    /// Unix timestamp (seconds) after which the offer is void
    pub expiry: i64,
    /// Quality-of-service hint advertised by the provider
    pub qos: u64,
    #[serde(with = "hex32")]
    pub merkle_root: Hash,
    /// Provider's wire signature over [`CidGroupOffer::signable_data`]
    pub signature: String,
}

impl CidGroupOffer {
    /// Canonical bytes the provider signs.
    pub fn signable_data(&self) -> Vec<u8> {
        offer_signable_data(&self.provider_id, &self.merkle_root, self.price, self.expiry, self.qos)
    }
}

/// Offer for a single content id drawn from a group offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCidOffer {
    pub provider_id: NodeId,
    pub sub_cid: ContentId,
    #[serde(with = "hex32")]
    pub merkle_root: Hash,
    pub merkle_proof: MerkleProof,
    pub price: u64,
    pub expiry: i64,
    pub qos: u64,
    /// The group offer's signature; covers the same terms
    pub signature: String,
}

impl SubCidOffer {
    /// Canonical bytes the provider signed (identical to the parent group offer's).
    pub fn signable_data(&self) -> Vec<u8> {
        offer_signable_data(&self.provider_id, &self.merkle_root, self.price, self.expiry, self.qos)
    }

    /// Key used to collapse the same offer relayed by several gateways.
    pub fn dedup_key(&self) -> (NodeId, Hash, ContentId) {
        (self.provider_id, self.merkle_root, self.sub_cid)
    }
}

fn offer_signable_data(
    provider_id: &NodeId,
    merkle_root: &Hash,
    price: u64,
    expiry: i64,
    qos: u64,
) -> Vec<u8> {
    canonical::encode_value(json!({
        "provider_id": provider_id.to_canonical(),
        "merkle_root": hex::encode(merkle_root),
        "price": price,
        "expiry": expiry,
        "qos": qos,
    }))
}
