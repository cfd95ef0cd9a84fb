//! Provider-side offer construction.
//!
//! The client only verifies offers, but building them here keeps the
//! signing and Merkle conventions next to their verifiers. Gateways and test
//! fixtures use these helpers.

use fetchcraft_core::{CidGroupOffer, ContentId, NodeId, SubCidOffer};

use crate::keys::{KeyVersion, SigningKeypair};
use crate::merkle::MerkleTree;
use crate::sign::sign_group_offer;

/// Commit `cids` under a Merkle root and sign the offer terms.
pub fn build_group_offer(
    keypair: &SigningKeypair,
    version: KeyVersion,
    provider_id: NodeId,
    cids: Vec<ContentId>,
    price: u64,
    expiry: i64,
    qos: u64,
) -> CidGroupOffer {
    let merkle_root = MerkleTree::from_cids(&cids).root();
    let mut offer = CidGroupOffer {
        provider_id,
        cids,
        price,
        expiry,
        qos,
        merkle_root,
        signature: String::new(),
    };
    sign_group_offer(keypair, version, &mut offer);
    offer
}

/// Narrow a group offer to one of its content ids.
///
/// Returns `None` if `cid` is not part of the group.
pub fn sub_offer_for(group: &CidGroupOffer, cid: &ContentId) -> Option<SubCidOffer> {
    let index = group.cids.iter().position(|c| c == cid)?;
    let merkle_proof = MerkleTree::from_cids(&group.cids).proof(index)?;
    Some(SubCidOffer {
        provider_id: group.provider_id,
        sub_cid: *cid,
        merkle_root: group.merkle_root,
        merkle_proof,
        price: group.price,
        expiry: group.expiry,
        qos: group.qos,
        signature: group.signature.clone(),
    })
}
