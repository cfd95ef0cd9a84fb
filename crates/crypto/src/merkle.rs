//! Binary Merkle tree committing a provider's content ids.
//!
//! Leaf formula: `SHA256(content_id)`.
//! Internal nodes: `SHA256(left || right)`.
//! If the leaf count is not a power of 2, pad with `[0u8; 32]`.

use sha2::{Digest, Sha256};

use fetchcraft_core::{ContentId, Hash, MerkleProof};

/// A binary Merkle tree.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// All nodes stored level by level, bottom-up. `layers[0]` = leaves.
    layers: Vec<Vec<Hash>>,
}

/// Compute the leaf hash for a content id.
pub fn cid_leaf(cid: &ContentId) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(cid.as_bytes());
    hasher.finalize().into()
}

/// Hash two child nodes to produce a parent.
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

impl MerkleTree {
    /// Build a Merkle tree over content ids, in the given order.
    pub fn from_cids(cids: &[ContentId]) -> Self {
        Self::from_leaves(cids.iter().map(cid_leaf).collect())
    }

    /// Build a Merkle tree from pre-hashed leaves.
    pub fn from_leaves(leaves: Vec<Hash>) -> Self {
        if leaves.is_empty() {
            return Self {
                layers: vec![vec![[0u8; 32]]],
            };
        }

        // Pad to power of 2
        let padded_len = leaves.len().next_power_of_two();
        let mut current = leaves;
        current.resize(padded_len, [0u8; 32]);

        let mut layers = Vec::new();

        // Build tree bottom-up
        while current.len() > 1 {
            let next: Vec<Hash> = current
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            layers.push(current);
            current = next;
        }
        layers.push(current);

        Self { layers }
    }

    /// Get the Merkle root.
    pub fn root(&self) -> Hash {
        self.layers
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    /// Generate a proof for the leaf at the given index.
    ///
    /// Returns `None` if the index is out of range (beyond the original
    /// leaf count including padding).
    pub fn proof(&self, leaf_index: usize) -> Option<MerkleProof> {
        if leaf_index >= self.leaf_count() {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.layers.len() - 1);
        let mut idx = leaf_index;

        for layer in &self.layers[..self.layers.len() - 1] {
            // Sibling is the other child of the same parent
            let sibling_idx = idx ^ 1;
            siblings.push(layer[sibling_idx]);
            idx /= 2;
        }

        Some(MerkleProof {
            siblings,
            leaf_index,
        })
    }

    /// Verify a Merkle proof against a given root and leaf hash.
    pub fn verify(root: &Hash, leaf: &Hash, proof: &MerkleProof) -> bool {
        let mut current = *leaf;
        let mut idx = proof.leaf_index;

        for sibling in &proof.siblings {
            current = if idx % 2 == 0 {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            };
            idx /= 2;
        }

        // Leftover index bits mean the proof is shorter than the claimed position
        idx == 0 && current == *root
    }

    /// Number of leaves (including padding).
    pub fn leaf_count(&self) -> usize {
        self.layers.first().map_or(0, Vec::len)
    }
}

/// Check that `cid` is committed under `root` by `proof`.
pub fn verify_cid_inclusion(root: &Hash, cid: &ContentId, proof: &MerkleProof) -> bool {
    MerkleTree::verify(root, &cid_leaf(cid), proof)
}
