//! # Sanctions Merkle Tree
//!
//! A fixed-depth full binary Merkle tree over Poseidon-2 whose leaves are
//! sanctioned ISO 3166-1 numeric country codes. The circuit consumes the
//! root and a non-membership argument; the server consumes the same tree
//! for the issuance-time screen and for handing proof paths to clients.
//!
//! The tree is an arena — one flat `Vec<Fr>` per level, no pointer nodes,
//! no interior mutability. A refresh builds a whole new tree and swaps an
//! `Arc`, so readers observe either the old or the new tree, never a
//! half-built one. There is no incremental mutation; the sanctions list
//! changes a few times a year, not a few times a second.

use ark_bn254::Fr;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SANCTIONS_TREE_DEPTH;
use crate::crypto::poseidon::{poseidon2, PoseidonError};

/// Country codes under comprehensive sanctions programs. A static
/// baseline — live SDN list ingestion is a deployment concern, wired in
/// through [`SanctionsList::refresh`].
pub const DEFAULT_SANCTIONED_COUNTRIES: &[u16] = &[
    192, // Cuba
    364, // Iran
    408, // North Korea
    760, // Syria
];

/// Errors from tree construction and proof generation.
#[derive(Debug, Error)]
pub enum SanctionsError {
    #[error("too many leaves: {count} exceeds capacity {capacity}")]
    TooManyLeaves { count: usize, capacity: usize },

    #[error("leaf index {index} out of range for capacity {capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },

    #[error(transparent)]
    Poseidon(#[from] PoseidonError),
}

/// A Merkle inclusion path: one sibling per level plus which side the
/// climbing node was on (0 = left child, 1 = right child).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePath {
    /// Sibling hashes, leaf level first.
    pub siblings: Vec<Fr>,
    /// Side bits, leaf level first. `0` means the node being proven is
    /// the left input to its parent.
    pub side_bits: Vec<u8>,
}

/// The immutable tree itself.
#[derive(Debug, Clone)]
pub struct SanctionsTree {
    /// `levels[0]` is the padded leaf layer; `levels[depth]` holds the root.
    levels: Vec<Vec<Fr>>,
    /// The codes that populated the leaves, in leaf order.
    codes: Vec<u16>,
}

impl SanctionsTree {
    /// Build a depth-[`SANCTIONS_TREE_DEPTH`] tree from a list of
    /// sanctioned country codes. Empty leaf slots are zero.
    pub fn build(codes: &[u16]) -> Result<Self, SanctionsError> {
        Self::build_with_depth(codes, SANCTIONS_TREE_DEPTH)
    }

    /// Build with an explicit depth. Exposed for tests that want a tiny
    /// tree; production always uses the default depth.
    pub fn build_with_depth(codes: &[u16], depth: usize) -> Result<Self, SanctionsError> {
        let capacity = 1usize << depth;
        if codes.len() > capacity {
            return Err(SanctionsError::TooManyLeaves {
                count: codes.len(),
                capacity,
            });
        }

        let mut leaves = vec![Fr::from(0u64); capacity];
        for (i, code) in codes.iter().enumerate() {
            leaves[i] = Fr::from(*code as u64);
        }

        let mut levels = Vec::with_capacity(depth + 1);
        levels.push(leaves);
        for level in 0..depth {
            let below = &levels[level];
            let mut above = Vec::with_capacity(below.len() / 2);
            for pair in below.chunks_exact(2) {
                above.push(poseidon2(pair[0], pair[1])?);
            }
            levels.push(above);
        }

        Ok(Self {
            levels,
            codes: codes.to_vec(),
        })
    }

    /// The tree depth.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Leaf capacity (`2^depth`).
    pub fn capacity(&self) -> usize {
        self.levels[0].len()
    }

    /// The Merkle root.
    pub fn root(&self) -> Fr {
        self.levels[self.depth()][0]
    }

    /// Index of a leaf value, or `None` if absent.
    ///
    /// A linear scan — the populated prefix is tens of entries, and this
    /// is not on any hot path.
    pub fn index_of(&self, leaf: Fr) -> Option<usize> {
        self.codes
            .iter()
            .position(|c| Fr::from(*c as u64) == leaf)
    }

    /// Whether a country code appears in the leaf set.
    pub fn contains(&self, code: u16) -> bool {
        self.codes.contains(&code)
    }

    /// The populated leaf codes, in leaf order.
    pub fn codes(&self) -> &[u16] {
        &self.codes
    }

    /// Generate the inclusion path for the leaf at `index`.
    pub fn generate_proof(&self, index: usize) -> Result<MerklePath, SanctionsError> {
        if index >= self.capacity() {
            return Err(SanctionsError::IndexOutOfRange {
                index,
                capacity: self.capacity(),
            });
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut side_bits = Vec::with_capacity(self.depth());
        let mut pos = index;

        for level in 0..self.depth() {
            let is_right = pos & 1 == 1;
            let sibling_pos = if is_right { pos - 1 } else { pos + 1 };
            siblings.push(self.levels[level][sibling_pos]);
            side_bits.push(if is_right { 1 } else { 0 });
            pos >>= 1;
        }

        Ok(MerklePath {
            siblings,
            side_bits,
        })
    }

    /// Recompute the root from a leaf and its path. Test and client
    /// support; the circuit does the same walk in-constraint.
    pub fn verify_proof(root: Fr, leaf: Fr, path: &MerklePath) -> Result<bool, SanctionsError> {
        let mut node = leaf;
        for (sibling, side) in path.siblings.iter().zip(&path.side_bits) {
            node = if *side == 0 {
                poseidon2(node, *sibling)?
            } else {
                poseidon2(*sibling, node)?
            };
        }
        Ok(node == root)
    }
}

/// The shared, refreshable view of the sanctions tree.
///
/// Readers take a cheap `Arc` snapshot; `refresh` builds a complete
/// replacement off to the side and swaps the pointer under a short write
/// lock.
pub struct SanctionsList {
    tree: RwLock<Arc<SanctionsTree>>,
}

impl SanctionsList {
    /// Build the list from the static default country set.
    pub fn with_defaults() -> Result<Self, SanctionsError> {
        Self::from_codes(DEFAULT_SANCTIONED_COUNTRIES)
    }

    /// Build the list from an explicit country set.
    pub fn from_codes(codes: &[u16]) -> Result<Self, SanctionsError> {
        Ok(Self {
            tree: RwLock::new(Arc::new(SanctionsTree::build(codes)?)),
        })
    }

    /// Whether a country is sanctioned, per the current tree.
    pub fn is_sanctioned(&self, code: u16) -> bool {
        self.tree.read().contains(code)
    }

    /// A consistent snapshot of the current tree.
    pub fn snapshot(&self) -> Arc<SanctionsTree> {
        Arc::clone(&self.tree.read())
    }

    /// Rebuild from a fresh code list and atomically publish the result.
    /// The old tree stays alive as long as any reader still holds it.
    pub fn refresh(&self, codes: &[u16]) -> Result<(), SanctionsError> {
        let rebuilt = Arc::new(SanctionsTree::build(codes)?);
        *self.tree.write() = rebuilt;
        tracing::info!(leaves = codes.len(), "sanctions tree refreshed");
        Ok(())
    }
}
