//! Binary Merkle trees over batches of record hashes.
//!
//! Parents are `SHA256(left || right)` over the raw 32-byte digests. A level
//! with an odd number of nodes pairs its last node with itself.

use serde::{Deserialize, Serialize};

use crate::crypto::Sha256Hash;
use crate::error::MerkleError;

/// Side of a sibling in a Merkle proof path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Sha256Hash,
    pub position: Side,
}

/// Merkle inclusion proof, ordered from the leaf level up to the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the proven leaf.
    pub leaf_index: usize,
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Number of steps (`ceil(log2(leaf_count))`).
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True for the proof of a single-leaf tree.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Binary Merkle tree built from an ordered, non-empty set of leaves.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// Level 0 = leaves, last level = `[root]`.
    levels: Vec<Vec<Sha256Hash>>,
}

impl MerkleTree {
    /// Build a tree from leaf hashes.
    pub fn build(leaves: Vec<Sha256Hash>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyLeafSet);
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// The root hash.
    pub fn root(&self) -> Sha256Hash {
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// The leaves in build order.
    pub fn leaves(&self) -> &[Sha256Hash] {
        &self.levels[0]
    }

    /// Inclusion proof for the first occurrence of `leaf`.
    pub fn proof(&self, leaf: &Sha256Hash) -> Result<MerkleProof, MerkleError> {
        let index = self
            .leaves()
            .iter()
            .position(|l| l == leaf)
            .ok_or_else(|| MerkleError::LeafNotFound(leaf.to_hex()))?;
        Ok(self.proof_at(index))
    }

    fn proof_at(&self, leaf_index: usize) -> MerkleProof {
        let mut steps = Vec::with_capacity(self.levels.len() - 1);
        let mut idx = leaf_index;

        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling_idx, position) = if idx % 2 == 1 {
                (idx - 1, Side::Left)
            } else {
                (idx + 1, Side::Right)
            };
            // Odd level: the last node is its own sibling
            let sibling = level.get(sibling_idx).copied().unwrap_or(level[idx]);
            steps.push(ProofStep { sibling, position });
            idx /= 2;
        }

        MerkleProof { leaf_index, steps }
    }
}

/// Recompute the root from `leaf` and `proof` and compare with `root`.
pub fn verify_proof(leaf: &Sha256Hash, proof: &MerkleProof, root: &Sha256Hash) -> bool {
    let computed = proof
        .steps
        .iter()
        .fold(*leaf, |current, step| match step.position {
            Side::Left => hash_pair(&step.sibling, &current),
            Side::Right => hash_pair(&current, &step.sibling),
        });
    computed == *root
}

fn hash_pair(left: &Sha256Hash, right: &Sha256Hash) -> Sha256Hash {
    Sha256Hash::hash_parts([left.as_bytes().as_slice(), right.as_bytes().as_slice()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(seed: u8) -> Sha256Hash {
        Sha256Hash::hash(&[seed])
    }

    fn leaves(n: usize) -> Vec<Sha256Hash> {
        (0..n).map(|i| leaf(i as u8)).collect()
    }

    #[test]
    fn test_empty_leaf_set() {
        assert_eq!(MerkleTree::build(vec![]).unwrap_err(), MerkleError::EmptyLeafSet);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let tree = MerkleTree::build(vec![leaf(1)]).unwrap();
        assert_eq!(tree.root(), leaf(1));
        let proof = tree.proof(&leaf(1)).unwrap();
        assert!(proof.is_empty());
        assert!(verify_proof(&leaf(1), &proof, &tree.root()));
    }

    #[test]
    fn test_two_leaves() {
        let tree = MerkleTree::build(vec![leaf(1), leaf(2)]).unwrap();
        assert_eq!(tree.root(), hash_pair(&leaf(1), &leaf(2)));
    }

    #[test]
    fn test_odd_node_is_paired_with_itself() {
        let tree = MerkleTree::build(leaves(3)).unwrap();
        let left = hash_pair(&leaf(0), &leaf(1));
        let right = hash_pair(&leaf(2), &leaf(2));
        assert_eq!(tree.root(), hash_pair(&left, &right));

        let proof = tree.proof(&leaf(2)).unwrap();
        assert_eq!(proof.steps[0], ProofStep { sibling: leaf(2), position: Side::Right });
        assert_eq!(proof.steps[1], ProofStep { sibling: left, position: Side::Left });
    }

    #[test]
    fn test_proof_length_is_ceil_log2() {
        for (n, expected) in [(1, 0), (2, 1), (3, 2), (4, 2), (5, 3), (8, 3), (9, 4)] {
            let tree = MerkleTree::build(leaves(n)).unwrap();
            for l in tree.leaves().to_vec() {
                assert_eq!(tree.proof(&l).unwrap().len(), expected, "n = {n}");
            }
        }
    }

    #[test]
    fn test_leaf_not_found() {
        let tree = MerkleTree::build(leaves(4)).unwrap();
        assert!(matches!(tree.proof(&leaf(99)), Err(MerkleError::LeafNotFound(_))));
    }

    #[test]
    fn test_duplicate_leaf_proves_first_occurrence() {
        let tree = MerkleTree::build(vec![leaf(7), leaf(8), leaf(7)]).unwrap();
        let proof = tree.proof(&leaf(7)).unwrap();
        assert_eq!(proof.leaf_index, 0);
        assert!(verify_proof(&leaf(7), &proof, &tree.root()));
    }

    #[test]
    fn test_tampering_fails() {
        let tree = MerkleTree::build(leaves(6)).unwrap();
        let target = leaf(3);
        let proof = tree.proof(&target).unwrap();
        let root = tree.root();
        assert!(verify_proof(&target, &proof, &root));

        assert!(!verify_proof(&leaf(4), &proof, &root));
        assert!(!verify_proof(&target, &proof, &leaf(200)));

        for i in 0..proof.steps.len() {
            let mut bad = proof.clone();
            bad.steps[i].sibling = leaf(201);
            assert!(!verify_proof(&target, &bad, &root));

            let mut flipped = proof.clone();
            flipped.steps[i].position = match flipped.steps[i].position {
                Side::Left => Side::Right,
                Side::Right => Side::Left,
            };
            assert!(!verify_proof(&target, &flipped, &root));
        }
    }

    #[test]
    fn test_proof_serializes_positions_lowercase() {
        let tree = MerkleTree::build(leaves(2)).unwrap();
        let json = serde_json::to_string(&tree.proof(&leaf(0)).unwrap()).unwrap();
        assert!(json.contains("\"position\":\"right\""));
    }

    proptest! {
        #[test]
        fn prop_every_leaf_proves(n in 1usize..40) {
            let tree = MerkleTree::build(leaves(n)).unwrap();
            for l in tree.leaves() {
                let proof = tree.proof(l).unwrap();
                prop_assert!(verify_proof(l, &proof, &tree.root()));
            }
        }
    }
}
