//! Batch Merkle aggregation
//!
//! Many independent digests are committed under one aggregate root so a
//! single calendar submission covers all of them. Siblings are paired with
//! the commitment operation `sha256(sha256(left || right))`, expressed as an
//! append/prepend edge followed by two chained sha256 edges; an odd tail is
//! promoted to the next level unchanged.
//!
//! The builder records every leaf's operation chain from leaf digest to
//! root. A leaf's individual proof is reconstructed later by replaying that
//! chain and merging the anchored root timestamp at the tip.

use thiserror::Error;

use crate::op::Op;
use crate::timestamp::{MergeError, Timestamp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a merkle tree over zero leaves")]
    Empty,
}

/// An aggregate commitment over a batch of leaf digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    leaves: Vec<Vec<u8>>,
    chains: Vec<Vec<Op>>,
    root: Vec<u8>,
}

impl MerkleTree {
    /// Pair up the leaves level by level into a single aggregate root.
    pub fn build(leaves: Vec<Vec<u8>>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::Empty);
        }

        let mut chains: Vec<Vec<Op>> = vec![Vec::new(); leaves.len()];

        // Each level entry is the node digest plus the original leaf
        // indices committed beneath it
        let mut level: Vec<(Vec<u8>, Vec<usize>)> = leaves
            .iter()
            .enumerate()
            .map(|(i, digest)| (digest.clone(), vec![i]))
            .collect();

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut pairs = level.chunks_exact(2);

            for pair in &mut pairs {
                let (left_digest, left_members) = &pair[0];
                let (right_digest, right_members) = &pair[1];

                for &i in left_members {
                    chains[i].push(Op::Append(right_digest.clone()));
                    chains[i].push(Op::Sha256);
                    chains[i].push(Op::Sha256);
                }
                for &i in right_members {
                    chains[i].push(Op::Prepend(left_digest.clone()));
                    chains[i].push(Op::Sha256);
                    chains[i].push(Op::Sha256);
                }

                let cat = Op::Append(right_digest.clone()).call(left_digest);
                let parent = Op::Sha256.call(&Op::Sha256.call(&cat));

                let mut members = left_members.clone();
                members.extend_from_slice(right_members);
                next.push((parent, members));
            }

            // Odd tail moves up unchanged
            if let [tail] = pairs.remainder() {
                next.push(tail.clone());
            }

            level = next;
        }

        // Safe: a non-empty input always reduces to exactly one node
        let (root, _) = level.pop().expect("reduction leaves one node");

        Ok(Self { leaves, chains, root })
    }

    /// The aggregate root digest submitted to calendars.
    pub fn root(&self) -> &[u8] {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The digest of leaf `i`.
    pub fn leaf(&self, i: usize) -> &[u8] {
        &self.leaves[i]
    }

    /// The operation chain carrying leaf `i` to the root.
    pub fn chain(&self, i: usize) -> &[Op] {
        &self.chains[i]
    }

    /// Reconstruct the proof tree for leaf `i`, terminating in `anchor`
    /// (the timestamp returned for the aggregate root).
    pub fn proof_for(&self, i: usize, anchor: Timestamp) -> Result<Timestamp, MergeError> {
        replay_chain(self.leaves[i].clone(), &self.chains[i], anchor)
    }
}

/// Replay an operation chain from a leaf digest and merge `anchor` at the
/// tip. Fails if the chain does not arrive at the anchor's digest.
pub fn replay_chain(
    leaf: Vec<u8>,
    chain: &[Op],
    anchor: Timestamp,
) -> Result<Timestamp, MergeError> {
    let mut stamp = Timestamp::new(leaf);

    let mut tip = &mut stamp;
    for op in chain {
        tip = tip.add(op.clone());
    }
    tip.merge(anchor)?;

    Ok(stamp)
}
