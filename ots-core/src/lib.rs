//! Core proof-tree functionality for OTS timestamp proofs
//!
//! This crate provides:
//! - The operation algebra that transforms digests along tree edges
//! - The attestation hierarchy that terminates proof branches
//! - The recursive proof tree with its canonical binary codec,
//!   merge and shrink algorithms
//! - Batch Merkle aggregation for amortized calendar submission
//! - The detached `.ots` proof file container

pub mod attestation;
pub mod detached;
pub mod merkle;
pub mod op;
pub mod timestamp;

pub use attestation::{Attestation, BlockHeader, Chain, VerificationError};
pub use detached::DetachedTimestampFile;
pub use merkle::{replay_chain, MerkleError, MerkleTree};
pub use op::Op;
pub use timestamp::{MergeError, ShrinkError, Timestamp};
