//! OTS Client Library
//!
//! Orchestrates stamping, upgrading and verifying timestamp proofs against
//! remote calendar servers and a block-header source.

pub mod bitcoin;
pub mod calendar;
pub mod client;
pub mod config;
pub mod storage;

pub use bitcoin::{BitcoinRpc, BitcoinRpcConfig, HeaderSource};
pub use calendar::{CalendarSource, DigestSigner, RemoteCalendar};
pub use client::{OtsClient, VerifyResult};
pub use config::ClientConfig;

use ots_core::{Chain, MergeError, VerificationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    #[error("calendar response exceeded size limit {limit} bytes")]
    ExceededSize { limit: usize, actual: usize },

    #[error("calendar has no timestamp for commitment {0}")]
    CommitmentNotFound(String),

    #[error("calendar returned status {status} from {url}")]
    BadStatus { status: u16, url: String },

    #[error("no calendar responded with a valid timestamp")]
    NoCalendarResponse,

    #[error("proof does not commit to the provided digest")]
    DigestMismatch,

    #[error("no block-header source configured for chain {0}")]
    UnsupportedChain(Chain),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("proof parse error: {0}")]
    Deserialization(#[from] ots_types::Error),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("aggregation error: {0}")]
    Aggregation(#[from] ots_core::MerkleError),

    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
