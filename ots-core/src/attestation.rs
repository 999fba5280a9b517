//! Terminal attestations anchoring a digest to an external fact
//!
//! A block-header attestation records only the block height. The verifier is
//! expected to fetch the header from a by-height index, check that the merkle
//! roots match, and take the time from the header itself: carrying more data
//! in the attestation would invite implementations to trust it instead of
//! checking. A reorg deep enough to invalidate a timestamp also invalidates
//! the merkle root, so no redundant header data is recorded either way.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use ots_types::{Deserializer, Error as CodecError, Result as CodecResult, Serializer};

/// Size of an attestation tag on the wire.
pub const TAG_SIZE: usize = 8;

/// Maximum size of a serialized attestation payload.
pub const MAX_PAYLOAD_SIZE: usize = 8192;

/// Maximum length of a pending attestation's calendar URI.
pub const MAX_URI_LENGTH: usize = 1000;

/// Tag for a pending (calendar promise) attestation.
pub const PENDING_TAG: [u8; TAG_SIZE] = [0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];

/// Tag for a Bitcoin block-header attestation.
pub const BITCOIN_TAG: [u8; TAG_SIZE] = [0x05, 0x88, 0x96, 0x0d, 0x73, 0xd7, 0x19, 0x01];

/// Tag for a Litecoin block-header attestation.
pub const LITECOIN_TAG: [u8; TAG_SIZE] = [0x06, 0x86, 0x9a, 0x0d, 0x73, 0xd7, 0x1b, 0x45];

/// Tag for an Ethereum block-header attestation.
pub const ETHEREUM_TAG: [u8; TAG_SIZE] = [0x30, 0xfe, 0x80, 0x87, 0xb5, 0xc7, 0xea, 0xd7];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("expected a 32-byte digest, got {0} bytes")]
    DigestLength(usize),

    #[error("digest does not match the block merkle root")]
    MerkleRootMismatch,

    #[error("attestation carries no independently checkable claim")]
    Unverifiable,
}

/// Blockchains a block-header attestation can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Chain {
    Bitcoin,
    Litecoin,
    Ethereum,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Bitcoin => write!(f, "bitcoin"),
            Chain::Litecoin => write!(f, "litecoin"),
            Chain::Ethereum => write!(f, "ethereum"),
        }
    }
}

/// A block header as served by an external by-height index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// The merkle root the attested digest must equal, 32 bytes.
    pub merkle_root: Vec<u8>,
    /// Block time as a UNIX timestamp.
    pub time: u64,
}

/// A terminal proof claim attached to a proof tree node.
///
/// `Unknown` preserves attestation kinds this implementation does not
/// recognize, so proofs containing newer attestations round-trip without
/// data loss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Attestation {
    /// A promise that a calendar will anchor the digest later.
    Pending { uri: String },
    /// The digest equals the merkle root of the Bitcoin block at `height`.
    Bitcoin { height: u64 },
    /// The digest equals the merkle root of the Litecoin block at `height`.
    Litecoin { height: u64 },
    /// The digest equals the merkle root of the Ethereum block at `height`.
    Ethereum { height: u64 },
    /// An attestation kind this implementation does not recognize.
    Unknown { tag: [u8; TAG_SIZE], payload: Vec<u8> },
}

impl Attestation {
    /// The 8-byte wire tag.
    pub fn tag(&self) -> [u8; TAG_SIZE] {
        match self {
            Attestation::Pending { .. } => PENDING_TAG,
            Attestation::Bitcoin { .. } => BITCOIN_TAG,
            Attestation::Litecoin { .. } => LITECOIN_TAG,
            Attestation::Ethereum { .. } => ETHEREUM_TAG,
            Attestation::Unknown { tag, .. } => *tag,
        }
    }

    /// The chain a block-header attestation refers to, `None` otherwise.
    pub fn chain(&self) -> Option<Chain> {
        match self {
            Attestation::Bitcoin { .. } => Some(Chain::Bitcoin),
            Attestation::Litecoin { .. } => Some(Chain::Litecoin),
            Attestation::Ethereum { .. } => Some(Chain::Ethereum),
            _ => None,
        }
    }

    /// Block height for block-header attestations.
    pub fn height(&self) -> Option<u64> {
        match self {
            Attestation::Bitcoin { height }
            | Attestation::Litecoin { height }
            | Attestation::Ethereum { height } => Some(*height),
            _ => None,
        }
    }

    /// True for block-header attestations, the only kind that can be
    /// independently verified.
    pub fn is_block_header(&self) -> bool {
        self.chain().is_some()
    }

    /// Serialize: the 8-byte tag, then the payload as a length-prefixed
    /// byte string.
    pub fn serialize(&self, s: &mut Serializer) {
        s.write_bytes(&self.tag());

        let mut payload = Serializer::new();
        match self {
            Attestation::Pending { uri } => payload.write_varbytes(uri.as_bytes()),
            Attestation::Bitcoin { height }
            | Attestation::Litecoin { height }
            | Attestation::Ethereum { height } => payload.write_varuint(*height),
            Attestation::Unknown { payload: raw, .. } => payload.write_bytes(raw),
        }
        s.write_varbytes(payload.as_slice());
    }

    /// Deserialize an attestation. Unrecognized tags yield `Unknown` with
    /// the raw tag and payload preserved; a payload over the size cap fails.
    pub fn deserialize(d: &mut Deserializer<'_>) -> CodecResult<Self> {
        let tag_bytes = d.read_bytes(TAG_SIZE)?;
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(tag_bytes);

        let payload = d.read_varbytes(MAX_PAYLOAD_SIZE)?;
        let mut inner = Deserializer::new(payload);

        match tag {
            PENDING_TAG => {
                let uri_bytes = inner.read_varbytes(MAX_URI_LENGTH)?;
                let uri = String::from_utf8(uri_bytes.to_vec())
                    .map_err(|_| CodecError::InvalidUri)?;
                Ok(Attestation::Pending { uri })
            }
            BITCOIN_TAG => Ok(Attestation::Bitcoin {
                height: inner.read_varuint()?,
            }),
            LITECOIN_TAG => Ok(Attestation::Litecoin {
                height: inner.read_varuint()?,
            }),
            ETHEREUM_TAG => Ok(Attestation::Ethereum {
                height: inner.read_varuint()?,
            }),
            _ => Ok(Attestation::Unknown {
                tag,
                payload: payload.to_vec(),
            }),
        }
    }

    /// Check a block-header attestation against the header fetched for its
    /// height. Returns the block time on success.
    pub fn verify_against_header(
        &self,
        digest: &[u8],
        header: &BlockHeader,
    ) -> Result<u64, VerificationError> {
        if !self.is_block_header() {
            return Err(VerificationError::Unverifiable);
        }
        if digest.len() != 32 {
            return Err(VerificationError::DigestLength(digest.len()));
        }
        if digest != header.merkle_root.as_slice() {
            return Err(VerificationError::MerkleRootMismatch);
        }
        Ok(header.time)
    }

    /// Stable discriminant used as the final ordering tie-break.
    fn kind(&self) -> u8 {
        match self {
            Attestation::Pending { .. } => 0,
            Attestation::Bitcoin { .. } => 1,
            Attestation::Litecoin { .. } => 2,
            Attestation::Ethereum { .. } => 3,
            Attestation::Unknown { .. } => 4,
        }
    }
}

impl Ord for Attestation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag().cmp(&other.tag()).then_with(|| match (self, other) {
            (Attestation::Pending { uri: a }, Attestation::Pending { uri: b }) => a.cmp(b),
            (Attestation::Bitcoin { height: a }, Attestation::Bitcoin { height: b })
            | (Attestation::Litecoin { height: a }, Attestation::Litecoin { height: b })
            | (Attestation::Ethereum { height: a }, Attestation::Ethereum { height: b }) => {
                a.cmp(b)
            }
            (
                Attestation::Unknown { payload: a, .. },
                Attestation::Unknown { payload: b, .. },
            ) => a.cmp(b),
            // Equal tags but different kinds: only reachable when an Unknown
            // was hand-built with a recognized tag. Keep the order total.
            _ => self.kind().cmp(&other.kind()),
        })
    }
}

impl PartialOrd for Attestation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attestation::Pending { uri } => write!(f, "PendingAttestation({uri})"),
            Attestation::Bitcoin { height } => {
                write!(f, "BitcoinBlockHeaderAttestation({height})")
            }
            Attestation::Litecoin { height } => {
                write!(f, "LitecoinBlockHeaderAttestation({height})")
            }
            Attestation::Ethereum { height } => {
                write!(f, "EthereumBlockHeaderAttestation({height})")
            }
            Attestation::Unknown { tag, payload } => {
                write!(f, "UnknownAttestation {} {}", hex::encode(tag), hex::encode(payload))
            }
        }
    }
}
