//! Operations that transform digests along proof tree edges
//!
//! Cryptographic operation tag numbers were originally taken from RFC 4880.
//! Remember that for timestamping, hash algorithms with collision attacks
//! are still secure: both messages are proven to have existed prior to some
//! point in time regardless.

use std::cmp::Ordering;
use std::fmt;

use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use sha3::Keccak256;

use ots_types::{Deserializer, Error, Result, Serializer};

/// Maximum length of a binary operation argument, and thereby of any
/// operation result carried on the wire.
pub const MAX_RESULT_LENGTH: usize = 4096;

/// A pure, tagged transformation from one digest to another.
///
/// Operations are immutable value objects with a total order, usable as
/// map keys. Unary variants hash their input; binary variants concatenate
/// it with a fixed argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    Sha1,
    Ripemd160,
    Sha256,
    Keccak256,
    Append(Vec<u8>),
    Prepend(Vec<u8>),
}

impl Op {
    pub const TAG_SHA1: u8 = 0x02;
    pub const TAG_RIPEMD160: u8 = 0x03;
    pub const TAG_SHA256: u8 = 0x08;
    pub const TAG_KECCAK256: u8 = 0x67;
    pub const TAG_APPEND: u8 = 0xf0;
    pub const TAG_PREPEND: u8 = 0xf1;

    /// The wire tag byte for this operation.
    pub fn tag(&self) -> u8 {
        match self {
            Op::Sha1 => Self::TAG_SHA1,
            Op::Ripemd160 => Self::TAG_RIPEMD160,
            Op::Sha256 => Self::TAG_SHA256,
            Op::Keccak256 => Self::TAG_KECCAK256,
            Op::Append(_) => Self::TAG_APPEND,
            Op::Prepend(_) => Self::TAG_PREPEND,
        }
    }

    /// The argument bytes for binary operations; empty for hashes.
    pub fn arg(&self) -> &[u8] {
        match self {
            Op::Append(arg) | Op::Prepend(arg) => arg,
            _ => &[],
        }
    }

    /// Result length for hash operations; `None` for binary operations,
    /// whose result length depends on the input.
    pub fn digest_len(&self) -> Option<usize> {
        match self {
            Op::Sha1 | Op::Ripemd160 => Some(20),
            Op::Sha256 | Op::Keccak256 => Some(32),
            Op::Append(_) | Op::Prepend(_) => None,
        }
    }

    /// Short lowercase name, as shown in proof dumps.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Sha1 => "sha1",
            Op::Ripemd160 => "ripemd160",
            Op::Sha256 => "sha256",
            Op::Keccak256 => "keccak256",
            Op::Append(_) => "append",
            Op::Prepend(_) => "prepend",
        }
    }

    /// Apply the operation to a message. Pure and total: any input length
    /// is accepted and the same input always yields the same output.
    pub fn call(&self, msg: &[u8]) -> Vec<u8> {
        match self {
            Op::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(msg);
                hasher.finalize().to_vec()
            }
            Op::Ripemd160 => {
                let mut hasher = Ripemd160::new();
                hasher.update(msg);
                hasher.finalize().to_vec()
            }
            Op::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(msg);
                hasher.finalize().to_vec()
            }
            Op::Keccak256 => {
                let mut hasher = Keccak256::new();
                hasher.update(msg);
                hasher.finalize().to_vec()
            }
            Op::Append(arg) => {
                let mut out = Vec::with_capacity(msg.len() + arg.len());
                out.extend_from_slice(msg);
                out.extend_from_slice(arg);
                out
            }
            Op::Prepend(arg) => {
                let mut out = Vec::with_capacity(arg.len() + msg.len());
                out.extend_from_slice(arg);
                out.extend_from_slice(msg);
                out
            }
        }
    }

    /// Serialize: the tag byte, then a length-prefixed argument for binary
    /// operations.
    pub fn serialize(&self, s: &mut Serializer) {
        s.write_byte(self.tag());
        match self {
            Op::Append(arg) | Op::Prepend(arg) => s.write_varbytes(arg),
            _ => {}
        }
    }

    /// Deserialize an operation, tag byte included.
    pub fn deserialize(d: &mut Deserializer<'_>) -> Result<Self> {
        let tag = d.read_byte()?;
        Self::deserialize_from_tag(d, tag)
    }

    /// Deserialize the remainder of an operation whose tag byte has already
    /// been consumed. An unrecognized tag is a hard error: operations define
    /// tree topology, which cannot be carried opaquely.
    pub fn deserialize_from_tag(d: &mut Deserializer<'_>, tag: u8) -> Result<Self> {
        match tag {
            Self::TAG_SHA1 => Ok(Op::Sha1),
            Self::TAG_RIPEMD160 => Ok(Op::Ripemd160),
            Self::TAG_SHA256 => Ok(Op::Sha256),
            Self::TAG_KECCAK256 => Ok(Op::Keccak256),
            Self::TAG_APPEND => {
                let arg = d.read_varbytes_bounded(MAX_RESULT_LENGTH, 1)?;
                Ok(Op::Append(arg.to_vec()))
            }
            Self::TAG_PREPEND => {
                let arg = d.read_varbytes_bounded(MAX_RESULT_LENGTH, 1)?;
                Ok(Op::Prepend(arg.to_vec()))
            }
            other => Err(Error::UnknownOperationTag(other)),
        }
    }

    /// Look up a hash operation by tag, for contexts that require a fixed
    /// result length (the detached file header).
    pub fn from_digest_tag(tag: u8) -> Result<Self> {
        match tag {
            Self::TAG_SHA1 => Ok(Op::Sha1),
            Self::TAG_RIPEMD160 => Ok(Op::Ripemd160),
            Self::TAG_SHA256 => Ok(Op::Sha256),
            Self::TAG_KECCAK256 => Ok(Op::Keccak256),
            Self::TAG_APPEND => Err(Error::InvalidDigestOp("append".to_string())),
            Self::TAG_PREPEND => Err(Error::InvalidDigestOp("prepend".to_string())),
            other => Err(Error::UnknownOperationTag(other)),
        }
    }
}

impl Ord for Op {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag()
            .cmp(&other.tag())
            .then_with(|| self.arg().cmp(other.arg()))
    }
}

impl PartialOrd for Op {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Append(arg) | Op::Prepend(arg) => {
                write!(f, "{} {}", self.name(), hex::encode(arg))
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}
