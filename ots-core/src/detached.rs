//! The detached `.ots` proof file container
//!
//! A sidecar file carries one serialized proof tree for one original file:
//! a fixed magic header, a version, the hash operation applied to the file
//! content, the resulting digest, and the tree rooted at that digest.

use std::fmt;

use crate::op::Op;
use crate::timestamp::Timestamp;
use ots_types::{Deserializer, Error as CodecError, Result as CodecResult, Serializer};

/// Magic bytes opening every detached proof file.
pub const HEADER_MAGIC: [u8; 31] = [
    0x00, 0x4f, 0x70, 0x65, 0x6e, 0x54, 0x69, 0x6d, 0x65, 0x73, 0x74, 0x61, 0x6d, 0x70, 0x73,
    0x00, 0x00, 0x50, 0x72, 0x6f, 0x6f, 0x66, 0x00, 0xbf, 0x89, 0xe2, 0xe8, 0x84, 0xe8, 0x92,
    0x94,
];

/// The only file format major version understood by this implementation.
pub const MAJOR_VERSION: u64 = 1;

/// A proof tree bound to the digest of an original file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedTimestampFile {
    digest_op: Op,
    pub timestamp: Timestamp,
}

impl DetachedTimestampFile {
    /// Wrap an already-computed digest. The operation must be a hash so the
    /// digest length is fixed by the format.
    pub fn from_digest(digest_op: Op, digest: Vec<u8>) -> CodecResult<Self> {
        if digest_op.digest_len().is_none() {
            return Err(CodecError::InvalidDigestOp(digest_op.name().to_string()));
        }
        Ok(Self {
            digest_op,
            timestamp: Timestamp::new(digest),
        })
    }

    /// Hash file content with the given operation and wrap the result.
    pub fn from_data(digest_op: Op, data: &[u8]) -> CodecResult<Self> {
        let digest = digest_op.call(data);
        Self::from_digest(digest_op, digest)
    }

    /// The hash operation applied to the original file.
    pub fn digest_op(&self) -> &Op {
        &self.digest_op
    }

    /// The digest of the original file — the proof tree's root message.
    pub fn file_digest(&self) -> &[u8] {
        self.timestamp.msg()
    }

    pub fn serialize_to_vec(&self) -> Vec<u8> {
        let mut s = Serializer::new();
        self.serialize(&mut s);
        s.into_vec()
    }

    pub fn serialize(&self, s: &mut Serializer) {
        s.write_bytes(&HEADER_MAGIC);
        s.write_varuint(MAJOR_VERSION);
        self.digest_op.serialize(s);
        s.write_bytes(self.timestamp.msg());
        self.timestamp.serialize(s);
    }

    pub fn deserialize(d: &mut Deserializer<'_>) -> CodecResult<Self> {
        let magic = d.read_bytes(HEADER_MAGIC.len())?;
        if magic != HEADER_MAGIC {
            return Err(CodecError::BadMagic);
        }

        let version = d.read_varuint()?;
        if version != MAJOR_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let tag = d.read_byte()?;
        let digest_op = Op::from_digest_tag(tag)?;
        // Safe: from_digest_tag only returns hash operations
        let digest_len = digest_op.digest_len().expect("hash op has fixed length");
        let digest = d.read_bytes(digest_len)?.to_vec();

        let timestamp = Timestamp::deserialize(d, digest)?;

        Ok(Self { digest_op, timestamp })
    }

    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let mut d = Deserializer::new(bytes);
        Self::deserialize(&mut d)
    }

    /// Human-readable dump of the file digest and its proof tree.
    pub fn info(&self) -> String {
        format!(
            "File {} hash: {}\nTimestamp:\n{}",
            self.digest_op.name(),
            hex::encode(self.file_digest()),
            self.timestamp.tree_string(0)
        )
    }
}

impl fmt::Display for DetachedTimestampFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info())
    }
}
