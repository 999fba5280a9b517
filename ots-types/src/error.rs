//! Error types for OTS proof parsing

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unexpected end of input: needed {needed} more bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("variable-length integer exceeds 64 bits")]
    VaruintOverflow,

    #[error("byte string length {actual} exceeds maximum {max}")]
    OversizedPayload { max: usize, actual: usize },

    #[error("byte string length {actual} below minimum {min}")]
    UndersizedPayload { min: usize, actual: usize },

    #[error("unknown operation tag 0x{0:02x}")]
    UnknownOperationTag(u8),

    #[error("bad magic bytes in detached proof header")]
    BadMagic,

    #[error("unsupported detached proof version {0}")]
    UnsupportedVersion(u64),

    #[error("proof tree exceeds maximum nesting depth")]
    RecursionLimit,

    #[error("calendar URI is not valid UTF-8")]
    InvalidUri,

    #[error("operation {0} cannot serve as a file digest")]
    InvalidDigestOp(String),
}
