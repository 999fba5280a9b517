//! Codec primitives and shared error types for OTS timestamp proofs
//!
//! This crate defines the low-level binary readers and writers used by the
//! proof serialization format, plus the error taxonomy for everything a
//! parser can reject.

pub mod error;
pub mod ser;

pub use error::{Error, Result};
pub use ser::{Deserializer, Serializer};
