//! Sidecar persistence for detached proofs
//!
//! One `.ots` file next to the original carries its serialized proof tree.

use std::path::{Path, PathBuf};

use ots_core::DetachedTimestampFile;

use crate::Result;

/// The sidecar path for an original file: `<file>.ots`.
pub fn ots_path(original: &Path) -> PathBuf {
    let mut name = original.as_os_str().to_os_string();
    name.push(".ots");
    PathBuf::from(name)
}

/// Write a detached proof to a sidecar file.
pub fn write_ots_file(path: &Path, detached: &DetachedTimestampFile) -> Result<()> {
    std::fs::write(path, detached.serialize_to_vec())?;
    Ok(())
}

/// Read a detached proof from a sidecar file.
pub fn read_ots_file(path: &Path) -> Result<DetachedTimestampFile> {
    let bytes = std::fs::read(path)?;
    Ok(DetachedTimestampFile::from_bytes(&bytes)?)
}
