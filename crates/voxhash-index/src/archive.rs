//! On-disk format for finished indices.
//!
//! Layout: the magic `VXHM`, a format version byte, the payload length as a
//! little-endian `u32`, then the bincode-encoded [`HashMapInfos`].

use std::path::Path;

use voxhash_core::{Error, Result};

use crate::infos::HashMapInfos;

/// File signature.
pub const MAGIC: [u8; 4] = *b"VXHM";

/// Bumped whenever the flat layout changes.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 1 + 4;

/// Encode an index with its header.
pub fn encode(infos: &HashMapInfos) -> Result<Vec<u8>> {
    let data = bincode::serialize(infos).map_err(|e| Error::Serialization(e.to_string()))?;
    let len = u32::try_from(data.len()).map_err(|_| Error::CapacityExceeded("archive payload"))?;
    let mut result = Vec::with_capacity(HEADER_LEN + data.len());
    result.extend_from_slice(&MAGIC);
    result.push(FORMAT_VERSION);
    result.extend_from_slice(&len.to_le_bytes());
    result.extend(data);
    Ok(result)
}

/// Decode an index, checking magic, version and payload length.
pub fn decode(bytes: &[u8]) -> Result<HashMapInfos> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Serialization(format!(
            "archive too short: {} bytes",
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);
    if header[..4] != MAGIC {
        return Err(Error::Serialization("not a voxel hash archive".into()));
    }
    if header[4] != FORMAT_VERSION {
        return Err(Error::Serialization(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            header[4]
        )));
    }
    let len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as usize;
    if payload.len() != len {
        return Err(Error::Serialization(format!(
            "payload is {} bytes, header says {len}",
            payload.len()
        )));
    }
    bincode::deserialize(payload).map_err(|e| Error::Serialization(e.to_string()))
}

/// Write an index to `path`.
pub fn save(infos: &HashMapInfos, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode(infos)?;
    std::fs::write(path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved voxel hash index");
    Ok(())
}

/// Read an index from `path`.
pub fn load(path: impl AsRef<Path>) -> Result<HashMapInfos> {
    let path = path.as_ref();
    let infos = decode(&std::fs::read(path)?)?;
    tracing::debug!(
        path = %path.display(),
        boxes = infos.occupied_boxes(),
        "Loaded voxel hash index"
    );
    Ok(infos)
}
