// usedotnet-aio/src/json_io.rs
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use usedotnet_common::error::Result;

/// Serializes `data` and writes it with [`crate::fs::atomic_write_file`].
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    debug!("Writing JSON to: {}", path.display());
    let json_bytes = serde_json::to_vec(data)?;
    crate::fs::atomic_write_file(path, &json_bytes)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Reading JSON from: {}", path.display());
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
