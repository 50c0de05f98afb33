// usedotnet-aio/src/checksum.rs
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha512};
use usedotnet_common::error::{Result, UseDotNetError};
use tracing::debug;

/// Hashes the file at `path` with SHA-512 and compares against the feed's hex digest.
pub fn verify_sha512(path: &Path, expected: &str) -> Result<()> {
    debug!("Verifying SHA-512 checksum for: {}", path.display());
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mut hasher = Sha512::new();
    let bytes_copied = std::io::copy(&mut reader, &mut hasher)?;
    let actual = hex::encode(hasher.finalize());

    debug!("Calculated SHA-512: {} ({} bytes read)", actual, bytes_copied);
    debug!("Expected SHA-512:   {}", expected);

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(UseDotNetError::ChecksumMismatch(format!(
            "Checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        )))
    }
}

/// [`verify_sha512`] on the blocking pool.
pub async fn verify_sha512_async(path: &Path, expected: &str) -> Result<()> {
    let path: PathBuf = path.to_path_buf();
    let expected = expected.to_string();
    tokio::task::spawn_blocking(move || verify_sha512(&path, &expected))
        .await
        .map_err(|e| UseDotNetError::IoError(format!("JoinError in checksum verification: {e}")))?
}
