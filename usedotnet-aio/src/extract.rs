// usedotnet-aio/src/extract.rs
// Unpacks release archives on the blocking pool.

use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, error, warn};
use usedotnet_common::error::{Result, UseDotNetError};
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// Infers the archive type from a file name or URL.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let lower = lower.split(['?', '#']).next().unwrap_or_default();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::TarGz => ".tar.gz",
        }
    }
}

/// Extracts `archive_path` into `target_dir`, creating it if needed.
pub async fn extract_archive_async(
    archive_path: &Path,
    target_dir: &Path,
    kind: ArchiveKind,
) -> Result<()> {
    debug!(
        "Extracting archive '{}' ({:?}) to '{}'",
        archive_path.display(),
        kind,
        target_dir.display()
    );
    let archive = archive_path.to_path_buf();
    let target = target_dir.to_path_buf();
    let result = tokio::task::spawn_blocking(move || match kind {
        ArchiveKind::Zip => extract_zip(&archive, &target),
        ArchiveKind::TarGz => extract_tar_gz(&archive, &target),
    })
    .await
    .map_err(|e| format!("JoinError in archive extraction: {e}"))
    .and_then(|inner| inner);

    result.map_err(|reason| {
        error!("Failed to extract {}: {}", archive_path.display(), reason);
        UseDotNetError::FailedWhileExtractingPackage {
            archive: archive_path.to_path_buf(),
            reason,
        }
    })
}

fn extract_tar_gz(archive_path: &Path, target_dir: &Path) -> std::result::Result<(), String> {
    std::fs::create_dir_all(target_dir).map_err(|e| e.to_string())?;
    let file = File::open(archive_path).map_err(|e| format!("cannot open archive: {e}"))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let entries = archive
        .entries()
        .map_err(|e| format!("failed to read TAR entries: {e}"))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| format!("error reading TAR entry: {e}"))?;
        let entry_path = entry
            .path()
            .map_err(|e| format!("invalid path in TAR entry: {e}"))?
            .into_owned();
        safe_join(target_dir, &entry_path)?;
        // unpack_in refuses entries that would escape target_dir.
        let unpacked = entry
            .unpack_in(target_dir)
            .map_err(|e| format!("failed to unpack {}: {e}", entry_path.display()))?;
        if !unpacked {
            warn!("Skipped TAR entry outside of target: {}", entry_path.display());
        }
    }
    debug!("Finished TAR extraction for {}", archive_path.display());
    Ok(())
}

fn extract_zip(archive_path: &Path, target_dir: &Path) -> std::result::Result<(), String> {
    std::fs::create_dir_all(target_dir).map_err(|e| e.to_string())?;
    let file = File::open(archive_path).map_err(|e| format!("cannot open archive: {e}"))?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| format!("failed to open ZIP: {e}"))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("failed to access ZIP entry: {e}"))?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| format!("unsafe ZIP entry path '{}'", entry.name()))?;
        let outpath = safe_join(target_dir, &relative)?;

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| format!("failed to create dir: {e}"))?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create parent dir: {e}"))?;
        }
        let mut outfile = File::create(&outpath)
            .map_err(|e| format!("failed to create {}: {e}", outpath.display()))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| format!("failed to write {}: {e}", outpath.display()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
            {
                warn!("Failed set permissions on {}: {}", outpath.display(), e);
            }
        }
    }
    debug!("Finished ZIP extraction for {}", archive_path.display());
    Ok(())
}

/// Joins an archive entry path onto `root`, rejecting absolute and `..` components.
fn safe_join(root: &Path, entry: &Path) -> std::result::Result<PathBuf, String> {
    let mut out = root.to_path_buf();
    for comp in entry.components() {
        match comp {
            Component::Normal(p) => out.push(p),
            Component::CurDir => {}
            _ => {
                return Err(format!(
                    "unsafe path component {:?} in {}",
                    comp,
                    entry.display()
                ))
            }
        }
    }
    Ok(out)
}
