// usedotnet-aio/src/fs.rs
// Synchronous filesystem primitives used while laying out an install.
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, error, warn};
use usedotnet_common::error::{Result, UseDotNetError};
use walkdir::WalkDir;

/// Creates a directory and all its parent components if they are missing.
pub fn create_dir_all(path: &Path) -> Result<()> {
    debug!("Creating directory recursively: {}", path.display());
    fs::create_dir_all(path).map_err(|e| {
        error!("Failed create dir {}: {}", path.display(), e);
        UseDotNetError::UnableToAccessPath {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })
}

/// Removes a directory tree. A missing directory is not an error.
pub fn remove_directory_recursive(path: &Path) -> Result<()> {
    debug!("Removing directory recursively: {}", path.display());
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            error!("Failed remove dir_all {}: {}", path.display(), e);
            Err(UseDotNetError::from(e))
        }
    }
}

/// Writes `content` next to `original_path` and renames it into place, so readers see
/// either the old file or the complete new one.
pub fn atomic_write_file(original_path: &Path, content: &[u8]) -> Result<()> {
    let dir = original_path.parent().ok_or_else(|| {
        UseDotNetError::IoError(format!(
            "Cannot get parent directory for {}",
            original_path.display()
        ))
    })?;
    create_dir_all(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir)?;
    let temp_path = temp_file.path().to_path_buf();
    debug!(
        "Atomically writing {} bytes to {} via temp file {}",
        content.len(),
        original_path.display(),
        temp_path.display()
    );

    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(original_path).map_err(|e| {
        error!(
            "Failed to persist temporary file {} over {}: {}",
            temp_path.display(),
            original_path.display(),
            e.error
        );
        UseDotNetError::Io(Arc::new(e.error))
    })?;
    Ok(())
}

/// Copies one file, creating the destination's parent directory.
pub fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    let to_copy_error = |reason: String| UseDotNetError::FailedToCopy {
        src: src.to_path_buf(),
        dest: dest.to_path_buf(),
        reason,
    };
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| to_copy_error(e.to_string()))?;
    }
    fs::copy(src, dest).map_err(|e| to_copy_error(e.to_string()))?;
    Ok(())
}

/// Copies the tree under `src` into `dest`, overwriting files that already exist.
/// Returns the number of files copied.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<u64> {
    debug!("Copying {} -> {}", src.display(), dest.display());
    let to_copy_error = |reason: String| UseDotNetError::FailedToCopy {
        src: src.to_path_buf(),
        dest: dest.to_path_buf(),
        reason,
    };
    if !src.is_dir() {
        return Err(to_copy_error("source is not a directory".to_string()));
    }
    fs::create_dir_all(dest).map_err(|e| to_copy_error(e.to_string()))?;

    let mut copied = 0u64;
    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| to_copy_error(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| to_copy_error(e.to_string()))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| to_copy_error(e.to_string()))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target).map_err(|e| to_copy_error(e.to_string()))?;
            copied += 1;
        } else {
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target).map_err(|e| to_copy_error(e.to_string()))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| {
                to_copy_error(format!("{}: {e}", entry.path().display()))
            })?;
            copied += 1;
        }
    }
    debug!("Copied {} files into {}", copied, dest.display());
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    let points_to = fs::read_link(link)?;
    if target.symlink_metadata().is_ok() {
        fs::remove_file(target)?;
    }
    std::os::unix::fs::symlink(points_to, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    warn!(
        "Copying symlink target instead of the link itself: {}",
        link.display()
    );
    fs::copy(link, target).map(|_| ())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Lists the direct children of `dir_path`. Entries that cannot be read are skipped.
pub fn list_directory_entries(dir_path: &Path) -> Result<Vec<DirEntryInfo>> {
    debug!("Listing directory entries for: {}", dir_path.display());
    let read_dir = fs::read_dir(dir_path).map_err(|e| {
        error!("Failed to read directory {}: {}", dir_path.display(), e);
        UseDotNetError::UnableToAccessPath {
            path: dir_path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    let mut entries = Vec::new();
    for entry_res in read_dir {
        let entry = match entry_res {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error reading entry in {}: {}", dir_path.display(), e);
                continue;
            }
        };
        let path = entry.path();
        match entry.file_type() {
            Ok(file_type) => entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                path,
                is_dir: file_type.is_dir(),
            }),
            Err(e) => warn!("Failed to get file type for {}: {}", path.display(), e),
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
