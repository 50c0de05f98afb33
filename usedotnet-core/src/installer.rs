// usedotnet-core/src/installer.rs
//! Installs resolved versions into the shared tool cache.
//!
//! An install walks a fixed sequence of [`InstallState`]s. Each step reports a
//! [`StepOutcome`]; recoverable outcomes become warnings on the [`InstallOutcome`], fatal
//! ones abort before the completion marker is written so a later run retries.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, error, info, warn};
use usedotnet_aio::{
    copy_dir_recursive, extract_archive_async, list_directory_entries, remove_directory_recursive,
    verify_sha512_async, write_json_atomic, ArchiveKind,
};
use usedotnet_common::error::{Result, UseDotNetError};
use usedotnet_common::model::{parse_explicit, PackageType, VersionInfo};
use usedotnet_net::{validate_url, HttpClient};

use crate::version_utils::is_explicit_version;

const MARKER_SUFFIX: &str = ".complete";

/// Content of a `<version>.complete` marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub version: String,
}

/// Filesystem operations an install performs on extracted content.
#[async_trait]
pub trait InstallFs: Send + Sync {
    async fn extract_archive(&self, archive: &Path, dest: &Path, kind: ArchiveKind) -> Result<()>;
    async fn copy_directory(&self, src: &Path, dest: &Path) -> Result<()>;
    async fn copy_file(&self, src: &Path, dest: &Path) -> Result<()>;
    async fn write_marker(&self, path: &Path, marker: &CompletionMarker) -> Result<()>;
}

/// [`InstallFs`] on the local disk, running blocking work on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| UseDotNetError::IoError(format!("JoinError in filesystem task: {e}")))?
}

#[async_trait]
impl InstallFs for LocalFs {
    async fn extract_archive(&self, archive: &Path, dest: &Path, kind: ArchiveKind) -> Result<()> {
        extract_archive_async(archive, dest, kind).await
    }

    async fn copy_directory(&self, src: &Path, dest: &Path) -> Result<()> {
        let (src, dest) = (src.to_path_buf(), dest.to_path_buf());
        blocking(move || copy_dir_recursive(&src, &dest).map(|_| ())).await
    }

    async fn copy_file(&self, src: &Path, dest: &Path) -> Result<()> {
        let (src, dest) = (src.to_path_buf(), dest.to_path_buf());
        blocking(move || usedotnet_aio::copy_file(&src, &dest)).await
    }

    async fn write_marker(&self, path: &Path, marker: &CompletionMarker) -> Result<()> {
        let (path, marker) = (path.to_path_buf(), marker.clone());
        blocking(move || write_json_atomic(&path, &marker)).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotInstalled,
    Downloading,
    Extracting,
    CopyingDirectories,
    CopyingSharedFiles,
    WritingMarker,
    Installed,
    Failed,
}

impl InstallState {
    fn next(self) -> Self {
        match self {
            Self::NotInstalled => Self::Downloading,
            Self::Downloading => Self::Extracting,
            Self::Extracting => Self::CopyingDirectories,
            Self::CopyingDirectories => Self::CopyingSharedFiles,
            Self::CopyingSharedFiles => Self::WritingMarker,
            Self::WritingMarker => Self::Installed,
            Self::Installed => Self::Installed,
            Self::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotInstalled => "not-installed",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::CopyingDirectories => "copying-directories",
            Self::CopyingSharedFiles => "copying-shared-files",
            Self::WritingMarker => "writing-marker",
            Self::Installed => "installed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of one install step.
#[derive(Debug)]
pub enum StepOutcome {
    Completed,
    /// The step partly failed but the install may continue.
    Recoverable(Vec<UseDotNetError>),
    Fatal(UseDotNetError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub version: String,
    pub package_type: PackageType,
    /// `<root>/<sdk|host/fxr>/<version>`.
    pub version_path: PathBuf,
    /// Completion markers written, the package's own last.
    pub marker_paths: Vec<PathBuf>,
    pub shared_files_updated: bool,
    pub warnings: Vec<String>,
}

/// Scratch space of one install; removed when dropped.
struct Staging {
    _dir: TempDir,
    archive: PathBuf,
    extracted: PathBuf,
    kind: ArchiveKind,
}

pub struct VersionInstaller {
    package_type: PackageType,
    installation_root: PathBuf,
    temp_dir: PathBuf,
    http: Arc<dyn HttpClient>,
    fs: Arc<dyn InstallFs>,
}

impl VersionInstaller {
    /// Creates an installer for `installation_root` (the shared `dotnet` directory). The
    /// root is created if missing and must be writable.
    pub fn new(
        package_type: PackageType,
        installation_root: impl Into<PathBuf>,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        let installation_root = installation_root.into();
        if installation_root.as_os_str().is_empty() {
            return Err(UseDotNetError::InvalidArgument(
                "Installation root must not be empty".to_string(),
            ));
        }
        usedotnet_aio::create_dir_all(&installation_root)?;
        NamedTempFile::new_in(&installation_root).map_err(|e| {
            UseDotNetError::UnableToAccessPath {
                path: installation_root.clone(),
                reason: format!("installation root is not writable: {e}"),
            }
        })?;

        Ok(Self {
            package_type,
            installation_root,
            temp_dir: std::env::temp_dir(),
            http,
            fs: Arc::new(LocalFs),
        })
    }

    /// Where downloads and extractions are staged.
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn InstallFs>) -> Self {
        self.fs = fs;
        self
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type
    }

    pub fn installation_root(&self) -> &Path {
        &self.installation_root
    }

    pub fn package_dir(&self) -> PathBuf {
        self.installation_root
            .join(self.package_type.relative_dir())
    }

    pub fn version_path(&self, version: &str) -> PathBuf {
        self.package_dir().join(version)
    }

    fn marker_path(&self, package_type: PackageType, version: &str) -> PathBuf {
        self.installation_root
            .join(package_type.relative_dir())
            .join(format!("{version}{MARKER_SUFFIX}"))
    }

    /// Markers an install of `info` writes, in write order. An sdk marks its runtime
    /// first; the package's own marker always comes last so it only exists once every
    /// other marker does.
    fn markers(&self, info: &VersionInfo) -> Vec<(PathBuf, CompletionMarker)> {
        let version = info.version().trim();
        let mut markers = Vec::with_capacity(2);
        if self.package_type == PackageType::Sdk {
            if let Some(runtime) = info.runtime_version().map(str::trim).filter(|r| !r.is_empty()) {
                markers.push((
                    self.marker_path(PackageType::Runtime, runtime),
                    CompletionMarker {
                        version: runtime.to_string(),
                    },
                ));
            }
        }
        markers.push((
            self.marker_path(self.package_type, version),
            CompletionMarker {
                version: version.to_string(),
            },
        ));
        markers
    }

    /// A version counts as installed only when both its directory and its completion
    /// marker exist.
    pub fn is_version_installed(&self, version: &str) -> Result<bool> {
        if !is_explicit_version(version) {
            return Err(UseDotNetError::ExplicitVersionRequired(version.to_string()));
        }
        let version_dir = self.version_path(version.trim());
        let marker = self.marker_path(self.package_type, version.trim());
        let installed = version_dir.is_dir() && marker.is_file();
        debug!(
            "{} {} installed: {} (dir {}, marker {})",
            self.package_type,
            version,
            installed,
            version_dir.is_dir(),
            marker.is_file()
        );
        Ok(installed)
    }

    /// True unless a strictly greater version is already present under the package
    /// directory, either as a version directory or as a completion marker.
    pub fn is_latest_installed_version(&self, version: &str) -> Result<bool> {
        let wanted = parse_explicit(version)
            .ok_or_else(|| UseDotNetError::ExplicitVersionRequired(version.to_string()))?;
        let dir = self.package_dir();
        if !dir.is_dir() {
            return Ok(true);
        }
        for entry in list_directory_entries(&dir)? {
            let name = if entry.is_dir {
                entry.name.as_str()
            } else {
                match entry.name.strip_suffix(MARKER_SUFFIX) {
                    Some(name) => name,
                    None => continue,
                }
            };
            if let Some(installed) = parse_explicit(name) {
                if installed > wanted {
                    debug!("{} {} is newer than {}", self.package_type, installed, wanted);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Downloads `download_url`, lays the archive out under the installation root and
    /// records completion.
    pub async fn download_and_install(
        &self,
        version_info: &VersionInfo,
        download_url: &str,
    ) -> Result<InstallOutcome> {
        let version = version_info.version().trim().to_string();
        let cannot_download = || UseDotNetError::VersionCanNotBeDownloadedFromUrl {
            version: version.clone(),
            url: download_url.to_string(),
        };
        if version.is_empty() || download_url.trim().is_empty() {
            return Err(cannot_download());
        }
        let url = validate_url(download_url).map_err(|_| cannot_download())?;
        let kind = ArchiveKind::from_name(url.path()).ok_or_else(cannot_download)?;

        usedotnet_aio::create_dir_all(&self.temp_dir)?;
        let dir = tempfile::Builder::new()
            .prefix("usedotnet-")
            .tempdir_in(&self.temp_dir)
            .map_err(|e| UseDotNetError::UnableToAccessPath {
                path: self.temp_dir.clone(),
                reason: e.to_string(),
            })?;
        let archive_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("dotnet{}", kind.extension()));
        let staging = Staging {
            archive: dir.path().join(archive_name),
            extracted: dir.path().join("extracted"),
            _dir: dir,
            kind,
        };

        info!(
            "Installing {} {} into {}",
            self.package_type,
            version,
            self.installation_root.display()
        );
        let mut warnings = Vec::new();
        let mut shared_files_updated = false;
        let mut state = InstallState::NotInstalled.next();
        while state != InstallState::Installed {
            debug!("{} {}: {}", self.package_type, version, state);
            let outcome = match state {
                InstallState::Downloading => {
                    self.download(version_info, download_url, &staging).await
                }
                InstallState::Extracting => self.extract(&staging).await,
                InstallState::CopyingDirectories => {
                    self.copy_directories(&version, &staging).await
                }
                InstallState::CopyingSharedFiles => {
                    let outcome = self.copy_shared_files(&version, &staging).await;
                    shared_files_updated = matches!(outcome, StepOutcome::Completed);
                    outcome
                }
                InstallState::WritingMarker => self.write_markers(version_info).await,
                InstallState::NotInstalled | InstallState::Installed | InstallState::Failed => {
                    StepOutcome::Completed
                }
            };

            match outcome {
                StepOutcome::Completed => {}
                StepOutcome::Recoverable(errors) => {
                    for e in errors {
                        warn!("{} {} ({}): {}", self.package_type, version, state, e);
                        warnings.push(e.to_string());
                    }
                }
                StepOutcome::Fatal(e) => {
                    error!(
                        "{} {} failed while {}: {}",
                        self.package_type,
                        version,
                        state,
                        e
                    );
                    debug!("{} {}: {}", self.package_type, version, InstallState::Failed);
                    return Err(e);
                }
            }
            state = state.next();
        }

        info!("Installed {} {}", self.package_type, version);
        Ok(InstallOutcome {
            version_path: self.version_path(&version),
            marker_paths: self
                .markers(version_info)
                .into_iter()
                .map(|(path, _)| path)
                .collect(),
            version,
            package_type: self.package_type,
            shared_files_updated,
            warnings,
        })
    }

    async fn download(&self, info: &VersionInfo, url: &str, staging: &Staging) -> StepOutcome {
        if let Err(e) = self.http.download_file(url, &staging.archive).await {
            return StepOutcome::Fatal(match e {
                UseDotNetError::CouldNotDownload { .. } => e,
                other => UseDotNetError::CouldNotDownload {
                    url: url.to_string(),
                    reason: other.to_string(),
                },
            });
        }
        let expected = info.file_for_url(url).and_then(|f| f.hash.as_deref());
        match expected {
            Some(hash) => match verify_sha512_async(&staging.archive, hash).await {
                Ok(()) => StepOutcome::Completed,
                Err(e) => StepOutcome::Fatal(UseDotNetError::CouldNotDownload {
                    url: url.to_string(),
                    reason: e.to_string(),
                }),
            },
            None => {
                debug!("No checksum published for {}", url);
                StepOutcome::Completed
            }
        }
    }

    async fn extract(&self, staging: &Staging) -> StepOutcome {
        match self
            .fs
            .extract_archive(&staging.archive, &staging.extracted, staging.kind)
            .await
        {
            Ok(()) => StepOutcome::Completed,
            Err(e @ UseDotNetError::FailedWhileExtractingPackage { .. }) => StepOutcome::Fatal(e),
            Err(e) => StepOutcome::Fatal(UseDotNetError::FailedWhileExtractingPackage {
                archive: staging.archive.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Merges every top-level directory of the archive into the installation root. A
    /// version directory left behind by an earlier interrupted install is cleared first.
    async fn copy_directories(&self, version: &str, staging: &Staging) -> StepOutcome {
        let entries = match list_directory_entries(&staging.extracted) {
            Ok(entries) => entries,
            Err(e) => return StepOutcome::Fatal(e),
        };
        let stale = self.version_path(version);
        if stale.exists() {
            debug!("Removing incomplete install at {}", stale.display());
            if let Err(e) = blocking(move || remove_directory_recursive(&stale)).await {
                return StepOutcome::Fatal(e);
            }
        }
        for entry in entries.iter().filter(|e| e.is_dir) {
            let dest = self.installation_root.join(&entry.name);
            debug!("Copying {} -> {}", entry.path.display(), dest.display());
            if let Err(e) = self.fs.copy_directory(&entry.path, &dest).await {
                error!("Failed to copy {}: {}", entry.path.display(), e);
                return StepOutcome::Fatal(e);
            }
        }
        StepOutcome::Completed
    }

    /// Promotes the archive's top-level files (the `dotnet` launcher, license files) to the
    /// installation root. Runtimes always do; an sdk only when it is the newest installed.
    async fn copy_shared_files(&self, version: &str, staging: &Staging) -> StepOutcome {
        let promote = match self.package_type {
            PackageType::Runtime => true,
            PackageType::Sdk => match self.is_latest_installed_version(version) {
                Ok(latest) => latest,
                Err(e) => return StepOutcome::Recoverable(vec![e]),
            },
        };
        if !promote {
            debug!(
                "A newer {} is installed, keeping the shared files in place",
                self.package_type
            );
            return StepOutcome::Recoverable(Vec::new());
        }

        let entries = match list_directory_entries(&staging.extracted) {
            Ok(entries) => entries,
            Err(e) => return StepOutcome::Recoverable(vec![e]),
        };
        let mut failures = Vec::new();
        for entry in entries.iter().filter(|e| !e.is_dir) {
            let dest = self.installation_root.join(&entry.name);
            if let Err(e) = self.fs.copy_file(&entry.path, &dest).await {
                failures.push(e);
            }
        }
        if failures.is_empty() {
            StepOutcome::Completed
        } else {
            StepOutcome::Recoverable(failures)
        }
    }

    async fn write_markers(&self, info: &VersionInfo) -> StepOutcome {
        let version = info.version().trim();
        let version_path = self.version_path(version);
        if !version_path.is_dir() {
            warn!(
                "Archive did not contain {}, the version will not count as installed",
                version_path.display()
            );
        }
        for (path, marker) in self.markers(info) {
            if let Err(e) = self.fs.write_marker(&path, &marker).await {
                return StepOutcome::Fatal(UseDotNetError::FailedWhileInstallingVersionAtPath {
                    version: version.to_string(),
                    path: version_path,
                    cause: Box::new(e),
                });
            }
            debug!("Wrote completion marker {}", path.display());
        }
        StepOutcome::Completed
    }
}
