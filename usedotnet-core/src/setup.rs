// usedotnet-core/src/setup.rs
//! Resolve-then-install entry points wiring the fetcher and installers together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use usedotnet_common::config::Config;
use usedotnet_common::error::Result;
use usedotnet_common::model::{PackageType, VersionInfo};
use usedotnet_net::{HostPlatformDetector, HttpClient, PlatformDetector, ReqwestHttpClient};

use crate::fetcher::{DotNetCoreVersionFetcher, FetcherOptions};
use crate::global_json::GlobalJsonFetcher;
use crate::installer::{InstallFs, VersionInstaller};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    pub package_type: PackageType,
    pub include_preview_versions: bool,
    /// Restricts resolution to one `major.minor` channel.
    pub channel_version: Option<String>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            package_type: PackageType::Sdk,
            include_preview_versions: false,
            channel_version: None,
        }
    }
}

impl InstallOptions {
    pub fn new(package_type: PackageType) -> Self {
        Self {
            package_type,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version: String,
    pub runtime_version: Option<String>,
    pub package_type: PackageType,
    /// The shared `dotnet` directory.
    pub install_root: PathBuf,
    pub version_path: PathBuf,
    /// True when the version was already installed and nothing was downloaded.
    pub cache_hit: bool,
    pub warnings: Vec<String>,
}

pub struct DotNetSetup {
    config: Config,
    http: Arc<dyn HttpClient>,
    fetcher: Arc<DotNetCoreVersionFetcher>,
    install_fs: Option<Arc<dyn InstallFs>>,
}

impl DotNetSetup {
    pub fn new(
        config: Config,
        http: Arc<dyn HttpClient>,
        platform: Arc<dyn PlatformDetector>,
    ) -> Self {
        let options = FetcherOptions::from_config(&config, http.clone(), platform);
        Self {
            config,
            http,
            fetcher: Arc::new(DotNetCoreVersionFetcher::new(options)),
            install_fs: None,
        }
    }

    /// Uses the `reqwest` client and the host's platform.
    pub fn from_config(config: Config) -> Result<Self> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
        Ok(Self::new(config, http, Arc::new(HostPlatformDetector)))
    }

    pub fn with_install_fs(mut self, fs: Arc<dyn InstallFs>) -> Self {
        self.install_fs = Some(fs);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fetcher(&self) -> &Arc<DotNetCoreVersionFetcher> {
        &self.fetcher
    }

    fn installer(&self, package_type: PackageType) -> Result<VersionInstaller> {
        let installer =
            VersionInstaller::new(package_type, self.config.dotnet_root(), self.http.clone())?
                .with_temp_dir(self.config.temp_dir.clone());
        Ok(match &self.install_fs {
            Some(fs) => installer.with_fs(fs.clone()),
            None => installer,
        })
    }

    /// Resolves `version_spec` and installs it unless it is already in the tool cache.
    pub async fn resolve_and_install(
        &self,
        version_spec: &str,
        options: &InstallOptions,
    ) -> Result<InstalledVersion> {
        info!("Resolving {} {}", options.package_type, version_spec);
        let version_info = self
            .fetcher
            .get_version_info(
                version_spec,
                options.channel_version.as_deref(),
                options.package_type,
                options.include_preview_versions,
            )
            .await?;
        info!(
            "Resolved {} {} to {}",
            options.package_type,
            version_spec,
            version_info.version()
        );
        self.install(&version_info).await
    }

    /// Installs every sdk version pinned by `global.json` files under `working_directory`.
    pub async fn install_from_global_json(
        &self,
        working_directory: &Path,
    ) -> Result<Vec<InstalledVersion>> {
        let versions = GlobalJsonFetcher::new(working_directory, self.fetcher.clone())
            .get_versions()
            .await?;
        let mut installed = Vec::with_capacity(versions.len());
        for version_info in &versions {
            installed.push(self.install(version_info).await?);
        }
        Ok(installed)
    }

    async fn install(&self, version_info: &VersionInfo) -> Result<InstalledVersion> {
        let installer = self.installer(version_info.package_type())?;
        let version = version_info.version();
        let mut installed = InstalledVersion {
            version: version.to_string(),
            runtime_version: version_info.runtime_version().map(str::to_string),
            package_type: version_info.package_type(),
            install_root: installer.installation_root().to_path_buf(),
            version_path: installer.version_path(version),
            cache_hit: false,
            warnings: Vec::new(),
        };

        if installer.is_version_installed(version)? {
            info!(
                "{} {} is already installed at {}",
                installed.package_type,
                version,
                installed.version_path.display()
            );
            installed.cache_hit = true;
            return Ok(installed);
        }

        let url = self.fetcher.get_download_url(version_info).await?;
        debug!("Downloading {} {} from {}", installed.package_type, version, url);
        let outcome = installer.download_and_install(version_info, &url).await?;
        installed.version_path = outcome.version_path;
        installed.warnings = outcome.warnings;
        Ok(installed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;
    use usedotnet_net::{Arch, FixedPlatformDetector, Os, Platform};

    use super::*;
    use crate::test_support::{tar_gz, FakeHttpClient, INDEX_URL};

    const SDK_URL: &str = "https://example.com/dotnet-sdk-2.2.104-linux-x64.tar.gz";
    const RUNTIME_URL: &str = "https://example.com/dotnet-runtime-2.2.2-linux-x64.tar.gz";

    fn feed() -> FakeHttpClient {
        FakeHttpClient::new()
            .with_json(
                INDEX_URL,
                json!({ "releases-index": [
                    { "channel-version": "2.2", "releases.json": "https://example.com/2.2/releases.json" }
                ]}),
            )
            .with_json(
                "https://example.com/2.2/releases.json",
                json!({ "releases": [{
                    "sdk": { "version": "2.2.104", "runtime-version": "2.2.2", "files": [
                        { "name": "dotnet-sdk-linux-x64.tar.gz", "rid": "linux-x64", "url": SDK_URL }
                    ]},
                    "runtime": { "version": "2.2.2", "files": [
                        { "name": "dotnet-runtime-linux-x64.tar.gz", "rid": "linux-x64", "url": RUNTIME_URL }
                    ]}
                }]}),
            )
            .with_file(
                SDK_URL,
                tar_gz(&[
                    ("dotnet", b"launcher"),
                    ("sdk/2.2.104/dotnet.dll", b"sdk"),
                    ("host/fxr/2.2.2/libhostfxr.so", b"fxr"),
                ]),
            )
            .with_file(
                RUNTIME_URL,
                tar_gz(&[("dotnet", b"launcher"), ("host/fxr/2.2.2/libhostfxr.so", b"fxr")]),
            )
    }

    fn setup(root: &TempDir) -> (Arc<FakeHttpClient>, DotNetSetup) {
        let http = Arc::new(feed());
        let mut config = Config::new(root.path().join("tools"));
        config.releases_index_url = INDEX_URL.to_string();
        config.temp_dir = root.path().join("tmp");
        let platform = Arc::new(FixedPlatformDetector(Platform::new(Os::Linux, Arch::X64)));
        (http.clone(), DotNetSetup::new(config, http, platform))
    }

    #[tokio::test]
    async fn second_install_is_served_from_the_cache() {
        let root = TempDir::new().unwrap();
        let (http, setup) = setup(&root);

        let first = setup.resolve_and_install("2.2.x", &InstallOptions::default()).await.unwrap();
        assert_eq!(first.version, "2.2.104");
        assert_eq!(first.runtime_version.as_deref(), Some("2.2.2"));
        assert!(!first.cache_hit);
        assert_eq!(first.version_path, root.path().join("tools/dotnet/sdk/2.2.104"));

        let second = setup.resolve_and_install("2.2.104", &InstallOptions::default()).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(http.requests_to(SDK_URL), 1);
    }

    #[tokio::test]
    async fn runtime_of_an_installed_sdk_counts_as_installed() {
        let root = TempDir::new().unwrap();
        let (http, setup) = setup(&root);

        setup.resolve_and_install("2.2.104", &InstallOptions::default()).await.unwrap();
        let runtime = setup
            .resolve_and_install("2.2.x", &InstallOptions::new(PackageType::Runtime))
            .await
            .unwrap();

        assert_eq!(runtime.version, "2.2.2");
        assert!(runtime.cache_hit);
        assert_eq!(http.requests_to(RUNTIME_URL), 0);
    }

    #[tokio::test]
    async fn global_json_versions_are_installed() {
        let root = TempDir::new().unwrap();
        let (_, setup) = setup(&root);
        let project = root.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("global.json"), r#"{ "sdk": { "version": "2.2.104" } }"#).unwrap();

        let installed = setup.install_from_global_json(&project).await.unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].version, "2.2.104");
        assert!(setup.config().sdk_dir().join("2.2.104.complete").is_file());
    }
}
