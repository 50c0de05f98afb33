// usedotnet-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use super::error::{Result, UseDotNetError};
use super::model::PackageType;

pub const DEFAULT_RELEASES_INDEX_URL: &str =
    "https://dotnetcli.blob.core.windows.net/dotnet/release-metadata/releases-index.json";
const DOTNET_DIR_NAME: &str = "dotnet";

/// What to do when previews were not requested but a spec only matches previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewPolicy {
    /// Return the highest preview when no stable candidate exists at all.
    #[default]
    FallbackToPreview,
    /// Never return a preview unless previews were requested.
    Strict,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tools_root: PathBuf,
    pub releases_index_url: String,
    pub temp_dir: PathBuf,
    pub preview_policy: PreviewPolicy,
}

impl Config {
    /// Defaults rooted at `tools_root`, without consulting the environment.
    pub fn new(tools_root: impl Into<PathBuf>) -> Self {
        Self {
            tools_root: tools_root.into(),
            releases_index_url: DEFAULT_RELEASES_INDEX_URL.to_string(),
            temp_dir: env::temp_dir(),
            preview_policy: PreviewPolicy::default(),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_with(|key| env::var(key).ok())
    }

    /// Same as [`Config::load`] with a caller supplied variable lookup.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        debug!("Loading usedotnet configuration");
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tools_root = match var("USEDOTNET_TOOLS_ROOT").or_else(|| var("AGENT_TOOLSDIRECTORY")) {
            Some(root) => PathBuf::from(root),
            None => {
                let dirs = ProjectDirs::from("", "", "usedotnet").ok_or_else(|| {
                    UseDotNetError::Config(
                        "Could not determine a tools directory; set USEDOTNET_TOOLS_ROOT".to_string(),
                    )
                })?;
                debug!("No tools root in the environment, using the local data directory");
                dirs.data_local_dir().to_path_buf()
            }
        };
        debug!("Effective tools root set to: {}", tools_root.display());

        let mut config = Self::new(tools_root);
        if let Some(url) = var("USEDOTNET_RELEASES_INDEX_URL") {
            config.releases_index_url = url;
        }
        if let Some(temp) = var("USEDOTNET_TEMP_DIR").or_else(|| var("AGENT_TEMPDIRECTORY")) {
            config.temp_dir = PathBuf::from(temp);
        }
        if var("USEDOTNET_STRICT_PREVIEW").as_deref() == Some("1") {
            config.preview_policy = PreviewPolicy::Strict;
        }

        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    pub fn tools_root(&self) -> &Path {
        &self.tools_root
    }

    /// `<toolsRoot>/dotnet`, the shared root holding the `dotnet` launcher.
    pub fn dotnet_root(&self) -> PathBuf {
        self.tools_root.join(DOTNET_DIR_NAME)
    }

    pub fn sdk_dir(&self) -> PathBuf {
        self.package_dir(PackageType::Sdk)
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.package_dir(PackageType::Runtime)
    }

    pub fn package_dir(&self, package_type: PackageType) -> PathBuf {
        self.dotnet_root().join(package_type.relative_dir())
    }
}
