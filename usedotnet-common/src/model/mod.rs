// usedotnet-common/src/model/mod.rs
// Value types for release-feed documents and version specs.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UseDotNetError;

pub mod channel;
pub mod release;
pub mod version;

// Re-export
pub use channel::{parse_releases_index, Channel, ParsedChannel, RawChannel};
pub use release::{
    parse_releases_document, FileEntry, ParsedRelease, RawRelease, RawVersionEntry, VersionInfo,
};
pub use version::{parse_explicit, ChannelVersion, VersionParts, VersionSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Sdk,
    Runtime,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sdk => "sdk",
            Self::Runtime => "runtime",
        }
    }

    /// Directory under the dotnet root holding versions of this package type. Runtime
    /// archives lay their host resolver out under `host/fxr/<version>`, so that is where
    /// runtime versions are tracked.
    pub fn relative_dir(&self) -> &'static str {
        match self {
            Self::Sdk => "sdk",
            Self::Runtime => "host/fxr",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageType {
    type Err = UseDotNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sdk" => Ok(Self::Sdk),
            "runtime" => Ok(Self::Runtime),
            other => Err(UseDotNetError::InvalidArgument(format!(
                "Unknown package type '{other}', expected 'sdk' or 'runtime'"
            ))),
        }
    }
}
