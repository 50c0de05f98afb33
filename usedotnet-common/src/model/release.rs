// usedotnet-common/src/model/release.rs
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::PackageType;
use crate::error::SchemaError;

/// A downloadable artifact of a release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEntry {
    pub name: String,
    /// Runtime identifier, e.g. `win-x64` or `linux-musl-arm64`.
    pub rid: String,
    pub url: String,
    /// SHA-512 hex digest as published by the release feed.
    pub hash: Option<String>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, rid: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rid: rid.into(),
            url: url.into(),
            hash: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFile {
    pub name: Option<String>,
    pub rid: Option<String>,
    pub url: Option<String>,
    pub hash: Option<String>,
}

impl TryFrom<RawFile> for FileEntry {
    type Error = SchemaError;

    fn try_from(raw: RawFile) -> Result<Self, Self::Error> {
        let name = non_empty(raw.name).ok_or(SchemaError::MissingField("name"))?;
        let rid = non_empty(raw.rid).ok_or(SchemaError::MissingField("rid"))?;
        let url = non_empty(raw.url).ok_or(SchemaError::MissingField("url"))?;
        Ok(Self {
            name,
            rid,
            url,
            hash: non_empty(raw.hash),
        })
    }
}

/// An `sdk`, `sdks[]` or `runtime` object of a release.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVersionEntry {
    pub version: Option<String>,
    #[serde(rename = "runtime-version")]
    pub runtime_version: Option<String>,
    pub files: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRelease {
    pub sdk: Option<RawVersionEntry>,
    #[serde(default)]
    pub sdks: Vec<RawVersionEntry>,
    pub runtime: Option<RawVersionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReleases {
    Envelope { releases: Vec<Value> },
    Bare(Vec<Value>),
}

pub type ParsedRelease = std::result::Result<RawRelease, SchemaError>;

/// Resolved metadata for one sdk or runtime version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionInfo {
    version: String,
    runtime_version: Option<String>,
    package_type: PackageType,
    files: Vec<FileEntry>,
}

impl VersionInfo {
    /// Builds a version record. A runtime is its own runtime version; an sdk's runtime
    /// version is unknown until set with [`VersionInfo::with_runtime_version`].
    pub fn new(version: impl Into<String>, package_type: PackageType, files: Vec<FileEntry>) -> Self {
        let version = version.into();
        let runtime_version = match package_type {
            PackageType::Runtime => Some(version.clone()),
            PackageType::Sdk => None,
        };
        Self {
            version,
            runtime_version,
            package_type,
            files,
        }
    }

    pub fn with_runtime_version(mut self, runtime_version: impl Into<String>) -> Self {
        let runtime_version = runtime_version.into();
        if self.package_type == PackageType::Sdk && !runtime_version.trim().is_empty() {
            self.runtime_version = Some(runtime_version);
        }
        self
    }

    /// Validates one sdk/runtime object. `release_runtime` is the release's own runtime
    /// version, used when an sdk object does not name its runtime.
    pub fn from_raw(
        raw: &RawVersionEntry,
        package_type: PackageType,
        release_runtime: Option<&str>,
    ) -> Result<Self, SchemaError> {
        let version = non_empty(raw.version.clone()).ok_or(SchemaError::MissingField("version"))?;
        let raw_files = raw.files.as_ref().ok_or(SchemaError::MissingField("files"))?;

        let mut files = Vec::with_capacity(raw_files.len());
        for value in raw_files {
            let parsed = serde_json::from_value::<RawFile>(value.clone())
                .map_err(|e| SchemaError::UnexpectedShape(format!("file entry: {e}")))
                .and_then(FileEntry::try_from);
            match parsed {
                Ok(file) => files.push(file),
                Err(e) => debug!("Skipping file entry of {} {}: {}", package_type, version, e),
            }
        }

        let info = Self::new(version, package_type, files);
        let runtime = non_empty(raw.runtime_version.clone())
            .or_else(|| release_runtime.map(str::to_string));
        Ok(match runtime {
            Some(runtime) => info.with_runtime_version(runtime),
            None => info,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn runtime_version(&self) -> Option<&str> {
        self.runtime_version.as_deref()
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// The file entry a download URL was taken from.
    pub fn file_for_url(&self, url: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.url == url)
    }
}

impl RawRelease {
    /// Candidate versions of `package_type` this release offers, in feed order. For sdks the
    /// entries of `sdks[]` come first, then `sdk`; a version listed twice is kept once.
    pub fn version_infos(&self, package_type: PackageType) -> Vec<Result<VersionInfo, SchemaError>> {
        let release_runtime = self
            .runtime
            .as_ref()
            .and_then(|r| r.version.as_deref())
            .filter(|v| !v.trim().is_empty());

        let raw_entries: Vec<&RawVersionEntry> = match package_type {
            PackageType::Sdk => self.sdks.iter().chain(self.sdk.iter()).collect(),
            PackageType::Runtime => self.runtime.iter().collect(),
        };

        let mut seen: Vec<&str> = Vec::new();
        let mut infos = Vec::new();
        for raw in raw_entries {
            if let Some(version) = raw.version.as_deref() {
                if seen.contains(&version) {
                    continue;
                }
                seen.push(version);
            }
            infos.push(VersionInfo::from_raw(raw, package_type, release_runtime));
        }
        infos
    }
}

/// Splits a channel's releases document into per-release parse results.
pub fn parse_releases_document(document: Value) -> Result<Vec<ParsedRelease>, SchemaError> {
    let entries = match serde_json::from_value::<RawReleases>(document) {
        Ok(RawReleases::Envelope { releases }) => releases,
        Ok(RawReleases::Bare(entries)) => entries,
        Err(e) => {
            return Err(SchemaError::UnexpectedShape(format!(
                "releases document is neither an array nor a 'releases' object: {e}"
            )))
        }
    };

    Ok(entries
        .into_iter()
        .map(|entry| {
            serde_json::from_value::<RawRelease>(entry)
                .map_err(|e| SchemaError::UnexpectedShape(format!("release entry: {e}")))
        })
        .collect())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
