use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::model::PackageType;

/// Problems found while validating a release-feed document against the shape we expect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("required field '{0}' is missing or empty")]
    MissingField(&'static str),

    #[error("field '{field}' holds an invalid URL '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("'{0}' is not a numeric major.minor channel version")]
    InvalidChannelVersion(String),

    #[error("unexpected document shape: {0}")]
    UnexpectedShape(String),
}

#[derive(Error, Debug, Clone)]
pub enum UseDotNetError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Semantic Versioning Error: {0}")]
    SemVer(#[from] Arc<semver::Error>),

    #[error("Schema Error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("HttpError: {0}")]
    HttpError(String),

    #[error("Explicit version required, got '{0}'")]
    ExplicitVersionRequired(String),

    #[error("Failed to download or read the releases index from '{url}': {reason}")]
    ReleasesIndex { url: String, reason: String },

    #[error("No {package_type} version matching '{version_spec}' was found in the inspected channels")]
    MatchingVersionNotFound {
        package_type: PackageType,
        version_spec: String,
    },

    #[error("Version {version_spec} of {package_type} cannot be found: {cause}")]
    VersionNotFound {
        package_type: PackageType,
        version_spec: String,
        #[source]
        cause: Box<UseDotNetError>,
    },

    #[error("Failed to detect the machine platform: {0}")]
    GetMachinePlatformFailed(String),

    #[error(
        "Download URL for {package_type} {version} not found for rids [{}] with extension '{extension}'",
        .rids.join(", ")
    )]
    DownloadUrlForMatchingOsNotFound {
        package_type: PackageType,
        version: String,
        rids: Vec<String>,
        extension: String,
    },

    #[error("Version '{version}' cannot be downloaded from URL '{url}'")]
    VersionCanNotBeDownloadedFromUrl { version: String, url: String },

    #[error("Could not download from '{url}': {reason}")]
    CouldNotDownload { url: String, reason: String },

    #[error("Failed while extracting package {}: {reason}", .archive.display())]
    FailedWhileExtractingPackage { archive: PathBuf, reason: String },

    #[error("Failed to copy {} to {}: {reason}", .src.display(), .dest.display())]
    FailedToCopy {
        src: PathBuf,
        dest: PathBuf,
        reason: String,
    },

    #[error("Failed while installing version {version} at {}: {cause}", .path.display())]
    FailedWhileInstallingVersionAtPath {
        version: String,
        path: PathBuf,
        #[source]
        cause: Box<UseDotNetError>,
    },

    #[error("Unable to access path {}: {reason}", .path.display())]
    UnableToAccessPath { path: PathBuf, reason: String },

    #[error("No global.json found under {}", .0.display())]
    FailedToFindGlobalJson(PathBuf),

    #[error("Failed to read global.json at {}: {reason}", .path.display())]
    FailedToReadGlobalJson { path: PathBuf, reason: String },

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("IoError: {0}")]
    IoError(String),
}

impl From<std::io::Error> for UseDotNetError {
    fn from(err: std::io::Error) -> Self {
        UseDotNetError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for UseDotNetError {
    fn from(err: reqwest::Error) -> Self {
        UseDotNetError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for UseDotNetError {
    fn from(err: serde_json::Error) -> Self {
        UseDotNetError::Json(Arc::new(err))
    }
}

impl From<semver::Error> for UseDotNetError {
    fn from(err: semver::Error) -> Self {
        UseDotNetError::SemVer(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, UseDotNetError>;
