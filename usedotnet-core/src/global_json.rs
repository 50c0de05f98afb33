// usedotnet-core/src/global_json.rs
//! Discovers SDK versions pinned by `global.json` files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use usedotnet_common::error::{Result, UseDotNetError};
use usedotnet_common::model::{PackageType, VersionInfo};
use walkdir::WalkDir;

use crate::fetcher::DotNetCoreVersionFetcher;

pub const GLOBAL_JSON_FILE_NAME: &str = "global.json";

/// `sdk.rollForward` keywords understood by the .NET host. Matched case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollForward {
    Patch,
    Feature,
    Minor,
    Major,
    LatestPatch,
    LatestFeature,
    LatestMinor,
    LatestMajor,
    Disable,
}

impl RollForward {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Feature => "feature",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::LatestPatch => "latestPatch",
            Self::LatestFeature => "latestFeature",
            Self::LatestMinor => "latestMinor",
            Self::LatestMajor => "latestMajor",
            Self::Disable => "disable",
        }
    }
}

impl fmt::Display for RollForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollForward {
    type Err = UseDotNetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "patch" => Ok(Self::Patch),
            "feature" => Ok(Self::Feature),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            "latestPatch" => Ok(Self::LatestPatch),
            "latestFeature" => Ok(Self::LatestFeature),
            "latestMinor" => Ok(Self::LatestMinor),
            "latestMajor" => Ok(Self::LatestMajor),
            "disable" => Ok(Self::Disable),
            other => Err(UseDotNetError::InvalidArgument(format!(
                "'{other}' is not a recognized rollForward value"
            ))),
        }
    }
}

/// The `sdk` section of one `global.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkDeclaration {
    pub path: PathBuf,
    pub version: String,
    pub allow_prerelease: bool,
    pub roll_forward: Option<RollForward>,
}

#[derive(Debug, Deserialize)]
struct GlobalJson {
    #[serde(default)]
    sdk: Option<SdkSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SdkSection {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    allow_prerelease: Option<bool>,
    #[serde(default)]
    roll_forward: Option<String>,
}

fn jsonc_to_serde(value: jsonc_parser::JsonValue) -> Value {
    match value {
        jsonc_parser::JsonValue::Null => Value::Null,
        jsonc_parser::JsonValue::Boolean(b) => Value::Bool(b),
        jsonc_parser::JsonValue::Number(n) => {
            if let Ok(i) = n.parse::<i64>() {
                Value::Number(i.into())
            } else if let Ok(f) = n.parse::<f64>() {
                serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
            } else {
                Value::Null
            }
        }
        jsonc_parser::JsonValue::String(s) => Value::String(s.to_string()),
        jsonc_parser::JsonValue::Array(arr) => {
            Value::Array(arr.into_iter().map(jsonc_to_serde).collect())
        }
        jsonc_parser::JsonValue::Object(obj) => {
            let mut map = serde_json::Map::new();
            for (key, value) in obj {
                map.insert(key, jsonc_to_serde(value));
            }
            Value::Object(map)
        }
    }
}

/// Every file named `global.json` below `working_directory`, sorted by path.
pub fn find_global_json_files(working_directory: &Path) -> Result<Vec<PathBuf>> {
    if !working_directory.is_dir() {
        return Err(UseDotNetError::UnableToAccessPath {
            path: working_directory.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    let mut files: Vec<PathBuf> = WalkDir::new(working_directory)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable path while searching for global.json: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == GLOBAL_JSON_FILE_NAME)
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(UseDotNetError::FailedToFindGlobalJson(
            working_directory.to_path_buf(),
        ));
    }
    debug!(
        "Found {} global.json file(s) under {}",
        files.len(),
        working_directory.display()
    );
    Ok(files)
}

/// Reads the sdk declaration of one `global.json`.
///
/// `Ok(None)` means the file declares nothing: it is empty, has no `sdk` section or no
/// `sdk.version`.
pub fn read_declaration(path: &Path) -> Result<Option<SdkDeclaration>> {
    let unreadable = |reason: String| UseDotNetError::FailedToReadGlobalJson {
        path: path.to_path_buf(),
        reason,
    };
    let contents = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    if contents.trim().is_empty() {
        debug!("{} is empty", path.display());
        return Ok(None);
    }

    let parsed = jsonc_parser::parse_to_value(&contents, &jsonc_parser::ParseOptions::default())
        .map_err(|e| unreadable(e.to_string()))?;
    let Some(parsed) = parsed else {
        return Ok(None);
    };
    let document: GlobalJson =
        serde_json::from_value(jsonc_to_serde(parsed)).map_err(|e| unreadable(e.to_string()))?;

    let Some(sdk) = document.sdk else {
        debug!("{} has no sdk section", path.display());
        return Ok(None);
    };
    let Some(version) = sdk.version.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    else {
        debug!("{} has no sdk.version", path.display());
        return Ok(None);
    };
    let roll_forward = sdk
        .roll_forward
        .as_deref()
        .map(RollForward::from_str)
        .transpose()
        .map_err(|e| unreadable(e.to_string()))?;

    Ok(Some(SdkDeclaration {
        path: path.to_path_buf(),
        version,
        allow_prerelease: sdk.allow_prerelease.unwrap_or(false),
        roll_forward,
    }))
}

/// Collects the declarations of every `global.json` below `working_directory`. Files that
/// cannot be read or parsed are skipped with a warning.
pub fn scan_declarations(working_directory: &Path) -> Result<Vec<SdkDeclaration>> {
    let mut declarations = Vec::new();
    for path in find_global_json_files(working_directory)? {
        match read_declaration(&path) {
            Ok(Some(declaration)) => {
                debug!(
                    "{} pins sdk {} (allowPrerelease: {}, rollForward: {})",
                    path.display(),
                    declaration.version,
                    declaration.allow_prerelease,
                    declaration
                        .roll_forward
                        .map(|r| r.as_str())
                        .unwrap_or("unset")
                );
                declarations.push(declaration);
            }
            Ok(None) => debug!("Skipping {}: no sdk version declared", path.display()),
            Err(e) => warn!("Skipping {}", e),
        }
    }
    Ok(declarations)
}

/// Resolves the SDK versions pinned in a source tree.
pub struct GlobalJsonFetcher {
    working_directory: PathBuf,
    fetcher: Arc<DotNetCoreVersionFetcher>,
}

impl GlobalJsonFetcher {
    pub fn new(working_directory: impl Into<PathBuf>, fetcher: Arc<DotNetCoreVersionFetcher>) -> Self {
        Self {
            working_directory: working_directory.into(),
            fetcher,
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Resolves every declared sdk version through the release feed, dropping duplicates.
    pub async fn get_versions(&self) -> Result<Vec<VersionInfo>> {
        let dir = self.working_directory.clone();
        let declarations = tokio::task::spawn_blocking(move || scan_declarations(&dir))
            .await
            .map_err(|e| UseDotNetError::IoError(format!("JoinError in global.json scan: {e}")))??;
        info!(
            "{} sdk declaration(s) found under {}",
            declarations.len(),
            self.working_directory.display()
        );

        let mut versions: Vec<VersionInfo> = Vec::new();
        for declaration in &declarations {
            let info = self
                .fetcher
                .get_version_info(
                    &declaration.version,
                    None,
                    PackageType::Sdk,
                    declaration.allow_prerelease,
                )
                .await?;
            if versions.iter().any(|v| v.version() == info.version()) {
                debug!("{} already resolved, skipping duplicate", info.version());
                continue;
            }
            versions.push(info);
        }
        Ok(versions)
    }
}
