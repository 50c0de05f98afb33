// usedotnet-core/src/lib.rs
//! Resolution of .NET SDK/runtime version specs against the release feed, and
//! installation into a shared tool cache.

pub mod fetcher;
pub mod global_json;
pub mod installer;
pub mod setup;
pub mod version_utils;

#[cfg(test)]
mod test_support;

pub use fetcher::{DotNetCoreVersionFetcher, FetcherOptions};
pub use global_json::{GlobalJsonFetcher, RollForward, SdkDeclaration};
pub use installer::{
    CompletionMarker, InstallFs, InstallOutcome, InstallState, LocalFs, StepOutcome,
    VersionInstaller,
};
pub use setup::{DotNetSetup, InstallOptions, InstalledVersion};
pub use usedotnet_common::{Config, PackageType, PreviewPolicy, Result, UseDotNetError, VersionInfo};
pub use version_utils::{
    compare_channel_versions, compare_versions, get_matching_version_from_list, is_explicit_version,
};
