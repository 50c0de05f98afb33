// usedotnet-core/src/version_utils.rs
//! Comparisons and best-match selection over release-feed versions.

use std::cmp::Ordering;

use semver::Version;
use tracing::debug;
use usedotnet_common::error::{Result, UseDotNetError};
use usedotnet_common::model::{parse_explicit, ChannelVersion, VersionInfo, VersionSpec};
use usedotnet_common::PreviewPolicy;

/// True for `major.minor.patch` with an optional pre-release or build suffix.
pub fn is_explicit_version(spec: &str) -> bool {
    parse_explicit(spec).is_some()
}

fn explicit_or_invalid(version: &str) -> Result<Version> {
    parse_explicit(version).ok_or_else(|| {
        UseDotNetError::InvalidArgument(format!(
            "'{version}' is not an explicit major.minor.patch version"
        ))
    })
}

/// Orders two explicit versions. Major, minor and patch decide first; the pre-release
/// label only breaks ties, and a release sorts above its previews.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    let a = explicit_or_invalid(a)?;
    let b = explicit_or_invalid(b)?;
    Ok(a.cmp(&b))
}

/// Orders two `major.minor` channel versions.
pub fn compare_channel_versions(a: &str, b: &str) -> Result<Ordering> {
    let a: ChannelVersion = a.parse()?;
    let b: ChannelVersion = b.parse()?;
    Ok(a.cmp(&b))
}

/// Picks the highest version in `candidates` that satisfies `spec`.
///
/// Previews are skipped unless `include_preview` is set or the spec itself names a preview.
/// When every match is a preview, `PreviewPolicy::FallbackToPreview` still returns the
/// highest one. Entries whose version is empty or not explicit are ignored.
pub fn get_matching_version_from_list(
    spec: &VersionSpec,
    candidates: &[VersionInfo],
    include_preview: bool,
    policy: PreviewPolicy,
) -> Option<VersionInfo> {
    let include_preview = include_preview
        || matches!(spec, VersionSpec::Exact(version) if !version.pre.is_empty());

    let matching: Vec<(Version, &VersionInfo)> = candidates
        .iter()
        .filter_map(|info| parse_explicit(info.version()).map(|v| (v, info)))
        .filter(|(version, _)| spec.matches(version))
        .collect();
    if matching.is_empty() {
        debug!("No candidate matches {}", spec);
        return None;
    }

    let best = |allow_preview: bool| {
        matching
            .iter()
            .filter(|(version, _)| allow_preview || version.pre.is_empty())
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, info)| (*info).clone())
    };

    if include_preview {
        return best(true);
    }
    best(false).or_else(|| match policy {
        PreviewPolicy::FallbackToPreview => {
            debug!("Only previews match {}, falling back to the highest preview", spec);
            best(true)
        }
        PreviewPolicy::Strict => None,
    })
}
