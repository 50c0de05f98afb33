// usedotnet-common/src/model/version.rs
//! Parsed forms of the version strings users and the release feed hand us.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::error::{Result, UseDotNetError};

/// Parses an explicit `major.minor.patch[-pre][+build]` version.
///
/// Leading/trailing whitespace is ignored; anything else that is not valid semver
/// (missing segments, wildcards, leading zeros) is rejected.
pub fn parse_explicit(version: &str) -> Option<Version> {
    let trimmed = version.trim();
    if trimmed.is_empty() {
        return None;
    }
    Version::parse(trimmed).ok()
}

/// Major, minor and patch numbers of an explicit version. The pre-release suffix is
/// dropped; use [`Version`] when it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionParts {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionParts {
    pub fn new(version: &str) -> Result<Self> {
        let parsed = parse_explicit(version).ok_or_else(|| {
            UseDotNetError::InvalidArgument(format!(
                "Version '{version}' is not allowed: an explicit major.minor.patch version is required"
            ))
        })?;
        Ok(Self {
            major: parsed.major,
            minor: parsed.minor,
            patch: parsed.patch,
        })
    }

    /// The `major.minor` channel this version would be published under.
    pub fn channel_version(&self) -> ChannelVersion {
        ChannelVersion {
            major: self.major,
            minor: self.minor,
        }
    }
}

impl FromStr for VersionParts {
    type Err = UseDotNetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for VersionParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A release channel identifier such as `2.2` or `8.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelVersion {
    pub major: u64,
    pub minor: u64,
}

impl ChannelVersion {
    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }
}

impl FromStr for ChannelVersion {
    type Err = UseDotNetError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            UseDotNetError::InvalidArgument(format!(
                "Channel version '{s}' is not a numeric major.minor value"
            ))
        };
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        if minor.contains('.') {
            return Err(invalid());
        }
        Ok(Self {
            major: parse_segment(major).ok_or_else(invalid)?,
            minor: parse_segment(minor).ok_or_else(invalid)?,
        })
    }
}

impl PartialOrd for ChannelVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChannelVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
    }
}

impl fmt::Display for ChannelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A user supplied version specification.
///
/// Accepted shapes are one to three dot separated segments where each segment is a
/// number or the wildcard `x`, and no number follows a wildcard:
/// `8`, `8.x`, `8.x.x`, `8.0`, `8.0.x` and explicit versions such as `8.0.100` or
/// `9.0.100-preview.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Major(u64),
    MajorMinor(u64, u64),
    Exact(Version),
}

impl VersionSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(UseDotNetError::InvalidArgument(
                "Version spec must not be empty".to_string(),
            ));
        }

        if let Some(version) = parse_explicit(trimmed) {
            return Ok(Self::Exact(version));
        }

        let not_allowed = || {
            UseDotNetError::InvalidArgument(format!(
                "Version spec '{spec}' is not allowed. Use major.x, major.minor.x or major.minor.patch"
            ))
        };

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > 3 {
            return Err(not_allowed());
        }

        let mut numbers = Vec::with_capacity(parts.len());
        let mut seen_wildcard = false;
        for part in &parts {
            if is_wildcard(part) {
                seen_wildcard = true;
                continue;
            }
            if seen_wildcard {
                return Err(not_allowed());
            }
            numbers.push(parse_segment(part).ok_or_else(not_allowed)?);
        }

        match numbers.as_slice() {
            [major] => Ok(Self::Major(*major)),
            [major, minor] => Ok(Self::MajorMinor(*major, *minor)),
            // Three numeric segments that failed semver parsing (e.g. leading zeros).
            _ => Err(not_allowed()),
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    pub fn major(&self) -> u64 {
        match self {
            Self::Major(major) | Self::MajorMinor(major, _) => *major,
            Self::Exact(version) => version.major,
        }
    }

    /// The single channel this spec pins, if it pins one.
    pub fn channel_version(&self) -> Option<ChannelVersion> {
        match self {
            Self::Major(_) => None,
            Self::MajorMinor(major, minor) => Some(ChannelVersion::new(*major, *minor)),
            Self::Exact(version) => Some(ChannelVersion::new(version.major, version.minor)),
        }
    }

    /// Whether `version` satisfies the fixed segments of this spec. Pre-release filtering is
    /// left to the caller; an exact spec only matches the identical version.
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Major(major) => version.major == *major,
            Self::MajorMinor(major, minor) => version.major == *major && version.minor == *minor,
            Self::Exact(expected) => version == expected,
        }
    }
}

impl FromStr for VersionSpec {
    type Err = UseDotNetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major(major) => write!(f, "{major}.x"),
            Self::MajorMinor(major, minor) => write!(f, "{major}.{minor}.x"),
            Self::Exact(version) => write!(f, "{version}"),
        }
    }
}

fn is_wildcard(segment: &str) -> bool {
    segment.eq_ignore_ascii_case("x")
}

fn parse_segment(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}
