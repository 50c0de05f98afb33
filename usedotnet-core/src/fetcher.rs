// usedotnet-core/src/fetcher.rs
//! Resolves a version spec against the .NET release feed.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use usedotnet_common::config::{Config, DEFAULT_RELEASES_INDEX_URL};
use usedotnet_common::error::{Result, UseDotNetError};
use usedotnet_common::model::{
    parse_releases_document, parse_releases_index, Channel, ChannelVersion, FileEntry,
    PackageType, VersionInfo, VersionSpec,
};
use usedotnet_common::PreviewPolicy;
use usedotnet_net::{HttpClient, PlatformDetector};

use crate::version_utils::get_matching_version_from_list;

/// Collaborators and settings for [`DotNetCoreVersionFetcher`].
#[derive(Clone)]
pub struct FetcherOptions {
    pub index_url: String,
    pub http: Arc<dyn HttpClient>,
    pub platform: Arc<dyn PlatformDetector>,
    pub preview_policy: PreviewPolicy,
}

impl FetcherOptions {
    pub fn new(http: Arc<dyn HttpClient>, platform: Arc<dyn PlatformDetector>) -> Self {
        Self {
            index_url: DEFAULT_RELEASES_INDEX_URL.to_string(),
            http,
            platform,
            preview_policy: PreviewPolicy::default(),
        }
    }

    pub fn from_config(
        config: &Config,
        http: Arc<dyn HttpClient>,
        platform: Arc<dyn PlatformDetector>,
    ) -> Self {
        Self {
            index_url: config.releases_index_url.clone(),
            http,
            platform,
            preview_policy: config.preview_policy,
        }
    }
}

pub struct DotNetCoreVersionFetcher {
    options: FetcherOptions,
    channels: OnceCell<Vec<Channel>>,
}

impl DotNetCoreVersionFetcher {
    pub fn new(options: FetcherOptions) -> Self {
        Self {
            options,
            channels: OnceCell::new(),
        }
    }

    /// Resolves `version_spec` to a concrete version of `package_type`.
    ///
    /// `channel_version_spec`, when given, restricts the search to that `major.minor`
    /// channel.
    pub async fn get_version_info(
        &self,
        version_spec: &str,
        channel_version_spec: Option<&str>,
        package_type: PackageType,
        include_preview_versions: bool,
    ) -> Result<VersionInfo> {
        let spec = VersionSpec::parse(version_spec)?;
        let restriction = channel_version_spec
            .filter(|c| !c.trim().is_empty())
            .map(str::parse::<ChannelVersion>)
            .transpose()?;

        let channels = self.channels().await?;
        let not_found = |cause: UseDotNetError| UseDotNetError::VersionNotFound {
            package_type,
            version_spec: version_spec.to_string(),
            cause: Box::new(cause),
        };
        let no_match = || UseDotNetError::MatchingVersionNotFound {
            package_type,
            version_spec: version_spec.to_string(),
        };

        let mut candidates_in_scope: Vec<&Channel> = channels
            .iter()
            .filter(|c| restriction.map_or(true, |r| c.channel_version == r))
            .collect();
        candidates_in_scope.sort_by(|a, b| b.channel_version.cmp(&a.channel_version));

        let found = match &spec {
            VersionSpec::Exact(_) => {
                self.find_explicit(&spec, &candidates_in_scope, package_type)
                    .await?
            }
            VersionSpec::MajorMinor(major, minor) => {
                let wanted = ChannelVersion::new(*major, *minor);
                let selected: Vec<&Channel> = candidates_in_scope
                    .into_iter()
                    .filter(|c| c.channel_version == wanted)
                    .collect();
                self.find_in_channels(&spec, &selected, package_type, include_preview_versions)
                    .await?
            }
            VersionSpec::Major(major) => {
                let same_major: Vec<&Channel> = candidates_in_scope
                    .into_iter()
                    .filter(|c| c.channel_version.major == *major)
                    .collect();
                let selected = self.select_major_channels(same_major, include_preview_versions);
                self.find_in_channels(&spec, &selected, package_type, include_preview_versions)
                    .await?
            }
        };

        match found {
            Some(info) => {
                info!("Resolved {} {} to {}", package_type, version_spec, info.version());
                Ok(info)
            }
            None => Err(not_found(no_match())),
        }
    }

    /// Channels to inspect for a `major.x` spec. Preview-phase channels only count when
    /// previews were requested, or when the policy allows falling back to them because
    /// the major has nothing else.
    fn select_major_channels<'a>(
        &self,
        same_major: Vec<&'a Channel>,
        include_preview_versions: bool,
    ) -> Vec<&'a Channel> {
        if include_preview_versions {
            return same_major;
        }
        let (preview, supported): (Vec<&Channel>, Vec<&Channel>) =
            same_major.into_iter().partition(|c| c.is_preview());
        if !supported.is_empty() {
            return supported;
        }
        match self.options.preview_policy {
            PreviewPolicy::FallbackToPreview => preview,
            PreviewPolicy::Strict => Vec::new(),
        }
    }

    /// Looks in the version's own `major.minor` channel first, then in the other channels
    /// of the same major, newest first. Channels of other majors are never searched, so a
    /// version listed only under a different major is reported as not found.
    async fn find_explicit(
        &self,
        spec: &VersionSpec,
        channels: &[&Channel],
        package_type: PackageType,
    ) -> Result<Option<VersionInfo>> {
        let Some(own) = spec.channel_version() else {
            return Ok(None);
        };
        let (primary, others): (Vec<&Channel>, Vec<&Channel>) = channels
            .iter()
            .copied()
            .filter(|c| c.channel_version.major == own.major)
            .partition(|c| c.channel_version == own);

        if let Some(info) = self
            .find_in_channels(spec, &primary, package_type, true)
            .await?
        {
            return Ok(Some(info));
        }
        for channel in others {
            debug!(
                "{} not found in channel {}, trying channel {}",
                spec, own, channel.channel_version
            );
            if let Some(info) = self
                .find_in_channels(spec, &[channel], package_type, true)
                .await?
            {
                return Ok(Some(info));
            }
        }
        Ok(None)
    }

    /// Fetches every selected channel's releases, then picks the best match across all of
    /// them.
    async fn find_in_channels(
        &self,
        spec: &VersionSpec,
        channels: &[&Channel],
        package_type: PackageType,
        include_preview_versions: bool,
    ) -> Result<Option<VersionInfo>> {
        if channels.is_empty() {
            debug!("No channel selected for {}", spec);
            return Ok(None);
        }
        let per_channel =
            try_join_all(channels.iter().map(|c| self.channel_candidates(c, package_type))).await?;

        let mut candidates: Vec<VersionInfo> = Vec::new();
        for info in per_channel.into_iter().flatten() {
            if !candidates.iter().any(|c| c.version() == info.version()) {
                candidates.push(info);
            }
        }
        debug!(
            "{} candidate {} versions for {} across {} channel(s)",
            candidates.len(),
            package_type,
            spec,
            channels.len()
        );
        Ok(get_matching_version_from_list(
            spec,
            &candidates,
            include_preview_versions,
            self.options.preview_policy,
        ))
    }

    async fn channel_candidates(
        &self,
        channel: &Channel,
        package_type: PackageType,
    ) -> Result<Vec<VersionInfo>> {
        let url = channel.releases_json_url.as_str();
        debug!("Fetching releases of channel {} from {}", channel.channel_version, url);
        let document = self
            .options
            .http
            .get_json(url)
            .await
            .map_err(|e| releases_index_error(url, e))?;
        let releases =
            parse_releases_document(document).map_err(|e| releases_index_error(url, e.into()))?;

        let mut infos = Vec::new();
        for release in releases {
            let release = match release {
                Ok(release) => release,
                Err(e) => {
                    debug!("Skipping malformed release in {}: {}", url, e);
                    continue;
                }
            };
            for info in release.version_infos(package_type) {
                match info {
                    Ok(info) if info.files().is_empty() => {
                        debug!("Skipping {} {}: no usable files", package_type, info.version());
                    }
                    Ok(info) => infos.push(info),
                    Err(e) => debug!("Skipping {} entry in {}: {}", package_type, url, e),
                }
            }
        }
        Ok(infos)
    }

    /// The parsed channel index, fetched at most once per fetcher.
    pub async fn channels(&self) -> Result<&[Channel]> {
        let channels = self
            .channels
            .get_or_try_init(|| self.fetch_channels())
            .await?;
        Ok(channels.as_slice())
    }

    async fn fetch_channels(&self) -> Result<Vec<Channel>> {
        let url = self.options.index_url.as_str();
        debug!("Fetching releases index from {}", url);
        let document = self
            .options
            .http
            .get_json(url)
            .await
            .map_err(|e| releases_index_error(url, e))?;
        let parsed =
            parse_releases_index(document).map_err(|e| releases_index_error(url, e.into()))?;

        let mut channels = Vec::with_capacity(parsed.len());
        for entry in parsed {
            match entry {
                Ok(channel) => channels.push(channel),
                Err(e) => warn!("Skipping malformed channel in releases index: {}", e),
            }
        }
        if channels.is_empty() {
            return Err(UseDotNetError::ReleasesIndex {
                url: url.to_string(),
                reason: "the index contains no usable channels".to_string(),
            });
        }
        debug!("Releases index lists {} channel(s)", channels.len());
        Ok(channels)
    }

    /// The file of `version_info` to download on this machine.
    pub async fn get_download_file(&self, version_info: &VersionInfo) -> Result<FileEntry> {
        let platform = self.options.platform.detect().await.map_err(|e| match e {
            UseDotNetError::GetMachinePlatformFailed(_) => e,
            other => UseDotNetError::GetMachinePlatformFailed(other.to_string()),
        })?;
        let rids = platform.rids();
        let extension = platform.archive_extension();
        debug!(
            "Looking for {} {} with rids {:?} and extension {}",
            version_info.package_type(),
            version_info.version(),
            rids,
            extension
        );

        let file = rids.iter().find_map(|rid| {
            version_info.files().iter().find(|file| {
                file.rid.eq_ignore_ascii_case(rid)
                    && file.name.to_ascii_lowercase().ends_with(extension)
                    && !file.url.trim().is_empty()
            })
        });
        file.cloned()
            .ok_or_else(|| UseDotNetError::DownloadUrlForMatchingOsNotFound {
                package_type: version_info.package_type(),
                version: version_info.version().to_string(),
                rids,
                extension: extension.to_string(),
            })
    }

    pub async fn get_download_url(&self, version_info: &VersionInfo) -> Result<String> {
        let file = self.get_download_file(version_info).await?;
        debug!("Download URL for {}: {}", version_info.version(), file.url);
        Ok(file.url)
    }
}

fn releases_index_error(url: &str, cause: UseDotNetError) -> UseDotNetError {
    UseDotNetError::ReleasesIndex {
        url: url.to_string(),
        reason: cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use usedotnet_net::{Arch, FixedPlatformDetector, Os, Platform};

    use super::*;
    use crate::test_support::{FakeHttpClient, INDEX_URL};

    fn fetcher_with(http: FakeHttpClient, platform: Platform) -> (Arc<FakeHttpClient>, DotNetCoreVersionFetcher) {
        let http = Arc::new(http);
        let mut options = FetcherOptions::new(http.clone(), Arc::new(FixedPlatformDetector(platform)));
        options.index_url = INDEX_URL.to_string();
        (http, DotNetCoreVersionFetcher::new(options))
    }

    fn fetcher(http: FakeHttpClient) -> (Arc<FakeHttpClient>, DotNetCoreVersionFetcher) {
        fetcher_with(http, Platform::new(Os::Linux, Arch::X64))
    }

    fn sdk(version: &str, runtime: &str) -> serde_json::Value {
        json!({
            "version": version,
            "runtime-version": runtime,
            "files": [
                { "name": "dotnet-sdk-linux-x64.tar.gz", "rid": "linux-x64", "url": format!("https://example.com/{version}/linux-x64.tar.gz") },
                { "name": "dotnet-sdk-win-x64.zip", "rid": "win-x64", "url": format!("https://example.com/{version}/win-x64.zip") }
            ]
        })
    }

    fn feed() -> FakeHttpClient {
        FakeHttpClient::new()
            .with_json(
                INDEX_URL,
                json!({
                    "releases-index": [
                        { "channel-version": "3.0", "releases.json": "https://example.com/3.0/releases.json", "support-phase": "preview" },
                        { "channel-version": "2.2", "releases.json": "https://example.com/2.2/releases.json", "support-phase": "current" },
                        { "channel-version": "2.1", "releases.json": "https://example.com/2.1/releases.json", "support-phase": "lts" },
                        { "channel-version": "1.0" }
                    ]
                }),
            )
            .with_json(
                "https://example.com/3.0/releases.json",
                json!({ "releases": [
                    { "sdk": sdk("3.0.100-preview-009812", "3.0.0-preview-27122-01"),
                      "runtime": { "version": "3.0.0-preview-27122-01", "files": [] } }
                ]}),
            )
            .with_json(
                "https://example.com/2.2/releases.json",
                json!({ "releases": [
                    { "sdk": sdk("2.2.104", "2.2.2"), "runtime": { "version": "2.2.2", "files": [
                        { "name": "dotnet-runtime-linux-x64.tar.gz", "rid": "linux-x64", "url": "https://example.com/rt/2.2.2.tar.gz" }
                    ] } },
                    { "sdk": sdk("2.2.103", "2.2.1"), "sdks": [ sdk("2.2.103", "2.2.1"), sdk("2.1.504", "2.1.8") ] },
                    { "sdk": { "version": "2.2.105-preview" } }
                ]}),
            )
            .with_json(
                "https://example.com/2.1/releases.json",
                json!({ "releases": [
                    { "sdk": sdk("2.1.500", "2.1.6") }
                ]}),
            )
    }

    #[tokio::test]
    async fn explicit_version_resolves_from_its_channel() {
        let (_, fetcher) = fetcher(feed());
        let info = fetcher
            .get_version_info("2.2.103", None, PackageType::Sdk, false)
            .await
            .unwrap();
        assert_eq!(info.version(), "2.2.103");
        assert_eq!(info.runtime_version(), Some("2.2.1"));
        assert!(!info.files().is_empty());
    }

    #[tokio::test]
    async fn explicit_version_falls_back_to_other_channels_of_the_major() {
        // 2.1.504 is published in the 2.2 channel's sdks list.
        let (_, fetcher) = fetcher(feed());
        let info = fetcher
            .get_version_info("2.1.504", None, PackageType::Sdk, false)
            .await
            .unwrap();
        assert_eq!(info.version(), "2.1.504");
    }

    #[tokio::test]
    async fn explicit_version_is_not_searched_under_other_majors() {
        let http = FakeHttpClient::new()
            .with_json(
                INDEX_URL,
                json!([
                    { "channel-version": "3.0", "releases.json": "https://example.com/3.0/releases.json" },
                    { "channel-version": "2.2", "releases.json": "https://example.com/2.2/releases.json" }
                ]),
            )
            .with_json(
                "https://example.com/3.0/releases.json",
                json!([{ "sdk": sdk("2.2.500", "2.2.8") }]),
            )
            .with_json("https://example.com/2.2/releases.json", json!([{ "sdk": sdk("2.2.104", "2.2.2") }]));
        let (http, fetcher) = fetcher(http);

        let err = fetcher
            .get_version_info("2.2.500", None, PackageType::Sdk, false)
            .await
            .unwrap_err();
        assert!(matches!(err, UseDotNetError::VersionNotFound { .. }));
        assert_eq!(http.requests_to("https://example.com/3.0/releases.json"), 0);
    }

    #[tokio::test]
    async fn wildcard_specs_pick_the_highest_match() {
        let (_, fetcher) = fetcher(feed());
        let info = fetcher
            .get_version_info("2.2.x", None, PackageType::Sdk, false)
            .await
            .unwrap();
        assert_eq!(info.version(), "2.2.104");

        let info = fetcher
            .get_version_info("2.x", None, PackageType::Sdk, false)
            .await
            .unwrap();
        assert_eq!(info.version(), "2.2.104");

        let info = fetcher
            .get_version_info("2.1", None, PackageType::Sdk, false)
            .await
            .unwrap();
        assert_eq!(info.version(), "2.1.500");
    }

    #[tokio::test]
    async fn preview_channel_is_used_when_it_is_the_only_one() {
        let (_, fetcher) = fetcher(feed());
        let info = fetcher
            .get_version_info("3.x", None, PackageType::Sdk, true)
            .await
            .unwrap();
        assert_eq!(info.version(), "3.0.100-preview-009812");
    }

    #[tokio::test]
    async fn strict_policy_ignores_preview_channels() {
        let http = Arc::new(feed());
        let mut options = FetcherOptions::new(
            http,
            Arc::new(FixedPlatformDetector(Platform::new(Os::Linux, Arch::X64))),
        );
        options.index_url = INDEX_URL.to_string();
        options.preview_policy = PreviewPolicy::Strict;
        let fetcher = DotNetCoreVersionFetcher::new(options);

        let err = fetcher
            .get_version_info("3.x", None, PackageType::Sdk, false)
            .await
            .unwrap_err();
        assert!(matches!(err, UseDotNetError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn runtime_versions_come_from_runtime_objects() {
        let (_, fetcher) = fetcher(feed());
        let info = fetcher
            .get_version_info("2.2.x", None, PackageType::Runtime, false)
            .await
            .unwrap();
        assert_eq!(info.version(), "2.2.2");
        assert_eq!(info.runtime_version(), Some("2.2.2"));
    }

    #[tokio::test]
    async fn missing_versions_report_both_errors() {
        let (_, fetcher) = fetcher(feed());
        let err = fetcher
            .get_version_info("4.40.x", None, PackageType::Sdk, true)
            .await
            .unwrap_err();
        match &err {
            UseDotNetError::VersionNotFound { cause, .. } => {
                assert!(matches!(**cause, UseDotNetError::MatchingVersionNotFound { .. }))
            }
            other => panic!("unexpected error {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("4.40.x"));
        assert!(message.contains("No sdk version matching"));
    }

    #[tokio::test]
    async fn malformed_specs_fail_before_any_request() {
        let (http, fetcher) = fetcher(feed());
        for bad in ["", "2.2.2.2", "x.2", "latest"] {
            let err = fetcher
                .get_version_info(bad, None, PackageType::Sdk, false)
                .await
                .unwrap_err();
            assert!(matches!(err, UseDotNetError::InvalidArgument(_)), "'{bad}'");
        }
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn channel_restriction_limits_the_search() {
        let (_, fetcher) = fetcher(feed());
        let info = fetcher
            .get_version_info("2.x", Some("2.1"), PackageType::Sdk, false)
            .await
            .unwrap();
        assert_eq!(info.version(), "2.1.500");
    }

    #[tokio::test]
    async fn index_failures_are_wrapped_and_not_cached() {
        let (http, fetcher) = fetcher(FakeHttpClient::new());
        let err = fetcher
            .get_version_info("2.2.x", None, PackageType::Sdk, false)
            .await
            .unwrap_err();
        assert!(matches!(err, UseDotNetError::ReleasesIndex { .. }));
        let _ = fetcher.get_version_info("2.2.x", None, PackageType::Sdk, false).await;
        assert_eq!(http.requests_to(INDEX_URL), 2);
    }

    #[tokio::test]
    async fn index_is_fetched_once_per_fetcher() {
        let (http, fetcher) = fetcher(feed());
        fetcher.get_version_info("2.2.x", None, PackageType::Sdk, false).await.unwrap();
        fetcher.get_version_info("2.1.x", None, PackageType::Sdk, false).await.unwrap();
        assert_eq!(http.requests_to(INDEX_URL), 1);
    }

    #[tokio::test]
    async fn index_without_usable_channels_is_an_error() {
        let http = FakeHttpClient::new().with_json(INDEX_URL, json!({ "releases-index": [ { "channel-version": "2.2" } ] }));
        let (_, fetcher) = fetcher(http);
        assert!(matches!(
            fetcher.channels().await,
            Err(UseDotNetError::ReleasesIndex { .. })
        ));
    }

    #[tokio::test]
    async fn download_url_matches_platform_rid_and_extension() {
        let (_, fetcher) = fetcher_with(feed(), Platform::new(Os::Windows, Arch::X64));
        let info = fetcher
            .get_version_info("2.2.104", None, PackageType::Sdk, false)
            .await
            .unwrap();
        assert_eq!(
            fetcher.get_download_url(&info).await.unwrap(),
            "https://example.com/2.2.104/win-x64.zip"
        );
    }

    #[tokio::test]
    async fn download_url_requires_a_non_empty_url() {
        let (_, fetcher) = fetcher_with(FakeHttpClient::new(), Platform::new(Os::Windows, Arch::X64));
        let info = VersionInfo::new(
            "2.2.104",
            PackageType::Sdk,
            vec![FileEntry::new("dotnet-sdk-win-x64.zip", "win-x64", "")],
        );
        let err = fetcher.get_download_url(&info).await.unwrap_err();
        match err {
            UseDotNetError::DownloadUrlForMatchingOsNotFound { rids, extension, .. } => {
                assert_eq!(rids, vec!["win-x64"]);
                assert_eq!(extension, ".zip");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn musl_hosts_prefer_musl_artifacts() {
        let platform = Platform::new(Os::Linux, Arch::X64).with_musl(true);
        let (_, fetcher) = fetcher_with(FakeHttpClient::new(), platform);
        let info = VersionInfo::new(
            "8.0.100",
            PackageType::Sdk,
            vec![
                FileEntry::new("dotnet-sdk-linux-x64.tar.gz", "linux-x64", "https://example.com/glibc.tar.gz"),
                FileEntry::new("dotnet-sdk-linux-musl-x64.tar.gz", "linux-musl-x64", "https://example.com/musl.tar.gz"),
            ],
        );
        assert_eq!(
            fetcher.get_download_url(&info).await.unwrap(),
            "https://example.com/musl.tar.gz"
        );
    }

    #[tokio::test]
    async fn platform_detection_failures_are_reported() {
        struct BrokenDetector;
        #[async_trait::async_trait]
        impl PlatformDetector for BrokenDetector {
            async fn detect(&self) -> Result<Platform> {
                Err(UseDotNetError::IoError("uname failed".to_string()))
            }
        }
        let options = FetcherOptions::new(Arc::new(FakeHttpClient::new()), Arc::new(BrokenDetector));
        let fetcher = DotNetCoreVersionFetcher::new(options);
        let info = VersionInfo::new("2.2.104", PackageType::Sdk, Vec::new());
        assert!(matches!(
            fetcher.get_download_url(&info).await,
            Err(UseDotNetError::GetMachinePlatformFailed(_))
        ));
    }
}
