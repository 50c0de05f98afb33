// usedotnet-common/src/model/channel.rs
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::version::ChannelVersion;
use crate::error::SchemaError;

/// One entry of the top-level release index as it appears on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChannel {
    #[serde(rename = "channel-version")]
    pub channel_version: Option<String>,
    #[serde(rename = "releases.json")]
    pub releases_json: Option<String>,
    #[serde(rename = "support-phase")]
    pub support_phase: Option<String>,
}

/// The index is published as `{ "releases-index": [...] }`; a bare array is accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReleasesIndex {
    Envelope {
        #[serde(rename = "releases-index")]
        releases_index: Vec<Value>,
    },
    Bare(Vec<Value>),
}

pub type ParsedChannel = std::result::Result<Channel, SchemaError>;

/// A validated release channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub channel_version: ChannelVersion,
    pub releases_json_url: Url,
    pub support_phase: Option<String>,
}

impl Channel {
    /// Channels in the `preview` support phase only carry preview releases.
    pub fn is_preview(&self) -> bool {
        self.support_phase
            .as_deref()
            .is_some_and(|phase| phase.eq_ignore_ascii_case("preview"))
    }
}

impl TryFrom<RawChannel> for Channel {
    type Error = SchemaError;

    fn try_from(raw: RawChannel) -> Result<Self, Self::Error> {
        let channel_version = raw
            .channel_version
            .filter(|v| !v.trim().is_empty())
            .ok_or(SchemaError::MissingField("channel-version"))?;
        let releases_json = raw
            .releases_json
            .filter(|v| !v.trim().is_empty())
            .ok_or(SchemaError::MissingField("releases.json"))?;

        let channel_version = channel_version
            .parse::<ChannelVersion>()
            .map_err(|_| SchemaError::InvalidChannelVersion(channel_version.clone()))?;
        let releases_json_url =
            Url::parse(releases_json.trim()).map_err(|e| SchemaError::InvalidUrl {
                field: "releases.json",
                value: releases_json.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            channel_version,
            releases_json_url,
            support_phase: raw.support_phase,
        })
    }
}

/// Splits the release index into per-channel parse results. Fails only when the document as a
/// whole has the wrong shape; individual bad entries come back as `Err` items.
pub fn parse_releases_index(document: Value) -> Result<Vec<ParsedChannel>, SchemaError> {
    let entries = match serde_json::from_value::<RawReleasesIndex>(document) {
        Ok(RawReleasesIndex::Envelope { releases_index }) => releases_index,
        Ok(RawReleasesIndex::Bare(entries)) => entries,
        Err(e) => {
            return Err(SchemaError::UnexpectedShape(format!(
                "releases index is neither an array nor a 'releases-index' object: {e}"
            )))
        }
    };

    Ok(entries
        .into_iter()
        .map(|entry| {
            serde_json::from_value::<RawChannel>(entry)
                .map_err(|e| SchemaError::UnexpectedShape(format!("channel entry: {e}")))
                .and_then(Channel::try_from)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(version: Option<&str>, url: Option<&str>) -> RawChannel {
        RawChannel {
            channel_version: version.map(str::to_string),
            releases_json: url.map(str::to_string),
            support_phase: None,
        }
    }

    #[test]
    fn channel_requires_version_and_valid_url() {
        assert_eq!(
            Channel::try_from(raw(None, Some("https://example.com/releases.json"))),
            Err(SchemaError::MissingField("channel-version"))
        );
        assert_eq!(
            Channel::try_from(raw(Some("2.2"), None)),
            Err(SchemaError::MissingField("releases.json"))
        );
        assert!(matches!(
            Channel::try_from(raw(Some("2.2"), Some("not a url"))),
            Err(SchemaError::InvalidUrl { .. })
        ));
        assert!(matches!(
            Channel::try_from(raw(Some("two.two"), Some("https://example.com/r.json"))),
            Err(SchemaError::InvalidChannelVersion(_))
        ));
    }

    #[test]
    fn channel_is_built_from_a_complete_entry() {
        let channel =
            Channel::try_from(raw(Some("2.2"), Some("https://example.com/2.2/releases.json")))
                .unwrap();
        assert_eq!(channel.channel_version, ChannelVersion::new(2, 2));
        assert_eq!(
            channel.releases_json_url.as_str(),
            "https://example.com/2.2/releases.json"
        );
        assert!(!channel.is_preview());
    }

    #[test]
    fn releases_index_accepts_envelope_and_bare_array() {
        let envelope = json!({
            "releases-index": [
                { "channel-version": "3.0", "releases.json": "https://example.com/3.0.json", "support-phase": "preview" },
                { "channel-version": "2.2", "releases.json": "https://example.com/2.2.json" }
            ]
        });
        let parsed = parse_releases_index(envelope).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].as_ref().unwrap().is_preview());

        let bare = json!([{ "channel-version": "2.2", "releases.json": "https://example.com/2.2.json" }]);
        assert_eq!(parse_releases_index(bare).unwrap().len(), 1);
    }

    #[test]
    fn releases_index_reports_bad_entries_individually() {
        let doc = json!([
            { "channel-version": "2.2" },
            { "channel-version": 2.1, "releases.json": "https://example.com/2.1.json" },
            { "channel-version": "2.0", "releases.json": "https://example.com/2.0.json" }
        ]);
        let parsed = parse_releases_index(doc).unwrap();
        assert!(parsed[0].is_err());
        assert!(parsed[1].is_err());
        assert!(parsed[2].is_ok());
    }

    #[test]
    fn releases_index_rejects_wrong_document_shape() {
        assert!(parse_releases_index(json!({ "channels": [] })).is_err());
        assert!(parse_releases_index(json!("nope")).is_err());
    }
}
