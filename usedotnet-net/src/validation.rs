// usedotnet-net/src/validation.rs
use url::Url;
use usedotnet_common::error::{Result, UseDotNetError};

/// Parses a URL and ensures it uses an HTTP(S) scheme.
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str.trim()).map_err(|e| {
        UseDotNetError::InvalidArgument(format!("Failed to parse URL '{url_str}': {e}"))
    })?;
    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(UseDotNetError::InvalidArgument(format!(
            "Invalid URL scheme for '{url_str}': must be http or https, but got '{other}'"
        ))),
    }
}
