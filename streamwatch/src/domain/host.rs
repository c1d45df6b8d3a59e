//! Host entity and host URL value object.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// Lowest poll interval a host may use, in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 30;

/// A validated base URL of a streaming server.
///
/// The URL is the identity of a host: two hosts with the same normalized
/// URL are the same host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostUrl(String);

impl HostUrl {
    /// Create a new HostUrl from a string, validating it.
    pub fn new(url: impl Into<String>) -> Result<Self, Error> {
        let parsed = Self::parse(&url.into())?;
        Ok(Self(Self::normalize(&parsed)))
    }

    /// Create a HostUrl without validation (for trusted sources like DB).
    pub fn from_trusted(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a path onto the host URL, e.g. `api/status` or a stream key.
    pub fn join(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.0.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn parse(url: &str) -> Result<Url, Error> {
        if url.is_empty() {
            return Err(Error::validation("Host URL cannot be empty"));
        }

        let parsed = Url::parse(url)
            .map_err(|e| Error::validation(format!("Invalid host URL '{}': {}", url, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::validation("Host URL must use http or https"));
        }
        if parsed.host_str().is_none() {
            return Err(Error::validation("Host URL must contain a host"));
        }

        Ok(parsed)
    }

    /// Serialized form of the parsed URL without trailing slashes.
    ///
    /// Parsing already lowercases the scheme and host and drops a default
    /// port; the path keeps its case.
    fn normalize(url: &Url) -> String {
        url.as_str().trim_end_matches('/').to_string()
    }
}

impl std::fmt::Display for HostUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for HostUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A streaming server that is polled for live streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub url: HostUrl,
    /// Poll interval in seconds, never below [`MIN_POLL_INTERVAL_SECS`].
    pub poll_interval_secs: u64,
    /// Bearer token sent to the status endpoint.
    pub auth_token: Option<String>,
}

impl Host {
    pub fn new(url: HostUrl, poll_interval_secs: u64, auth_token: Option<String>) -> Self {
        Self {
            url,
            poll_interval_secs: poll_interval_secs.max(MIN_POLL_INTERVAL_SECS),
            auth_token: auth_token.filter(|t| !t.is_empty()),
        }
    }

    /// Effective poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_url() {
        let url = HostUrl::new("https://live.example.com").unwrap();
        assert_eq!(url.as_str(), "https://live.example.com");
    }

    #[test]
    fn test_url_normalization() {
        let url = HostUrl::new("HTTPS://Live.Example.COM/Broadcast/").unwrap();
        assert_eq!(url.as_str(), "https://live.example.com/Broadcast");

        let url = HostUrl::new("http://Live.Example.com:80").unwrap();
        assert_eq!(url.as_str(), "http://live.example.com");

        let url = HostUrl::new("https://live.example.com:8443/").unwrap();
        assert_eq!(url.as_str(), "https://live.example.com:8443");
    }

    #[test]
    fn test_invalid_urls() {
        assert!(HostUrl::new("").is_err());
        assert!(HostUrl::new("live.example.com").is_err());
        assert!(HostUrl::new("ftp://live.example.com").is_err());
    }

    #[test]
    fn test_join() {
        let url = HostUrl::new("https://live.example.com/").unwrap();
        assert_eq!(url.join("api/status"), "https://live.example.com/api/status");
        assert_eq!(url.join("/abc"), "https://live.example.com/abc");
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        let url = HostUrl::from_trusted("https://live.example.com");
        let host = Host::new(url.clone(), 5, None);
        assert_eq!(host.poll_interval_secs, MIN_POLL_INTERVAL_SECS);
        assert_eq!(host.poll_interval(), Duration::from_secs(30));

        let host = Host::new(url.clone(), 120, Some(String::new()));
        assert_eq!(host.poll_interval(), Duration::from_secs(120));
        assert!(host.auth_token.is_none());

        let raw = Host {
            url,
            poll_interval_secs: 0,
            auth_token: None,
        };
        assert_eq!(raw.poll_interval(), Duration::from_secs(30));
    }
}
