//! Connection configuration for the stream driver.
//!
//! The endpoint and credential fields are not used to open connections here:
//! the network client that implements [`Transport`](crate::transport::Transport)
//! reads them through [`StreamConfig::api_url`], [`StreamConfig::subscription_url`]
//! and [`StreamConfig::authorization`]. The driver itself uses `stream_id` and
//! `required_api_version`, and logs the endpoints at startup.

use semver::VersionReq;
use serde::Deserialize;

/// Minimum stream-host API version this crate understands.
pub const DEFAULT_REQUIRED_API_VERSION: &str = ">=0.3.1";

/// Where to find the stream host and which stream to follow.
///
/// Missing fields take their [`Default`] values when deserialized, so a host
/// application can load a partial configuration:
///
/// ```
/// use craftlog_engine::config::StreamConfig;
///
/// let config: StreamConfig = serde_json::from_str(r#"{"stream_id": 3}"#).unwrap();
/// assert_eq!(config.stream_id, Some(3));
/// assert_eq!(config.api_url, "http://localhost:8080/query");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// HTTP endpoint of the stream host's query API.
    pub api_url: String,
    /// Sent verbatim as the `Authorization` header (and as the
    /// `authorization` connection parameter of the subscription) when
    /// present.
    pub api_token: Option<String>,
    /// Stream to follow. `None` follows the first stream the host lists.
    pub stream_id: Option<u64>,
    /// Versions of the host API accepted.
    pub required_api_version: VersionReq,
}

impl StreamConfig {
    /// Value of the `Authorization` header, if a token is configured. Blank
    /// tokens count as absent.
    pub fn authorization(&self) -> Option<&str> {
        self.api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// The subscription endpoint, which lives on the same path over
    /// websockets.
    pub fn subscription_url(&self) -> String {
        if let Some(rest) = self.api_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.api_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.api_url.clone()
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/query".to_owned(),
            api_token: None,
            stream_id: None,
            required_api_version: VersionReq::parse(DEFAULT_REQUIRED_API_VERSION)
                .unwrap_or(VersionReq::STAR),
        }
    }
}
