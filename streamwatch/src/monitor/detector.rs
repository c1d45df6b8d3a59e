//! Remote stream detection.
//!
//! Hosts expose a status endpoint (`GET {host}/api/status`) listing every
//! stream key they currently know about:
//!
//! ```json
//! [
//!   {
//!     "streamKey": "abc",
//!     "firstSeenEpoch": 1714564800,
//!     "videoStreams": [
//!       { "rid": "h", "packetsReceived": 18234, "lastKeyFrameSeen": "2024-05-01T12:00:03Z" }
//!     ],
//!     "whepSessions": [ { "id": "..." } ]
//!   }
//! ]
//! ```
//!
//! Each video stream becomes a media element whose last activity is its
//! last key frame; each WHEP session is one viewer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, error};

use crate::domain::{Host, MediaElement, ObservationSet, StreamObservation};
use crate::utils::http_client;
use crate::{Error, Result};

/// Path of the status endpoint relative to the host URL.
pub const STATUS_PATH: &str = "api/status";

/// Default bound for one status request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of live stream observations for a host.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the current observations of a host.
    ///
    /// Never fails: an unreachable host, a non-success response or an
    /// unreadable payload is logged and reported as "nothing observed".
    async fn fetch_observations(&self, host: &Host) -> ObservationSet;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamStatusPayload {
    stream_key: String,
    #[serde(default)]
    first_seen_epoch: Option<i64>,
    #[serde(default)]
    video_streams: Vec<VideoStreamPayload>,
    #[serde(default)]
    whep_sessions: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStreamPayload {
    #[serde(default)]
    rid: String,
    last_key_frame_seen: DateTime<Utc>,
}

impl StreamStatusPayload {
    fn into_observation(self) -> StreamObservation {
        let started_at = self
            .first_seen_epoch
            .filter(|secs| *secs > 0)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        StreamObservation {
            stream_key: self.stream_key,
            elements: self
                .video_streams
                .into_iter()
                .map(|v| MediaElement::new(v.rid, v.last_key_frame_seen))
                .collect(),
            viewers: self.whep_sessions.len().min(u32::MAX as usize) as u32,
            started_at,
        }
    }
}

/// Parse a status endpoint response body.
pub fn parse_status_payload(body: &[u8]) -> Result<ObservationSet> {
    let streams: Vec<StreamStatusPayload> = serde_json::from_slice(body)?;
    Ok(streams
        .into_iter()
        .map(StreamStatusPayload::into_observation)
        .collect())
}

/// Status source that queries the host over HTTP.
pub struct HttpStatusSource {
    client: reqwest::Client,
}

impl HttpStatusSource {
    /// Create a status source whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(http_client::build_client(timeout))
    }

    /// Create a status source with a custom HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn try_fetch(&self, host: &Host) -> Result<ObservationSet> {
        let url = host.url.join(STATUS_PATH);
        let mut request = self.client.get(&url);
        if let Some(token) = &host.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!(
                "status endpoint {} returned {}",
                url, status
            )));
        }

        let body = response.bytes().await?;
        parse_status_payload(&body)
    }
}

impl Default for HttpStatusSource {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch_observations(&self, host: &Host) -> ObservationSet {
        match self.try_fetch(host).await {
            Ok(observations) => {
                debug!(
                    host = %host.url,
                    streams = observations.len(),
                    "Fetched stream status"
                );
                observations
            }
            Err(e) => {
                error!(host = %host.url, error = %e, "Failed to fetch stream status");
                ObservationSet::new()
            }
        }
    }
}
