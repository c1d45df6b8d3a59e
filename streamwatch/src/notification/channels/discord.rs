//! Discord bot notification channel.
//!
//! Messages are posted through the channel messages REST endpoints with a
//! bot token, so they can be edited while the stream goes on.
//!
//! Implements Discord's recommended rate limit handling:
//! - No hardcoded rate limits
//! - Retries on 429 responses respecting the Retry-After header, capped at
//!   [`DEFAULT_MAX_RETRY_WAIT`] unless configured otherwise

use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::NotificationSink;
use crate::domain::{DetailedStatus, MessageId, StreamNotification};
use crate::utils::http_client;
use crate::{Error, Result};

/// Default base URL of the Discord REST API.
pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Longest wait honored from a rate limit header.
pub const DEFAULT_MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const COLOR_LIVE: u32 = 0xe74c3c; // Red
const COLOR_ENDED: u32 = 0x808080; // Gray

/// Discord sink configuration.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// REST API base, without trailing slash.
    pub api_base: String,
    /// Bot token, sent as `Authorization: Bot <token>`.
    pub bot_token: String,
    /// Upper bound for a single rate limit wait.
    pub max_retry_wait: Duration,
}

impl DiscordConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            bot_token: bot_token.into(),
            max_retry_wait: DEFAULT_MAX_RETRY_WAIT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retry_wait(mut self, max_retry_wait: Duration) -> Self {
        self.max_retry_wait = max_retry_wait;
        self
    }
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

/// Discord notification sink.
pub struct DiscordSink {
    config: DiscordConfig,
    client: Client,
}

impl DiscordSink {
    /// Create a new Discord sink.
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            client: http_client::build_client(REQUEST_TIMEOUT),
        }
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.config.api_base, channel_id)
    }

    /// Get the embed color for a status.
    fn get_color(status: DetailedStatus) -> u32 {
        match status {
            DetailedStatus::Starting | DetailedStatus::Live => COLOR_LIVE,
            DetailedStatus::Ending | DetailedStatus::Offline => COLOR_ENDED,
        }
    }

    fn title(content: &StreamNotification) -> String {
        match content.status {
            DetailedStatus::Starting | DetailedStatus::Live => {
                format!("{} is live", content.stream_key)
            }
            DetailedStatus::Ending | DetailedStatus::Offline => {
                format!("{} has ended", content.stream_key)
            }
        }
    }

    /// Build the message payload for a notification.
    fn build_payload(content: &StreamNotification) -> serde_json::Value {
        let duration_label = match content.status {
            DetailedStatus::Ending | DetailedStatus::Offline => "Streamed for",
            DetailedStatus::Starting | DetailedStatus::Live => "Live for",
        };

        let mut fields = vec![json!({
            "name": duration_label,
            "value": format_duration(content.duration),
            "inline": true
        })];
        if matches!(
            content.status,
            DetailedStatus::Starting | DetailedStatus::Live
        ) {
            fields.push(json!({
                "name": "Viewers",
                "value": content.viewers.to_string(),
                "inline": true
            }));
        }

        json!({
            "embeds": [{
                "title": Self::title(content),
                "url": content.url,
                "color": Self::get_color(content.status),
                "fields": fields,
                "footer": { "text": content.url }
            }]
        })
    }

    /// Send request with rate limit handling.
    /// Retries on 429 responses respecting the Retry-After header.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = build()
                .header(
                    reqwest::header::AUTHORIZATION,
                    format!("Bot {}", self.config.bot_token),
                )
                .send()
                .await
                .map_err(|e| Error::notification(format!("Discord request failed: {}", e)))?;

            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status.as_u16() == 429 {
                let retry_after = parse_retry_after(response.headers(), self.config.max_retry_wait);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Discord rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::notification(format!(
                        "Discord rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Discord rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::notification(format!(
                "Discord request failed: {} - {}",
                status, body
            )));
        }
    }
}

/// Parse the wait from a 429 response's headers, clamped to `max`.
fn parse_retry_after(headers: &HeaderMap, max: Duration) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok()?.parse::<f64>().ok())
        .find(|secs| !secs.is_nan() && *secs >= 0.0)
        .map(|secs| Duration::try_from_secs_f64(secs).map_or(max, |wait| wait.min(max)))
}

/// Render a duration as `1h 02m`, `5m 07s` or `42s`.
pub(crate) fn format_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn send(&self, channel_id: &str, content: &StreamNotification) -> Result<MessageId> {
        let payload = Self::build_payload(content);
        let url = self.messages_url(channel_id);

        let response = self
            .send_with_retry(|| self.client.post(&url).json(&payload))
            .await?;
        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| Error::notification(format!("Unreadable Discord response: {}", e)))?;

        debug!(
            channel = channel_id,
            message = %created.id,
            "Discord notification sent for {}", content.stream_key
        );
        Ok(MessageId::new(created.id))
    }

    async fn edit(
        &self,
        message_id: &MessageId,
        channel_id: &str,
        content: &StreamNotification,
    ) -> Result<()> {
        let payload = Self::build_payload(content);
        let url = format!("{}/{}", self.messages_url(channel_id), message_id);

        self.send_with_retry(|| self.client.patch(&url).json(&payload))
            .await?;

        debug!(
            channel = channel_id,
            message = %message_id,
            "Discord notification edited for {}", content.stream_key
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubHttpServer, StubResponse};

    fn notification(status: DetailedStatus) -> StreamNotification {
        StreamNotification {
            status,
            stream_key: "abc".to_string(),
            url: "https://live.example.com/abc".to_string(),
            viewers: 12,
            duration: TimeDelta::minutes(65),
        }
    }

    fn sink(api_base: &str) -> DiscordSink {
        DiscordSink::new(DiscordConfig::new("bot-token").with_api_base(api_base))
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(TimeDelta::seconds(42)), "42s");
        assert_eq!(format_duration(TimeDelta::seconds(307)), "5m 07s");
        assert_eq!(format_duration(TimeDelta::minutes(62)), "1h 02m");
        assert_eq!(format_duration(TimeDelta::seconds(-3)), "0s");
    }

    #[test]
    fn test_build_payload_live() {
        let payload = DiscordSink::build_payload(&notification(DetailedStatus::Starting));

        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "abc is live");
        assert_eq!(embed["url"], "https://live.example.com/abc");
        assert_eq!(embed["color"], COLOR_LIVE as i64);
        assert_eq!(embed["fields"][0]["value"], "1h 05m");
        assert_eq!(embed["fields"][1]["name"], "Viewers");
        assert_eq!(embed["fields"][1]["value"], "12");
    }

    #[test]
    fn test_build_payload_ended() {
        let payload = DiscordSink::build_payload(&notification(DetailedStatus::Ending));

        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "abc has ended");
        assert_eq!(embed["color"], COLOR_ENDED as i64);
        assert_eq!(embed["fields"][0]["name"], "Streamed for");
        assert_eq!(embed["fields"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let config = DiscordConfig::new("t").with_api_base("http://localhost:1/api/");
        assert_eq!(config.api_base, "http://localhost:1/api");
    }

    #[tokio::test]
    async fn test_send_returns_message_id() {
        let server = StubHttpServer::start(vec![StubResponse::json(
            200,
            r#"{"id":"987","channel_id":"42"}"#,
        )])
        .await
        .unwrap();

        let id = sink(server.base_url())
            .send("42", &notification(DetailedStatus::Starting))
            .await
            .unwrap();
        assert_eq!(id, MessageId::new("987"));

        let requests = server.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/channels/42/messages");
        assert_eq!(requests[0].header("authorization"), Some("Bot bot-token"));

        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["embeds"][0]["title"], "abc is live");
    }

    #[tokio::test]
    async fn test_edit_patches_existing_message() {
        let server = StubHttpServer::start(vec![StubResponse::json(200, r#"{"id":"987"}"#)])
            .await
            .unwrap();

        sink(server.base_url())
            .edit(
                &MessageId::new("987"),
                "42",
                &notification(DetailedStatus::Ending),
            )
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests[0].method, "PATCH");
        assert_eq!(requests[0].path, "/channels/42/messages/987");
        assert!(requests[0].body.contains("abc has ended"));
    }

    #[tokio::test]
    async fn test_retries_after_rate_limit() {
        let server = StubHttpServer::start(vec![
            StubResponse::json(429, r#"{"retry_after":0.05}"#).with_header("Retry-After", "0.05"),
            StubResponse::json(200, r#"{"id":"5"}"#),
        ])
        .await
        .unwrap();

        let id = sink(server.base_url())
            .send("42", &notification(DetailedStatus::Starting))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "5");
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_retry_after_is_clamped() {
        let server = StubHttpServer::start(vec![
            StubResponse::json(429, "{}").with_header("Retry-After", "1e30"),
            StubResponse::json(200, r#"{"id":"6"}"#),
        ])
        .await
        .unwrap();

        let sink = DiscordSink::new(
            DiscordConfig::new("bot-token")
                .with_api_base(server.base_url())
                .with_max_retry_wait(Duration::from_millis(20)),
        );
        let id = sink
            .send("42", &notification(DetailedStatus::Starting))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "6");
        assert_eq!(server.requests().len(), 2);
    }

    #[test]
    fn test_parse_retry_after() {
        let max = Duration::from_secs(60);
        let headers = |name: &'static str, value: &'static str| {
            let mut map = HeaderMap::new();
            map.insert(name, value.parse().unwrap());
            map
        };

        assert_eq!(
            parse_retry_after(&headers("retry-after", "2.5"), max),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(
            parse_retry_after(&headers("x-ratelimit-reset-after", "0.25"), max),
            Some(Duration::from_millis(250))
        );
        assert_eq!(parse_retry_after(&headers("retry-after", "1e30"), max), Some(max));
        assert_eq!(parse_retry_after(&headers("retry-after", "inf"), max), Some(max));
        assert_eq!(parse_retry_after(&headers("retry-after", "-1"), max), None);
        assert_eq!(parse_retry_after(&headers("retry-after", "soon"), max), None);
        assert_eq!(parse_retry_after(&HeaderMap::new(), max), None);
    }

    #[tokio::test]
    async fn test_client_error_is_notification_error() {
        let server = StubHttpServer::start(vec![StubResponse::json(
            404,
            r#"{"message":"Unknown Message"}"#,
        )])
        .await
        .unwrap();

        let result = sink(server.base_url())
            .edit(
                &MessageId::new("1"),
                "42",
                &notification(DetailedStatus::Live),
            )
            .await;
        assert!(matches!(result, Err(Error::Notification(_))));
        assert_eq!(server.requests().len(), 1);
    }
}
