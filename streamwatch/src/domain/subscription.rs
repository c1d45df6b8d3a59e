//! Subscription entity.

use serde::{Deserialize, Serialize};

use super::HostUrl;

/// Identity of a posted notification message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Binding of one stream key on one host to one notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub host_url: HostUrl,
    pub stream_key: String,
    /// Channel the notification is posted to.
    pub channel_id: String,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        host_url: HostUrl,
        stream_key: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            host_url,
            stream_key: stream_key.into(),
            channel_id: channel_id.into(),
        }
    }

    /// Public watch page of the subscribed stream.
    pub fn watch_url(&self) -> String {
        self.host_url.join(&self.stream_key)
    }
}
