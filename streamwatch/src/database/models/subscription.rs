//! Subscription database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{HostUrl, Subscription};

/// Subscription database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionDbModel {
    pub id: String,
    pub host_url: String,
    pub stream_key: String,
    pub channel_id: String,
    /// Unix epoch milliseconds (UTC) when created.
    pub created_at: i64,
}

impl SubscriptionDbModel {
    pub fn new(
        id: impl Into<String>,
        host_url: impl Into<String>,
        stream_key: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            host_url: host_url.into(),
            stream_key: stream_key.into(),
            channel_id: channel_id.into(),
            created_at: crate::database::time::now_ms(),
        }
    }

    pub fn into_subscription(self) -> Subscription {
        Subscription::new(
            self.id,
            HostUrl::from_trusted(self.host_url),
            self.stream_key,
            self.channel_id,
        )
    }
}
