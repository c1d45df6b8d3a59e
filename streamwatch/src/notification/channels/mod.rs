//! Notification channels.
//!
//! A channel delivers stream notifications to a chat service and hands back
//! the identity of the posted message so later passes can edit it in place.

mod discord;

pub use discord::{DEFAULT_DISCORD_API_BASE, DEFAULT_MAX_RETRY_WAIT, DiscordConfig, DiscordSink};

use async_trait::async_trait;

use crate::Result;
use crate::domain::{MessageId, StreamNotification};

/// Trait for notification sinks.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Post a new message to `channel_id` and return its identity.
    async fn send(&self, channel_id: &str, content: &StreamNotification) -> Result<MessageId>;

    /// Replace the content of a previously posted message.
    async fn edit(
        &self,
        message_id: &MessageId,
        channel_id: &str,
        content: &StreamNotification,
    ) -> Result<()>;
}
