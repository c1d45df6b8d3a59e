//! Notification delivery.
//!
//! One message is posted per stream session and edited in place while the
//! session runs and once it ends.
//!
//! # Example
//!
//! ```ignore
//! use streamwatch::notification::{DiscordConfig, DiscordSink, NotificationSink};
//!
//! let sink = DiscordSink::new(DiscordConfig::new(bot_token));
//! let message_id = sink.send("123456789", &notification).await?;
//! sink.edit(&message_id, "123456789", &updated).await?;
//! ```

pub mod channels;

pub use channels::{
    DEFAULT_DISCORD_API_BASE, DEFAULT_MAX_RETRY_WAIT, DiscordConfig, DiscordSink, NotificationSink,
};
