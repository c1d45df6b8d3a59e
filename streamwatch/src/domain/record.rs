//! Persisted stream record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MessageId, StreamStatus};

/// Last persisted state of a subscription's stream.
///
/// There is at most one record per subscription; writes go through an
/// upsert keyed on `subscription_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Row id, `None` until the record has been stored.
    pub id: Option<i64>,
    pub subscription_id: String,
    pub status: StreamStatus,
    pub viewers: u32,
    /// Notification message that represents this stream session.
    pub message_id: MessageId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl StreamRecord {
    pub fn is_live(&self) -> bool {
        self.status == StreamStatus::Live
    }
}
