//! Stream record database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{MessageId, StreamRecord, StreamStatus};
use crate::{Error, Result};

/// Stream record database model.
/// Holds the last persisted state of one subscription's stream.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StreamRecordDbModel {
    pub id: i64,
    pub subscription_id: String,
    /// Coarse status (LIVE, OFFLINE)
    pub status: String,
    pub viewers: i64,
    pub message_id: String,
    /// Unix epoch milliseconds (UTC) when the session started.
    pub start_time: i64,
    /// Unix epoch milliseconds (UTC) when the session ended (null while live).
    pub end_time: Option<i64>,
    /// Unix epoch milliseconds (UTC) of the last write.
    pub updated_at: i64,
}

impl StreamRecordDbModel {
    pub fn into_record(self) -> Result<StreamRecord> {
        let status = StreamStatus::parse(&self.status).ok_or_else(|| {
            Error::Database(format!(
                "Unknown stream status '{}' for subscription {}",
                self.status, self.subscription_id
            ))
        })?;

        Ok(StreamRecord {
            id: Some(self.id),
            subscription_id: self.subscription_id,
            status,
            viewers: self.viewers.clamp(0, u32::MAX as i64) as u32,
            message_id: MessageId::new(self.message_id),
            start_time: ms_to_datetime(self.start_time),
            end_time: self.end_time.map(ms_to_datetime),
        })
    }
}

/// Column values written by an upsert.
#[derive(Debug, Clone)]
pub struct StreamRecordWrite<'a> {
    pub subscription_id: &'a str,
    pub status: &'static str,
    pub viewers: i64,
    pub message_id: &'a str,
    pub start_time: i64,
    pub end_time: Option<i64>,
}

impl<'a> From<&'a StreamRecord> for StreamRecordWrite<'a> {
    fn from(record: &'a StreamRecord) -> Self {
        Self {
            subscription_id: &record.subscription_id,
            status: record.status.as_str(),
            viewers: record.viewers as i64,
            message_id: record.message_id.as_str(),
            start_time: datetime_to_ms(record.start_time),
            end_time: record.end_time.map(datetime_to_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_is_rejected() {
        let model = StreamRecordDbModel {
            id: 1,
            subscription_id: "s".to_string(),
            status: "ENDING".to_string(),
            viewers: 0,
            message_id: "m".to_string(),
            start_time: 0,
            end_time: None,
            updated_at: 0,
        };
        assert!(matches!(model.into_record(), Err(Error::Database(_))));
    }
}
