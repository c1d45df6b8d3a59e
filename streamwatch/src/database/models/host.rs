//! Host database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{Host, HostUrl};

/// Host database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HostDbModel {
    /// Base URL of the streaming server (primary key).
    pub url: String,
    /// Configured poll interval; clamped when converted to a [`Host`].
    pub poll_interval_secs: i64,
    pub auth_token: Option<String>,
    /// Unix epoch milliseconds (UTC) when created.
    pub created_at: i64,
}

impl HostDbModel {
    pub fn new(url: impl Into<String>, poll_interval_secs: i64, auth_token: Option<String>) -> Self {
        Self {
            url: url.into(),
            poll_interval_secs,
            auth_token,
            created_at: crate::database::time::now_ms(),
        }
    }

    pub fn into_host(self) -> Host {
        Host::new(
            HostUrl::from_trusted(self.url),
            self.poll_interval_secs.max(0) as u64,
            self.auth_token,
        )
    }
}
