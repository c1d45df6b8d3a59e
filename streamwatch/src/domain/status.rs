//! Stream status mapping.
//!
//! [`StreamStatus`] is what gets persisted. [`DetailedStatus`] is computed on
//! every pass from the recorded status and the current liveness, and is only
//! used to decide which side effects to run.

use serde::{Deserialize, Serialize};

/// Coarse status stored on a stream record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    Live,
    #[default]
    Offline,
}

impl StreamStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Offline => "OFFLINE",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LIVE" => Some(Self::Live),
            "OFFLINE" => Some(Self::Offline),
            _ => None,
        }
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transition-aware status of a stream during one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetailedStatus {
    /// Live now, not live (or unknown) before.
    Starting,
    /// Live now and before.
    Live,
    /// Not live now, live before.
    Ending,
    /// Not live now nor before.
    Offline,
}

impl DetailedStatus {
    /// Derive the detailed status from the recorded status (`None` when the
    /// stream was never persisted) and the current liveness.
    pub fn derive(recorded: Option<StreamStatus>, currently_live: bool) -> Self {
        match (recorded, currently_live) {
            (Some(StreamStatus::Live), true) => Self::Live,
            (Some(StreamStatus::Live), false) => Self::Ending,
            (None | Some(StreamStatus::Offline), true) => Self::Starting,
            (None | Some(StreamStatus::Offline), false) => Self::Offline,
        }
    }

    /// The coarse status a record should carry after this pass.
    pub fn persisted(&self) -> StreamStatus {
        match self {
            Self::Starting | Self::Live => StreamStatus::Live,
            Self::Ending | Self::Offline => StreamStatus::Offline,
        }
    }

    /// Anything other than staying offline requires work.
    pub fn is_updated(&self) -> bool {
        !matches!(self, Self::Offline)
    }

    pub fn needs_new_message(&self) -> bool {
        matches!(self, Self::Starting)
    }

    pub fn needs_update_message(&self) -> bool {
        matches!(self, Self::Live | Self::Ending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Live => "LIVE",
            Self::Ending => "ENDING",
            Self::Offline => "OFFLINE",
        }
    }
}

impl std::fmt::Display for DetailedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
