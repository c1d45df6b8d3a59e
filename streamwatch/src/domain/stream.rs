//! Stream aggregate.
//!
//! A [`StreamAggregate`] joins one subscription with its last persisted
//! record and the current observation of its stream key, and decides what
//! has to happen this pass:
//!
//! | recorded        | live now | status     | effect                  |
//! |-----------------|----------|------------|-------------------------|
//! | none / offline  | yes      | `Starting` | send a new notification |
//! | live            | yes      | `Live`     | edit the notification   |
//! | live            | no       | `Ending`   | edit the notification   |
//! | none / offline  | no       | `Offline`  | nothing                 |
//!
//! The aggregate is built in one step and never mutated afterwards.

use chrono::{DateTime, TimeDelta, Utc};

use super::{DetailedStatus, MessageId, StreamObservation, StreamRecord, Subscription};
use crate::{Error, Result};

/// Content of a notification about one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamNotification {
    pub status: DetailedStatus,
    pub stream_key: String,
    /// Public watch page of the stream.
    pub url: String,
    pub viewers: u32,
    /// How long the session has been running, or ran for once ended.
    pub duration: TimeDelta,
}

/// One subscription's stream, evaluated at a point in time.
#[derive(Debug, Clone)]
pub struct StreamAggregate {
    subscription: Subscription,
    prior: Option<StreamRecord>,
    status: DetailedStatus,
    viewers: u32,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    evaluated_at: DateTime<Utc>,
}

impl StreamAggregate {
    /// Evaluate a subscription against its prior record and the current
    /// observation of its stream key (`None` when the key was not reported).
    pub fn evaluate(
        subscription: Subscription,
        prior: Option<StreamRecord>,
        observation: Option<&StreamObservation>,
        now: DateTime<Utc>,
    ) -> Self {
        let currently_live = observation.is_some_and(|o| o.is_live_at(now));
        let status = DetailedStatus::derive(prior.as_ref().map(|r| r.status), currently_live);

        let start_time = match status {
            // A new session never inherits the previous session's start.
            DetailedStatus::Starting => observation.and_then(|o| o.started_at).unwrap_or(now),
            DetailedStatus::Live | DetailedStatus::Ending | DetailedStatus::Offline => prior
                .as_ref()
                .map(|r| r.start_time)
                .unwrap_or(now),
        };

        let end_time = match status {
            DetailedStatus::Starting | DetailedStatus::Live => None,
            DetailedStatus::Ending => Some(now),
            DetailedStatus::Offline => prior.as_ref().and_then(|r| r.end_time),
        };

        let viewers = match status {
            DetailedStatus::Starting | DetailedStatus::Live => {
                observation.map(|o| o.viewers).unwrap_or(0)
            }
            DetailedStatus::Ending | DetailedStatus::Offline => 0,
        };

        Self {
            subscription,
            prior,
            status,
            viewers,
            start_time,
            end_time,
            evaluated_at: now,
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn prior(&self) -> Option<&StreamRecord> {
        self.prior.as_ref()
    }

    pub fn status(&self) -> DetailedStatus {
        self.status
    }

    pub fn viewers(&self) -> u32 {
        self.viewers
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Whether this pass has anything to do for the stream.
    pub fn is_updated(&self) -> bool {
        self.status.is_updated()
    }

    pub fn sends_new_message(&self) -> bool {
        self.status.needs_new_message()
    }

    pub fn sends_update_message(&self) -> bool {
        self.status.needs_update_message()
    }

    /// Session length so far, or total length once the stream ended.
    pub fn duration(&self) -> TimeDelta {
        let until = self.end_time.unwrap_or(self.evaluated_at);
        until
            .signed_duration_since(self.start_time)
            .max(TimeDelta::zero())
    }

    /// Content of the notification announcing a new session.
    ///
    /// Only valid while [`DetailedStatus::Starting`].
    pub fn new_message(&self) -> Result<StreamNotification> {
        if !self.sends_new_message() {
            return Err(Error::invalid_status("new_message", self.status));
        }
        Ok(self.notification())
    }

    /// The existing message to edit and its refreshed content.
    ///
    /// Only valid while [`DetailedStatus::Live`] or [`DetailedStatus::Ending`].
    pub fn update_message(&self) -> Result<(&MessageId, StreamNotification)> {
        if !self.sends_update_message() {
            return Err(Error::invalid_status("update_message", self.status));
        }
        let message_id = self
            .prior
            .as_ref()
            .map(|r| &r.message_id)
            .ok_or_else(|| Error::MissingMessageId {
                subscription_id: self.subscription.id.clone(),
            })?;
        Ok((message_id, self.notification()))
    }

    /// Flatten into the record to persist.
    ///
    /// `fresh_message_id` is the id returned by a send in this pass; it wins
    /// over the prior record's id. Without either, there is nothing the
    /// record could point at and construction fails.
    pub fn to_record(&self, fresh_message_id: Option<MessageId>) -> Result<StreamRecord> {
        let message_id = fresh_message_id
            .or_else(|| self.prior.as_ref().map(|r| r.message_id.clone()))
            .ok_or_else(|| Error::MissingMessageId {
                subscription_id: self.subscription.id.clone(),
            })?;

        Ok(StreamRecord {
            id: self.prior.as_ref().and_then(|r| r.id),
            subscription_id: self.subscription.id.clone(),
            status: self.status.persisted(),
            viewers: self.viewers,
            message_id,
            start_time: self.start_time,
            end_time: self.end_time,
        })
    }

    fn notification(&self) -> StreamNotification {
        StreamNotification {
            status: self.status,
            stream_key: self.subscription.stream_key.clone(),
            url: self.subscription.watch_url(),
            viewers: self.viewers,
            duration: self.duration(),
        }
    }
}
