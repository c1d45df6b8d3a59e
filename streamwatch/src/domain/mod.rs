//! Domain layer for streamwatch.
//!
//! This module contains the entities, value objects and the stream state
//! machine. Everything here is pure; I/O lives in the repositories, the
//! status source and the notification sink.

pub mod host;
pub mod observation;
pub mod record;
pub mod status;
pub mod stream;
pub mod subscription;

pub use host::{Host, HostUrl, MIN_POLL_INTERVAL_SECS};
pub use observation::{
    FRESHNESS_THRESHOLD, MediaElement, ObservationSet, StreamObservation, is_live,
};
pub use record::StreamRecord;
pub use status::{DetailedStatus, StreamStatus};
pub use stream::{StreamAggregate, StreamNotification};
pub use subscription::{MessageId, Subscription};
