//! Remote observations of live streams.
//!
//! An observation is what a host reports about one stream key at poll time.
//! Liveness is never reported directly; it is derived from the freshness of
//! the stream's media elements.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A media element is fresh while its last activity is younger than this.
pub const FRESHNESS_THRESHOLD: TimeDelta = TimeDelta::seconds(15);

/// One media element (e.g. a video layer) of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaElement {
    pub id: String,
    pub last_activity: DateTime<Utc>,
}

impl MediaElement {
    pub fn new(id: impl Into<String>, last_activity: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            last_activity,
        }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_activity) < FRESHNESS_THRESHOLD
    }
}

/// Whether any element has shown activity within [`FRESHNESS_THRESHOLD`].
pub fn is_live(elements: &[MediaElement], now: DateTime<Utc>) -> bool {
    elements.iter().any(|e| e.is_fresh_at(now))
}

/// Snapshot of one stream key on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamObservation {
    pub stream_key: String,
    pub elements: Vec<MediaElement>,
    /// Active viewer sessions.
    pub viewers: u32,
    /// When the host first saw the stream, if it reports it.
    pub started_at: Option<DateTime<Utc>>,
}

impl StreamObservation {
    pub fn new(stream_key: impl Into<String>) -> Self {
        Self {
            stream_key: stream_key.into(),
            elements: Vec::new(),
            viewers: 0,
            started_at: None,
        }
    }

    pub fn with_element(mut self, element: MediaElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_viewers(mut self, viewers: u32) -> Self {
        self.viewers = viewers;
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        is_live(&self.elements, now)
    }
}

/// All observations reported by one host, keyed by stream key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationSet {
    streams: HashMap<String, StreamObservation>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an observation, replacing an earlier one with the same key.
    pub fn insert(&mut self, observation: StreamObservation) {
        self.streams
            .insert(observation.stream_key.clone(), observation);
    }

    pub fn get(&self, stream_key: &str) -> Option<&StreamObservation> {
        self.streams.get(stream_key)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Number of observed streams that are live at `now`.
    pub fn live_count(&self, now: DateTime<Utc>) -> usize {
        self.streams.values().filter(|o| o.is_live_at(now)).count()
    }
}

impl FromIterator<StreamObservation> for ObservationSet {
    fn from_iter<I: IntoIterator<Item = StreamObservation>>(iter: I) -> Self {
        let mut set = Self::new();
        for observation in iter {
            set.insert(observation);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_aged(now: DateTime<Utc>, secs: i64) -> MediaElement {
        MediaElement::new("v", now - TimeDelta::seconds(secs))
    }

    #[test]
    fn test_empty_is_not_live() {
        assert!(!is_live(&[], Utc::now()));
    }

    #[test]
    fn test_fresh_element_is_live() {
        let now = Utc::now();
        assert!(is_live(&[element_aged(now, 0)], now));
        assert!(is_live(&[element_aged(now, 14)], now));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let now = Utc::now();
        assert!(!is_live(&[element_aged(now, 15)], now));
        assert!(!is_live(&[element_aged(now, 60)], now));

        let just_under = MediaElement::new("v", now - TimeDelta::milliseconds(14_999));
        assert!(is_live(&[just_under], now));
    }

    #[test]
    fn test_any_fresh_element_suffices() {
        let now = Utc::now();
        let elements = vec![
            element_aged(now, 300),
            element_aged(now, 20),
            element_aged(now, 3),
        ];
        assert!(is_live(&elements, now));
    }

    #[test]
    fn test_future_activity_counts_as_fresh() {
        let now = Utc::now();
        assert!(is_live(&[element_aged(now, -5)], now));
    }

    #[test]
    fn test_observation_set_lookup() {
        let now = Utc::now();
        let set: ObservationSet = vec![
            StreamObservation::new("abc").with_element(element_aged(now, 1)),
            StreamObservation::new("idle").with_element(element_aged(now, 90)),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 2);
        assert!(set.get("abc").is_some_and(|o| o.is_live_at(now)));
        assert!(set.get("idle").is_some_and(|o| !o.is_live_at(now)));
        assert!(set.get("missing").is_none());
        assert_eq!(set.live_count(now), 1);
    }
}
