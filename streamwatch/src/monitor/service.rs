//! Stream reconciliation service.
//!
//! One pass over a host loads its subscriptions, the host's current
//! observations and the last persisted records, evaluates every
//! subscription's stream and applies the resulting effects: post or edit
//! notifications, then upsert the records that moved.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, error, info};

use crate::Result;
use crate::database::repositories::{StreamRecordRepository, SubscriptionRepository};
use crate::domain::{DetailedStatus, Host, MessageId, StreamAggregate, StreamRecord};
use crate::notification::NotificationSink;

use super::detector::StatusSource;

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Subscriptions registered for the host.
    pub subscriptions: usize,
    /// Stream keys reported by the host.
    pub observed: usize,
    /// Subscriptions whose stream needed work this pass.
    pub updated: usize,
    /// New notifications posted.
    pub sent: usize,
    /// Existing notifications edited.
    pub edited: usize,
    /// Notification calls that failed.
    pub failed: usize,
    /// Records written.
    pub persisted: usize,
}

/// Result of the notification step for one stream.
enum Delivery {
    Sent(MessageId),
    Edited,
    /// The edit failed; the prior record is kept.
    EditFailed,
    /// The send failed; nothing is persisted and the next pass starts over.
    SendFailed,
}

/// Reconciles persisted stream records with what hosts report.
pub struct StreamReconciler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    records: Arc<dyn StreamRecordRepository>,
    source: Arc<dyn StatusSource>,
    sink: Arc<dyn NotificationSink>,
}

impl StreamReconciler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        records: Arc<dyn StreamRecordRepository>,
        source: Arc<dyn StatusSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            subscriptions,
            records,
            source,
            sink,
        }
    }

    /// Run one reconciliation pass for `host`.
    ///
    /// Store failures and contract violations are returned; notification
    /// failures are logged and only affect the stream they belong to.
    pub async fn reconcile(&self, host: &Host) -> Result<ReconcileReport> {
        self.reconcile_at(host, Utc::now()).await
    }

    /// Run one reconciliation pass evaluated at `now`.
    pub async fn reconcile_at(&self, host: &Host, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let subscriptions = self
            .subscriptions
            .list_subscriptions(host.url.as_str())
            .await?;
        if subscriptions.is_empty() {
            debug!(host = %host.url, "No subscriptions, skipping status fetch");
            return Ok(ReconcileReport::default());
        }

        let subscription_ids: Vec<String> = subscriptions.iter().map(|s| s.id.clone()).collect();
        let (observations, records) = tokio::join!(
            self.source.fetch_observations(host),
            self.records.list_records(&subscription_ids)
        );
        let mut records: HashMap<String, StreamRecord> = records?
            .into_iter()
            .map(|r| (r.subscription_id.clone(), r))
            .collect();

        let mut report = ReconcileReport {
            subscriptions: subscriptions.len(),
            observed: observations.len(),
            ..Default::default()
        };

        let streams: Vec<StreamAggregate> = subscriptions
            .into_iter()
            .map(|subscription| {
                let prior = records.remove(&subscription.id);
                let observation = observations.get(&subscription.stream_key);
                StreamAggregate::evaluate(subscription, prior, observation, now)
            })
            .filter(StreamAggregate::is_updated)
            .collect();
        report.updated = streams.len();

        let deliveries = join_all(streams.iter().map(|stream| self.deliver(stream))).await;

        for (stream, delivery) in streams.iter().zip(deliveries) {
            let fresh_message_id = match delivery? {
                Delivery::Sent(message_id) => {
                    report.sent += 1;
                    Some(message_id)
                }
                Delivery::Edited => {
                    report.edited += 1;
                    None
                }
                // The prior record stays as it was; the next pass retries.
                Delivery::SendFailed | Delivery::EditFailed => {
                    report.failed += 1;
                    continue;
                }
            };

            let record = stream.to_record(fresh_message_id)?;
            self.records.upsert_record(&record).await?;
            report.persisted += 1;

            match stream.status() {
                DetailedStatus::Starting => info!(
                    host = %host.url,
                    subscription = %record.subscription_id,
                    "Stream {} went live", stream.subscription().stream_key
                ),
                DetailedStatus::Ending => info!(
                    host = %host.url,
                    subscription = %record.subscription_id,
                    "Stream {} ended after {}s",
                    stream.subscription().stream_key,
                    stream.duration().num_seconds()
                ),
                DetailedStatus::Live | DetailedStatus::Offline => {}
            }
        }

        debug!(
            host = %host.url,
            subscriptions = report.subscriptions,
            observed = report.observed,
            updated = report.updated,
            sent = report.sent,
            edited = report.edited,
            failed = report.failed,
            persisted = report.persisted,
            "Reconciliation pass complete"
        );

        Ok(report)
    }

    async fn deliver(&self, stream: &StreamAggregate) -> Result<Delivery> {
        let channel_id = stream.subscription().channel_id.as_str();

        if stream.sends_new_message() {
            let content = stream.new_message()?;
            return Ok(match self.sink.send(channel_id, &content).await {
                Ok(message_id) => Delivery::Sent(message_id),
                Err(e) => {
                    error!(
                        subscription = %stream.subscription().id,
                        channel = channel_id,
                        error = %e,
                        "Failed to send stream notification"
                    );
                    Delivery::SendFailed
                }
            });
        }

        let (message_id, content) = stream.update_message()?;
        Ok(match self.sink.edit(message_id, channel_id, &content).await {
            Ok(()) => Delivery::Edited,
            Err(e) => {
                error!(
                    subscription = %stream.subscription().id,
                    channel = channel_id,
                    message = %message_id,
                    error = %e,
                    "Failed to edit stream notification"
                );
                Delivery::EditFailed
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        HostUrl, MediaElement, ObservationSet, StreamObservation, StreamStatus, Subscription,
    };
    use crate::testing::{
        InMemoryStreamRecordRepository, InMemorySubscriptionRepository, RecordingSink, SinkCall,
        StaticStatusSource,
    };
    use crate::Error;
    use chrono::{TimeDelta, TimeZone};

    const HOST: &str = "https://live.example.com";

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionRepository>,
        records: Arc<InMemoryStreamRecordRepository>,
        source: Arc<StaticStatusSource>,
        sink: Arc<RecordingSink>,
        reconciler: StreamReconciler,
    }

    impl Fixture {
        fn new(subscriptions: Vec<Subscription>) -> Self {
            let subscriptions = Arc::new(InMemorySubscriptionRepository::new(subscriptions));
            let records = Arc::new(InMemoryStreamRecordRepository::new());
            let source = Arc::new(StaticStatusSource::new());
            let sink = Arc::new(RecordingSink::new());
            let reconciler = StreamReconciler::new(
                subscriptions.clone(),
                records.clone(),
                source.clone(),
                sink.clone(),
            );
            Self {
                subscriptions,
                records,
                source,
                sink,
                reconciler,
            }
        }

        fn observe_live(&self, stream_key: &str, now: DateTime<Utc>, viewers: u32) {
            let set: ObservationSet = vec![
                StreamObservation::new(stream_key)
                    .with_element(MediaElement::new("h", now))
                    .with_viewers(viewers),
            ]
            .into_iter()
            .collect();
            self.source.set(HOST, set);
        }
    }

    fn host() -> Host {
        Host::new(HostUrl::from_trusted(HOST), 30, None)
    }

    fn subscription(id: &str, stream_key: &str, channel_id: &str) -> Subscription {
        Subscription::new(id, HostUrl::from_trusted(HOST), stream_key, channel_id)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn record(status: StreamStatus, end_time: Option<DateTime<Utc>>) -> StreamRecord {
        StreamRecord {
            id: None,
            subscription_id: "s1".to_string(),
            status,
            viewers: 1,
            message_id: MessageId::new("111"),
            start_time: t0(),
            end_time,
        }
    }

    #[tokio::test]
    async fn test_new_stream_posts_and_persists() {
        let fx = Fixture::new(vec![subscription("s1", "abc", "chan")]);
        let now = t0() + TimeDelta::minutes(5);
        fx.observe_live("abc", now, 3);

        let report = fx.reconciler.reconcile_at(&host(), now).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.persisted, 1);

        let sends = fx.sink.sends();
        assert_eq!(sends.len(), 1);
        let SinkCall::Send {
            channel_id,
            content,
            message_id,
        } = &sends[0]
        else {
            unreachable!()
        };
        assert_eq!(channel_id, "chan");
        assert_eq!(content.status, DetailedStatus::Starting);
        assert_eq!(content.url, "https://live.example.com/abc");

        let stored = fx.records.get("s1").unwrap();
        assert_eq!(stored.status, StreamStatus::Live);
        assert_eq!(&stored.message_id, message_id);
        assert_eq!(stored.start_time, now);
        assert_eq!(stored.viewers, 3);
    }

    #[tokio::test]
    async fn test_live_stream_edits_and_keeps_start() {
        let fx = Fixture::new(vec![subscription("s1", "abc", "chan")]);
        fx.records.insert(record(StreamStatus::Live, None));
        let now = t0() + TimeDelta::minutes(30);
        fx.observe_live("abc", now, 8);

        let report = fx.reconciler.reconcile_at(&host(), now).await.unwrap();
        assert_eq!(report.edited, 1);
        assert_eq!(report.sent, 0);

        let edits = fx.sink.edits();
        let SinkCall::Edit {
            message_id,
            content,
            ..
        } = &edits[0]
        else {
            unreachable!()
        };
        assert_eq!(message_id, &MessageId::new("111"));
        assert_eq!(content.duration, TimeDelta::minutes(30));

        let stored = fx.records.get("s1").unwrap();
        assert_eq!(stored.start_time, t0());
        assert_eq!(stored.end_time, None);
        assert_eq!(stored.viewers, 8);
    }

    #[tokio::test]
    async fn test_absent_stream_ends_session() {
        let fx = Fixture::new(vec![subscription("s1", "abc", "chan")]);
        fx.records.insert(record(StreamStatus::Live, None));
        let now = t0() + TimeDelta::hours(2);

        let report = fx.reconciler.reconcile_at(&host(), now).await.unwrap();
        assert_eq!(report.edited, 1);

        let stored = fx.records.get("s1").unwrap();
        assert_eq!(stored.status, StreamStatus::Offline);
        assert_eq!(stored.end_time, Some(now));
        assert_eq!(stored.message_id, MessageId::new("111"));
        assert_eq!(stored.viewers, 0);

        // Steady state afterwards: nothing to do.
        let upserts = fx.records.upsert_count();
        let report = fx
            .reconciler
            .reconcile_at(&host(), now + TimeDelta::minutes(1))
            .await
            .unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(fx.records.upsert_count(), upserts);
        assert_eq!(fx.sink.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_stream_is_untouched() {
        let fx = Fixture::new(vec![subscription("s1", "abc", "chan")]);
        let t1 = t0() + TimeDelta::hours(1);
        fx.records.insert(record(StreamStatus::Offline, Some(t1)));

        let report = fx
            .reconciler
            .reconcile_at(&host(), t0() + TimeDelta::hours(3))
            .await
            .unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.persisted, 0);
        assert!(fx.sink.calls().is_empty());
        assert_eq!(fx.records.upsert_count(), 0);
        assert_eq!(fx.records.get("s1").unwrap().end_time, Some(t1));
    }

    #[tokio::test]
    async fn test_failed_send_persists_nothing_and_retries() {
        let fx = Fixture::new(vec![subscription("s1", "abc", "chan")]);
        let now = t0();
        fx.observe_live("abc", now, 1);
        fx.sink.set_fail_sends(true);

        let report = fx.reconciler.reconcile_at(&host(), now).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.persisted, 0);
        assert!(fx.records.is_empty());

        // Next pass starts from the same condition and succeeds.
        fx.sink.set_fail_sends(false);
        let later = now + TimeDelta::seconds(30);
        fx.observe_live("abc", later, 1);
        let report = fx.reconciler.reconcile_at(&host(), later).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(fx.records.get("s1").unwrap().status, StreamStatus::Live);
    }

    #[tokio::test]
    async fn test_failed_edit_keeps_record_and_retries() {
        let fx = Fixture::new(vec![subscription("s1", "abc", "chan")]);
        fx.records.insert(record(StreamStatus::Live, None));
        fx.sink.set_fail_edits(true);
        let now = t0() + TimeDelta::hours(1);

        let report = fx.reconciler.reconcile_at(&host(), now).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.persisted, 0);
        assert_eq!(fx.records.upsert_count(), 0);

        let stored = fx.records.get("s1").unwrap();
        assert_eq!(stored.status, StreamStatus::Live);
        assert_eq!(stored.end_time, None);

        // Still Live with nothing observed: Ending again, and the edit goes through.
        fx.sink.set_fail_edits(false);
        let later = now + TimeDelta::seconds(30);
        let report = fx.reconciler.reconcile_at(&host(), later).await.unwrap();
        assert_eq!(report.edited, 1);
        assert_eq!(report.persisted, 1);

        let stored = fx.records.get("s1").unwrap();
        assert_eq!(stored.status, StreamStatus::Offline);
        assert_eq!(stored.end_time, Some(later));
        assert_eq!(stored.message_id, MessageId::new("111"));
    }

    #[tokio::test]
    async fn test_channels_are_independent() {
        let fx = Fixture::new(vec![
            subscription("s1", "abc", "chan-a"),
            subscription("s2", "abc", "chan-b"),
            subscription("s3", "other", "chan-a"),
        ]);
        fx.sink.fail_channel("chan-b");
        let now = t0();
        fx.observe_live("abc", now, 2);

        let report = fx.reconciler.reconcile_at(&host(), now).await.unwrap();
        assert_eq!(report.subscriptions, 3);
        assert_eq!(report.observed, 1);
        assert_eq!(report.updated, 2);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);

        assert!(fx.records.get("s1").is_some());
        assert!(fx.records.get("s2").is_none());
        assert!(fx.records.get("s3").is_none());
    }

    #[tokio::test]
    async fn test_no_subscriptions_skips_fetch() {
        let fx = Fixture::new(Vec::new());

        let report = fx.reconciler.reconcile(&host()).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(fx.source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_other_hosts_subscriptions_are_ignored() {
        let fx = Fixture::new(vec![subscription("s1", "abc", "chan")]);
        fx.subscriptions.add(Subscription::new(
            "elsewhere",
            HostUrl::from_trusted("https://other.example.com"),
            "abc",
            "chan",
        ));
        let now = t0();
        fx.observe_live("abc", now, 1);

        let report = fx.reconciler.reconcile_at(&host(), now).await.unwrap();
        assert_eq!(report.subscriptions, 1);
        assert!(fx.records.get("elsewhere").is_none());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let fx = Fixture::new(vec![subscription("s1", "abc", "chan")]);
        fx.records.set_failing(true);

        let result = fx.reconciler.reconcile_at(&host(), t0()).await;
        assert!(matches!(result, Err(Error::Database(_))));
    }
}
