//! In-memory implementations of the service seams.
//!
//! These doubles back the reconciler and scheduler tests and can be used by
//! embedders that want to drive the engine without SQLite or a chat service.
//! [`StubHttpServer`] stands in for a streaming server and the Discord API
//! when the HTTP clients themselves are under test.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::database::models::HostDbModel;
use crate::database::repositories::{HostRepository, StreamRecordRepository, SubscriptionRepository};
use crate::domain::{Host, MessageId, ObservationSet, StreamNotification, StreamRecord, Subscription};
use crate::monitor::StatusSource;
use crate::notification::NotificationSink;
use crate::{Error, Result};

/// Host registry held in memory.
#[derive(Default)]
pub struct InMemoryHostRepository {
    hosts: RwLock<Vec<Host>>,
    failing: AtomicBool,
}

impl InMemoryHostRepository {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self {
            hosts: RwLock::new(hosts),
            failing: AtomicBool::new(false),
        }
    }

    pub fn add(&self, host: Host) {
        self.hosts.write().push(host);
    }

    pub fn remove(&self, url: &str) {
        self.hosts.write().retain(|h| h.url.as_str() != url);
    }

    /// Make `list_hosts` fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl HostRepository for InMemoryHostRepository {
    async fn list_hosts(&self) -> Result<Vec<Host>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Database("host registry unavailable".to_string()));
        }
        Ok(self.hosts.read().clone())
    }

    async fn create_host(&self, host: &HostDbModel) -> Result<()> {
        let mut hosts = self.hosts.write();
        if hosts.iter().any(|h| h.url.as_str() == host.url) {
            return Err(Error::validation(format!("Host already exists: {}", host.url)));
        }
        hosts.push(host.clone().into_host());
        Ok(())
    }

    async fn delete_host(&self, url: &str) -> Result<()> {
        self.remove(url);
        Ok(())
    }
}

/// Subscriptions held in memory.
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self {
            subscriptions: RwLock::new(subscriptions),
        }
    }

    pub fn add(&self, subscription: Subscription) {
        self.subscriptions.write().push(subscription);
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn list_subscriptions(&self, host_url: &str) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.host_url.as_str() == host_url)
            .cloned()
            .collect())
    }

    async fn create_subscription(
        &self,
        subscription: &crate::database::models::SubscriptionDbModel,
    ) -> Result<()> {
        self.add(subscription.clone().into_subscription());
        Ok(())
    }
}

/// Stream records held in memory, keyed by subscription id.
#[derive(Default)]
pub struct InMemoryStreamRecordRepository {
    records: RwLock<HashMap<String, StreamRecord>>,
    next_id: AtomicUsize,
    upserts: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryStreamRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without counting it as a write.
    pub fn insert(&self, mut record: StreamRecord) {
        if record.id.is_none() {
            record.id = Some(self.allocate_id());
        }
        self.records
            .write()
            .insert(record.subscription_id.clone(), record);
    }

    pub fn get(&self, subscription_id: &str) -> Option<StreamRecord> {
        self.records.read().get(subscription_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of upserts performed so far.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Make every operation fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Database("record store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StreamRecordRepository for InMemoryStreamRecordRepository {
    async fn list_records(&self, subscription_ids: &[String]) -> Result<Vec<StreamRecord>> {
        self.check_available()?;
        let records = self.records.read();
        Ok(subscription_ids
            .iter()
            .filter_map(|id| records.get(id).cloned())
            .collect())
    }

    async fn upsert_record(&self, record: &StreamRecord) -> Result<()> {
        self.check_available()?;
        self.upserts.fetch_add(1, Ordering::SeqCst);

        let mut records = self.records.write();
        let id = match records.get(&record.subscription_id) {
            Some(existing) => existing.id,
            None => Some(self.allocate_id()),
        };
        let mut stored = record.clone();
        stored.id = id;
        records.insert(record.subscription_id.clone(), stored);
        Ok(())
    }
}

/// Status source returning preset observations per host URL.
#[derive(Default)]
pub struct StaticStatusSource {
    observations: RwLock<HashMap<String, ObservationSet>>,
    fetches: AtomicUsize,
}

impl StaticStatusSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace what `host_url` reports from now on.
    pub fn set(&self, host_url: &str, observations: ObservationSet) {
        self.observations
            .write()
            .insert(host_url.to_string(), observations);
    }

    /// Make `host_url` report nothing.
    pub fn clear(&self, host_url: &str) {
        self.observations.write().remove(host_url);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for StaticStatusSource {
    async fn fetch_observations(&self, host: &Host) -> ObservationSet {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.observations
            .read()
            .get(host.url.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

/// A call recorded by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Send {
        channel_id: String,
        content: StreamNotification,
        message_id: MessageId,
    },
    Edit {
        message_id: MessageId,
        channel_id: String,
        content: StreamNotification,
    },
}

/// Notification sink that records calls and hands out sequential ids.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    next_id: AtomicUsize,
    fail_sends: AtomicBool,
    fail_edits: AtomicBool,
    failing_channels: RwLock<HashSet<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    /// Make every call targeting `channel_id` fail.
    pub fn fail_channel(&self, channel_id: &str) {
        self.failing_channels.write().insert(channel_id.to_string());
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn sends(&self) -> Vec<SinkCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, SinkCall::Send { .. }))
            .collect()
    }

    pub fn edits(&self) -> Vec<SinkCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, SinkCall::Edit { .. }))
            .collect()
    }

    fn channel_fails(&self, channel_id: &str) -> bool {
        self.failing_channels.read().contains(channel_id)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, channel_id: &str, content: &StreamNotification) -> Result<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) || self.channel_fails(channel_id) {
            return Err(Error::notification(format!("send to {} rejected", channel_id)));
        }
        let id = 1000 + self.next_id.fetch_add(1, Ordering::SeqCst);
        let message_id = MessageId::new(id.to_string());
        self.calls.lock().push(SinkCall::Send {
            channel_id: channel_id.to_string(),
            content: content.clone(),
            message_id: message_id.clone(),
        });
        Ok(message_id)
    }

    async fn edit(
        &self,
        message_id: &MessageId,
        channel_id: &str,
        content: &StreamNotification,
    ) -> Result<()> {
        if self.fail_edits.load(Ordering::SeqCst) || self.channel_fails(channel_id) {
            return Err(Error::notification(format!(
                "edit of {} in {} rejected",
                message_id, channel_id
            )));
        }
        self.calls.lock().push(SinkCall::Edit {
            message_id: message_id.clone(),
            channel_id: channel_id.to_string(),
            content: content.clone(),
        });
        Ok(())
    }
}

/// A canned response served by [`StubHttpServer`].
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay: Option<Duration>,
}

impl StubResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.into(),
            delay: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Hold the response back for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl IntoResponse for StubResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.to_ascii_lowercase()),
                HeaderValue::try_from(value.as_str()),
            ) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

/// A request captured by [`StubHttpServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

#[derive(Clone, Default)]
struct StubState {
    responses: Arc<Mutex<VecDeque<StubResponse>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Local HTTP server speaking the status and Discord message routes.
///
/// Each request takes the next canned response in order; once they run out
/// the server answers 503.
pub struct StubHttpServer {
    base_url: String,
    state: StubState,
    task: JoinHandle<std::io::Result<()>>,
}

impl StubHttpServer {
    pub async fn start(responses: Vec<StubResponse>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let state = StubState {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::default(),
        };
        let router = Router::new()
            .route("/api/status", get(respond))
            .route("/channels/{channel_id}/messages", post(respond))
            .route("/channels/{channel_id}/messages/{message_id}", patch(respond))
            .with_state(state.clone());

        let task = tokio::spawn(async move { axum::serve(listener, router).await });

        Ok(Self {
            base_url,
            state,
            task,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }
}

impl Drop for StubHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn respond(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers,
        body,
    });

    let next = state.responses.lock().pop_front();
    let Some(canned) = next else {
        return (StatusCode::SERVICE_UNAVAILABLE, "no canned response left").into_response();
    };
    if let Some(delay) = canned.delay {
        tokio::time::sleep(delay).await;
    }
    canned.into_response()
}
