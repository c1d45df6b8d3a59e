//! Subscription supervisor.
//!
//! Tracks one worker per host URL. A host counts as subscribed while its
//! worker's token is not cancelled and its task has not finished, so a
//! worker that stopped itself after a failed pass is picked up again by the
//! next registry pass, subject to the restart backoff. Only workers that
//! ended [`WorkerOutcome::Faulted`] count toward that backoff.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::Host;
use crate::monitor::StreamReconciler;

use super::restart_tracker::{RestartTracker, RestartTrackerConfig};
use super::worker::{HostWorker, WorkerOutcome};

/// A running (or finished) host worker.
struct WorkerHandle {
    /// Host settings the worker was started with.
    host: Host,
    cancellation_token: CancellationToken,
    join: JoinHandle<WorkerOutcome>,
    /// Taken from `join` once the task finished; `join` is not polled again.
    outcome: Option<WorkerOutcome>,
    /// Whether this worker's fault was already reported to the restart tracker.
    fault_recorded: bool,
}

impl WorkerHandle {
    fn is_active(&self) -> bool {
        !self.cancellation_token.is_cancelled() && !self.join.is_finished()
    }

    /// How the worker ended, or `None` while its task is still running.
    fn finished_outcome(&mut self) -> Option<WorkerOutcome> {
        if self.outcome.is_none() && self.join.is_finished() {
            self.outcome = Some(match (&mut self.join).now_or_never() {
                Some(Ok(outcome)) => outcome,
                // Panicked or aborted.
                Some(Err(_)) | None => WorkerOutcome::Faulted,
            });
        }
        self.outcome
    }

    /// Whether the worker faulted and the fault is not reported yet.
    /// Marks it reported.
    fn take_unrecorded_fault(&mut self) -> bool {
        if self.fault_recorded || self.finished_outcome() != Some(WorkerOutcome::Faulted) {
            return false;
        }
        self.fault_recorded = true;
        true
    }
}

/// Report from a shutdown operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers tracked when shutdown started.
    pub total_workers: usize,
    /// Workers that returned before the timeout.
    pub graceful_stops: usize,
    /// Workers aborted after the timeout or that panicked.
    pub forced_terminations: usize,
}

impl ShutdownReport {
    pub fn all_graceful(&self) -> bool {
        self.forced_terminations == 0
    }
}

/// Lifecycle manager for host workers.
pub struct SubscriptionSupervisor {
    reconciler: Arc<StreamReconciler>,
    workers: DashMap<String, WorkerHandle>,
    restarts: Mutex<RestartTracker>,
}

impl SubscriptionSupervisor {
    pub fn new(reconciler: Arc<StreamReconciler>) -> Self {
        Self::with_restart_config(reconciler, RestartTrackerConfig::default())
    }

    pub fn with_restart_config(
        reconciler: Arc<StreamReconciler>,
        restart_config: RestartTrackerConfig,
    ) -> Self {
        Self {
            reconciler,
            workers: DashMap::new(),
            restarts: Mutex::new(RestartTracker::with_config(restart_config)),
        }
    }

    /// Whether a live worker is tracked for `host_url`.
    pub fn is_subscribed(&self, host_url: &str) -> bool {
        self.workers
            .get(host_url)
            .is_some_and(|handle| handle.is_active())
    }

    /// Start a worker for `host` unless one is already running.
    ///
    /// The worker's token is a child of `parent`. A stale entry left by a
    /// stopped worker is replaced once its task has finished and, if it
    /// faulted, once the restart backoff allows it. A running worker whose
    /// host settings differ from `host` is cancelled; its replacement starts
    /// on a later call, after it stopped.
    /// Returns whether a new worker was started.
    pub fn subscribe(&self, host: &Host, parent: &CancellationToken) -> bool {
        let url = host.url.as_str();

        match self.workers.entry(url.to_string()) {
            Entry::Occupied(mut entry) => {
                let handle = entry.get_mut();
                if handle.is_active() {
                    if handle.host != *host {
                        info!(host = %url, "Host settings changed, stopping worker for restart");
                        handle.cancellation_token.cancel();
                    }
                    return false;
                }

                if handle.finished_outcome().is_none() {
                    debug!(host = %url, "Previous host worker still stopping");
                    return false;
                }
                if handle.take_unrecorded_fault() {
                    self.restarts.lock().record_fault(url);
                }
                if !self.may_restart(url) {
                    return false;
                }

                entry.insert(self.spawn_worker(host, parent));
                info!(host = %url, "Restarted host worker");
                true
            }
            Entry::Vacant(entry) => {
                if !self.may_restart(url) {
                    return false;
                }

                entry.insert(self.spawn_worker(host, parent));
                info!(host = %url, "Subscribed to host");
                true
            }
        }
    }

    /// Stop every worker whose host is not in `active_urls`.
    ///
    /// Finished workers are pruned as well. Returns the number of hosts
    /// unsubscribed.
    pub fn cleanup(&self, active_urls: &HashSet<String>) -> usize {
        let mut removed = 0;

        self.workers.retain(|url, handle| {
            if !active_urls.contains(url) {
                handle.cancellation_token.cancel();
                self.restarts.lock().forget(url);
                info!(host = %url, "Unsubscribed from host");
                removed += 1;
                return false;
            }

            if handle.join.is_finished() {
                if handle.take_unrecorded_fault() {
                    self.restarts.lock().record_fault(url);
                }
                debug!(host = %url, "Pruned stopped host worker");
                return false;
            }

            true
        });

        removed
    }

    /// Cancel every worker and wait for them, up to `timeout` in total.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let urls: Vec<String> = self.workers.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<(String, WorkerHandle)> = urls
            .iter()
            .filter_map(|url| self.workers.remove(url))
            .collect();

        info!("Shutting down {} host workers", handles.len());
        for (_, handle) in &handles {
            handle.cancellation_token.cancel();
        }

        let mut report = ShutdownReport {
            total_workers: handles.len(),
            ..Default::default()
        };
        let deadline = tokio::time::Instant::now() + timeout;

        for (url, mut handle) in handles {
            if let Some(outcome) = handle.outcome {
                debug!(host = %url, "Host worker already stopped: {:?}", outcome);
                report.graceful_stops += 1;
                continue;
            }
            match tokio::time::timeout_at(deadline, &mut handle.join).await {
                Ok(Ok(outcome)) => {
                    debug!(host = %url, "Host worker stopped: {:?}", outcome);
                    report.graceful_stops += 1;
                }
                Ok(Err(e)) => {
                    warn!(host = %url, "Host worker ended abnormally: {}", e);
                    report.forced_terminations += 1;
                }
                Err(_) => {
                    warn!(host = %url, "Host worker did not stop in time, aborting");
                    handle.join.abort();
                    report.forced_terminations += 1;
                }
            }
        }

        info!(
            "Shutdown complete: {} total, {} graceful, {} forced",
            report.total_workers, report.graceful_stops, report.forced_terminations
        );
        report
    }

    /// Number of hosts with a live worker.
    pub fn active_count(&self) -> usize {
        self.workers.iter().filter(|e| e.value().is_active()).count()
    }

    /// URLs of hosts with a live worker.
    pub fn subscribed_hosts(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .workers
            .iter()
            .filter(|e| e.value().is_active())
            .map(|e| e.key().clone())
            .collect();
        urls.sort();
        urls
    }

    fn may_restart(&self, url: &str) -> bool {
        let remaining = self.restarts.lock().remaining_backoff(url);
        if remaining.is_zero() {
            return true;
        }
        debug!(
            host = %url,
            "Restart deferred, backoff remaining: {:?}", remaining
        );
        false
    }

    fn spawn_worker(&self, host: &Host, parent: &CancellationToken) -> WorkerHandle {
        let cancellation_token = parent.child_token();
        let worker = HostWorker::new(
            host.clone(),
            self.reconciler.clone(),
            cancellation_token.clone(),
        );
        WorkerHandle {
            host: host.clone(),
            cancellation_token,
            join: tokio::spawn(worker.run()),
            outcome: None,
            fault_recorded: false,
        }
    }
}
