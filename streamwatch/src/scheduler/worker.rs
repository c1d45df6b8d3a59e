//! Host worker.
//!
//! One worker per tracked host runs reconciliation passes at the host's
//! poll interval until cancelled. A failed pass stops the worker: it cancels
//! its own token so the supervisor sees the host as unsubscribed and the
//! next registry pass can start a fresh worker.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::domain::Host;
use crate::monitor::StreamReconciler;

/// How a worker's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The worker's token was cancelled from outside.
    Cancelled,
    /// A reconciliation pass failed and the worker stopped itself.
    Faulted,
}

/// Periodic reconciliation of one host.
pub struct HostWorker {
    host: Host,
    reconciler: Arc<StreamReconciler>,
    cancellation_token: CancellationToken,
}

impl HostWorker {
    pub fn new(
        host: Host,
        reconciler: Arc<StreamReconciler>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            host,
            reconciler,
            cancellation_token,
        }
    }

    /// Run until cancelled or until a pass fails.
    ///
    /// The first pass starts immediately. A pass in progress is allowed to
    /// finish before cancellation is observed.
    pub async fn run(self) -> WorkerOutcome {
        let mut interval = tokio::time::interval(self.host.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            host = %self.host.url,
            "Host worker started (every {:?})",
            self.host.poll_interval()
        );

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    info!(host = %self.host.url, "Host worker cancelled");
                    return WorkerOutcome::Cancelled;
                }

                _ = interval.tick() => {}
            }

            match self.reconciler.reconcile(&self.host).await {
                Ok(report) => {
                    debug!(
                        host = %self.host.url,
                        updated = report.updated,
                        persisted = report.persisted,
                        "Host pass finished"
                    );
                }
                Err(e) => {
                    error!(
                        host = %self.host.url,
                        error = %e,
                        "Reconciliation failed, stopping host worker"
                    );
                    self.cancellation_token.cancel();
                    return WorkerOutcome::Faulted;
                }
            }
        }
    }
}
