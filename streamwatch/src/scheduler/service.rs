//! Scheduler service.
//!
//! The Scheduler keeps the set of host workers in line with the host
//! registry. Every registry interval it reads all hosts, subscribes the ones
//! without a live worker and unsubscribes the ones that left the registry.
//! The pass is level-triggered: it only compares desired and actual state,
//! so a missed or failed pass is repaired by the next one.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::Result;
use crate::database::repositories::HostRepository;

use super::supervisor::{ShutdownReport, SubscriptionSupervisor};

/// Default interval between registry passes.
pub const DEFAULT_REGISTRY_INTERVAL: Duration = Duration::from_secs(60);

/// Default time allowed for workers to stop on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between registry passes, independent of host poll intervals.
    pub registry_interval: Duration,
    /// Time allowed for workers to stop on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            registry_interval: DEFAULT_REGISTRY_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Outcome of one registry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Hosts in the registry.
    pub hosts: usize,
    /// Workers started this pass.
    pub started: usize,
    /// Workers stopped because their host left the registry.
    pub stopped: usize,
}

/// Top-level reconciliation loop.
pub struct Scheduler {
    hosts: Arc<dyn HostRepository>,
    supervisor: Arc<SubscriptionSupervisor>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        hosts: Arc<dyn HostRepository>,
        supervisor: Arc<SubscriptionSupervisor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            hosts,
            supervisor,
            config,
        }
    }

    pub fn supervisor(&self) -> &Arc<SubscriptionSupervisor> {
        &self.supervisor
    }

    /// Run registry passes until `cancellation_token` is cancelled, then
    /// shut every worker down.
    ///
    /// Workers are started as children of `cancellation_token`.
    pub async fn run(&self, cancellation_token: CancellationToken) -> ShutdownReport {
        info!(
            "Scheduler started (registry interval {:?})",
            self.config.registry_interval
        );

        let mut interval = tokio::time::interval(self.config.registry_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }

                _ = interval.tick() => {}
            }

            if let Err(e) = self.sync_once(&cancellation_token).await {
                error!("Failed to read host registry, skipping pass: {}", e);
            }
        }

        self.supervisor.shutdown(self.config.shutdown_timeout).await
    }

    /// Run a single registry pass.
    pub async fn sync_once(&self, parent: &CancellationToken) -> Result<SyncReport> {
        let hosts = self.hosts.list_hosts().await?;

        let started = hosts
            .iter()
            .filter(|host| !self.supervisor.is_subscribed(host.url.as_str()))
            .filter(|host| self.supervisor.subscribe(host, parent))
            .count();

        let active: HashSet<String> = hosts.iter().map(|h| h.url.as_str().to_string()).collect();
        let stopped = self.supervisor.cleanup(&active);

        let report = SyncReport {
            hosts: hosts.len(),
            started,
            stopped,
        };
        debug!(
            hosts = report.hosts,
            started = report.started,
            stopped = report.stopped,
            "Registry pass complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Host, HostUrl};
    use crate::monitor::StreamReconciler;
    use crate::testing::{
        InMemoryHostRepository, InMemoryStreamRecordRepository, InMemorySubscriptionRepository,
        RecordingSink, StaticStatusSource,
    };

    fn host(url: &str) -> Host {
        Host::new(HostUrl::from_trusted(url), 30, None)
    }

    fn scheduler(hosts: Arc<InMemoryHostRepository>, registry_interval: Duration) -> Scheduler {
        let reconciler = Arc::new(StreamReconciler::new(
            Arc::new(InMemorySubscriptionRepository::default()),
            Arc::new(InMemoryStreamRecordRepository::new()),
            Arc::new(StaticStatusSource::new()),
            Arc::new(RecordingSink::new()),
        ));
        Scheduler::new(
            hosts,
            Arc::new(SubscriptionSupervisor::new(reconciler)),
            SchedulerConfig {
                registry_interval,
                shutdown_timeout: Duration::from_secs(1),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_follows_registry() {
        let hosts = Arc::new(InMemoryHostRepository::new(vec![
            host("https://a.example.com"),
            host("https://b.example.com"),
        ]));
        let scheduler = scheduler(hosts.clone(), DEFAULT_REGISTRY_INTERVAL);
        let root = CancellationToken::new();

        let report = scheduler.sync_once(&root).await.unwrap();
        assert_eq!(report, SyncReport { hosts: 2, started: 2, stopped: 0 });

        // Converged: nothing to do.
        let report = scheduler.sync_once(&root).await.unwrap();
        assert_eq!(report, SyncReport { hosts: 2, started: 0, stopped: 0 });

        hosts.remove("https://a.example.com");
        hosts.add(host("https://c.example.com"));
        let report = scheduler.sync_once(&root).await.unwrap();
        assert_eq!(report, SyncReport { hosts: 2, started: 1, stopped: 1 });
        assert_eq!(
            scheduler.supervisor().subscribed_hosts(),
            vec!["https://b.example.com", "https://c.example.com"]
        );

        scheduler.supervisor().shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_registry_read_keeps_workers() {
        let hosts = Arc::new(InMemoryHostRepository::new(vec![host("https://a.example.com")]));
        let scheduler = scheduler(hosts.clone(), DEFAULT_REGISTRY_INTERVAL);
        let root = CancellationToken::new();

        scheduler.sync_once(&root).await.unwrap();
        hosts.set_failing(true);
        assert!(scheduler.sync_once(&root).await.is_err());
        assert!(scheduler.supervisor().is_subscribed("https://a.example.com"));

        scheduler.supervisor().shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_picks_up_registry_changes_and_shuts_down() {
        let hosts = Arc::new(InMemoryHostRepository::new(vec![host("https://a.example.com")]));
        let scheduler = Arc::new(scheduler(hosts.clone(), Duration::from_secs(60)));
        let root = CancellationToken::new();

        let run = tokio::spawn({
            let scheduler = scheduler.clone();
            let root = root.clone();
            async move { scheduler.run(root).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.supervisor().active_count(), 1);

        hosts.add(host("https://b.example.com"));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(scheduler.supervisor().active_count(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(scheduler.supervisor().active_count(), 2);

        root.cancel();
        let report = run.await.unwrap();
        assert_eq!(report.total_workers, 2);
        assert!(report.all_graceful());
        assert_eq!(scheduler.supervisor().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_registry_failures() {
        let hosts = Arc::new(InMemoryHostRepository::new(vec![host("https://a.example.com")]));
        hosts.set_failing(true);
        let scheduler = Arc::new(scheduler(hosts.clone(), Duration::from_secs(60)));
        let root = CancellationToken::new();

        let run = tokio::spawn({
            let scheduler = scheduler.clone();
            let root = root.clone();
            async move { scheduler.run(root).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.supervisor().active_count(), 0);

        hosts.set_failing(false);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(scheduler.supervisor().active_count(), 1);

        root.cancel();
        run.await.unwrap();
    }
}
