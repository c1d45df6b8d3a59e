//! Service container for dependency injection.
//!
//! The ServiceContainer builds the repositories, the status source, the
//! notification sink, the reconciler and the scheduler, and owns the root
//! cancellation token that stops them.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;
use crate::config::AppConfig;
use crate::database::repositories::{
    HostRepository, SqlxHostRepository, SqlxStreamRecordRepository, SqlxSubscriptionRepository,
    StreamRecordRepository, SubscriptionRepository,
};
use crate::monitor::{HttpStatusSource, StatusSource, StreamReconciler};
use crate::notification::{DiscordConfig, DiscordSink, NotificationSink};
use crate::scheduler::{Scheduler, SchedulerConfig, ShutdownReport, SubscriptionSupervisor};

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: SqlitePool,
    pub hosts: Arc<dyn HostRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub records: Arc<dyn StreamRecordRepository>,
    pub reconciler: Arc<StreamReconciler>,
    pub scheduler: Arc<Scheduler>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Wire the production services: SQLite repositories, the HTTP status
    /// source and the Discord sink.
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Result<Self> {
        let sink = DiscordSink::new(
            DiscordConfig::new(config.require_discord_token()?)
                .with_api_base(config.discord_api_base.clone()),
        );
        let source = HttpStatusSource::new(config.fetch_timeout);

        Ok(Self::with_services(
            pool,
            Arc::new(source),
            Arc::new(sink),
            SchedulerConfig {
                registry_interval: config.registry_interval,
                shutdown_timeout: config.shutdown_timeout,
            },
        ))
    }

    /// Wire SQLite repositories with a custom status source and sink.
    pub fn with_services(
        pool: SqlitePool,
        source: Arc<dyn StatusSource>,
        sink: Arc<dyn NotificationSink>,
        scheduler_config: SchedulerConfig,
    ) -> Self {
        info!("Initializing service container");

        let hosts: Arc<dyn HostRepository> = Arc::new(SqlxHostRepository::new(pool.clone()));
        let subscriptions: Arc<dyn SubscriptionRepository> =
            Arc::new(SqlxSubscriptionRepository::new(pool.clone()));
        let records: Arc<dyn StreamRecordRepository> =
            Arc::new(SqlxStreamRecordRepository::new(pool.clone()));

        let reconciler = Arc::new(StreamReconciler::new(
            subscriptions.clone(),
            records.clone(),
            source,
            sink,
        ));
        let supervisor = Arc::new(SubscriptionSupervisor::new(reconciler.clone()));
        let scheduler = Arc::new(Scheduler::new(hosts.clone(), supervisor, scheduler_config));

        Self {
            pool,
            hosts,
            subscriptions,
            records,
            reconciler,
            scheduler,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Get the root cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Run the scheduler until [`ServiceContainer::shutdown`] is called.
    pub async fn run(&self) -> ShutdownReport {
        self.scheduler.run(self.cancellation_token.clone()).await
    }

    /// Signal every service to stop.
    pub fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
    }
}
