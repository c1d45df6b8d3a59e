//! Scheduler module for orchestrating host workers.
//!
//! The Scheduler is responsible for:
//! - Starting one worker per registered host
//! - Stopping workers of hosts that left the registry
//! - Restarting faulted workers with backoff
//! - Implementing graceful shutdown

mod restart_tracker;
mod service;
mod supervisor;
mod worker;

pub use restart_tracker::{
    DEFAULT_BASE_BACKOFF, DEFAULT_FAILURE_THRESHOLD, DEFAULT_FAILURE_WINDOW, DEFAULT_MAX_BACKOFF,
    RestartTracker, RestartTrackerConfig,
};
pub use service::{
    DEFAULT_REGISTRY_INTERVAL, DEFAULT_SHUTDOWN_TIMEOUT, Scheduler, SchedulerConfig, SyncReport,
};
pub use supervisor::{ShutdownReport, SubscriptionSupervisor};
pub use worker::{HostWorker, WorkerOutcome};
