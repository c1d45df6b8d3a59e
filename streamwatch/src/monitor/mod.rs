//! Stream monitor module.
//!
//! The monitor is responsible for:
//! - Fetching stream observations from hosts
//! - Evaluating each subscription's stream against its last record
//! - Posting and editing notifications, then persisting the new state

mod detector;
mod service;

pub use detector::{
    DEFAULT_FETCH_TIMEOUT, HttpStatusSource, STATUS_PATH, StatusSource, parse_status_payload,
};
pub use service::{ReconcileReport, StreamReconciler};
