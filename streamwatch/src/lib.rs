//! streamwatch library crate.
//!
//! Watches self-hosted streaming servers and keeps one chat notification per
//! stream session up to date: posted when a stream goes live, edited while it
//! runs and once more when it ends.

pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod scheduler;
pub mod services;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod utils;

pub use error::{Error, Result};
