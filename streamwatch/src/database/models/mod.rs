//! Database models for streamwatch.
//!
//! These models map directly to the database schema. Conversions into the
//! domain types live next to each model.

pub mod host;
pub mod stream_record;
pub mod subscription;

pub use host::*;
pub use stream_record::*;
pub use subscription::*;
