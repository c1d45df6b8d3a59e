//! Repository layer for database access.
//!
//! Each repository is a narrow trait with a SQLx implementation. In-memory
//! implementations for tests live in `testing` (behind the `testing` feature).

pub mod host;
pub mod stream_record;
pub mod subscription;

pub use host::*;
pub use stream_record::*;
pub use subscription::*;
