//! SQLite storage layer.
//!
//! Poll storage backed by SQLite with WAL mode and split read/write
//! connection pools.

pub mod poll;
pub mod pool;
