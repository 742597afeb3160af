//! Shared domain types for quickpoll.
//!
//! Polls, options, votes, the error taxonomy shared by every storage backend,
//! and the configuration file model.
//!
//! Zero infrastructure dependencies -- only serde, uuid, thiserror.

pub mod config;
pub mod error;
pub mod poll;
