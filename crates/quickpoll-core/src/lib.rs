//! Poll voting service and storage port definitions for quickpoll.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements, the service enforcing author-only edits on top of them,
//! and the dispatcher mapping chat actions onto the service. It depends only
//! on `quickpoll-types` -- never on `quickpoll-infra` or any database crate.

#[cfg(any(test, feature = "test-support"))]
pub mod contract;
pub mod dispatch;
pub mod repository;
pub mod service;
