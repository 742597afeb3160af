//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (quickpoll-infra) implements. The core crate never depends on any
//! specific storage technology.
//!
//! Both ports write to one transactional key-value layout, partitioned by
//! poll id (see [`records`]). [`memory::InMemoryPollStore`] implements the
//! same contract without I/O.

pub mod memory;
pub mod poll;
pub mod records;
pub mod vote;

pub use poll::{APPEND_OPTION_ATTEMPTS, PollRepository};
pub use vote::VoteLedger;
