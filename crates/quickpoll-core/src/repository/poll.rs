//! Poll repository trait definition.

use quickpoll_types::error::PollError;
use quickpoll_types::poll::{CreatePollRequest, Poll, PollId, UserId};

/// Number of times `append_option` retries its conditional insert after
/// losing a race for the next index.
pub const APPEND_OPTION_ATTEMPTS: usize = 5;

/// Repository trait for poll metadata and option persistence.
///
/// Implementations live in quickpoll-infra (e.g., SqlitePollStore) plus the
/// in-memory [`InMemoryPollStore`](super::memory::InMemoryPollStore).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
///
/// Mutations check authorship inside the same atomic unit as the write, so a
/// concurrent append can never be authorized against a stale read.
pub trait PollRepository: Send + Sync {
    /// Create a poll under a fresh id. Metadata and every option are
    /// persisted all-or-nothing.
    fn create(
        &self,
        request: CreatePollRequest,
    ) -> impl std::future::Future<Output = Result<Poll, PollError>> + Send;

    /// Read a poll and all of its options in one consistent snapshot.
    fn get(
        &self,
        poll_id: &PollId,
    ) -> impl std::future::Future<Output = Result<Option<Poll>, PollError>> + Send;

    /// Append an empty option at the next sequential index. Author only.
    fn append_option(
        &self,
        requester: &UserId,
        poll_id: &PollId,
    ) -> impl std::future::Future<Output = Result<Poll, PollError>> + Send;

    /// Set the text of the option at `index`. Author only.
    ///
    /// An `index` at or past the current option count fills forward: empty
    /// options are created for every missing index up to and including it.
    fn set_option_text(
        &self,
        requester: &UserId,
        poll_id: &PollId,
        index: u32,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), PollError>> + Send;

    /// Replace the question text. Author only.
    fn set_question(
        &self,
        requester: &UserId,
        poll_id: &PollId,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), PollError>> + Send;
}
