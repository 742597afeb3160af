//! Vote ledger trait definition.

use quickpoll_types::error::PollError;
use quickpoll_types::poll::{PollId, PollOption, UserId, Vote};

/// Ledger recording one vote per `(poll, voter)` and the per-option tallies.
///
/// Implementations live in quickpoll-infra (e.g., SqlitePollStore) plus the
/// in-memory [`InMemoryPollStore`](super::memory::InMemoryPollStore).
pub trait VoteLedger: Send + Sync {
    /// Record `voter`'s vote and increment the chosen option's tally as one
    /// indivisible unit.
    ///
    /// The vote is inserted only if the voter has none yet (`AlreadyVoted`
    /// otherwise, checked first) and the tally is incremented only if the
    /// option exists (`OptionNotFound` otherwise). On any failure nothing is
    /// written. Returns the option with its updated tally.
    fn cast_vote(
        &self,
        voter: &UserId,
        poll_id: &PollId,
        option_index: u32,
    ) -> impl std::future::Future<Output = Result<PollOption, PollError>> + Send;

    /// The vote `voter` cast in the poll, if any.
    fn vote_of(
        &self,
        poll_id: &PollId,
        voter: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<Vote>, PollError>> + Send;

    /// Number of votes recorded for the poll.
    fn count_votes(
        &self,
        poll_id: &PollId,
    ) -> impl std::future::Future<Output = Result<u64, PollError>> + Send;
}
