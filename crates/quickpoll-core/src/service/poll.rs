//! Poll service.
//!
//! Composes the [`PollRepository`] and the [`VoteLedger`] into the five
//! operations chat collaborators need (create, add option, edit option, vote,
//! get) plus a few conveniences. Author-only edits are enforced by the
//! repository inside the same atomic unit as the write; the service surfaces
//! the outcome tagged with the operation that produced it.
//!
//! The service holds no poll state between calls. Every mutation that returns
//! a poll re-reads it so callers get a render-ready snapshot.

use quickpoll_types::error::{Operation, PollError, ServiceError};
use quickpoll_types::poll::{CreatePollRequest, Poll, PollId, UserId, Vote};
use tracing::{error, info, warn};

use crate::repository::{PollRepository, VoteLedger};

/// Service orchestrating poll editing and voting.
///
/// Generic over the storage ports so the same service runs against SQLite in
/// production and the in-memory store in tests.
pub struct PollService<R: PollRepository, L: VoteLedger> {
    polls: R,
    ledger: L,
}

impl<R: PollRepository, L: VoteLedger> PollService<R, L> {
    pub fn new(polls: R, ledger: L) -> Self {
        Self { polls, ledger }
    }

    /// Access the poll repository.
    pub fn polls(&self) -> &R {
        &self.polls
    }

    /// Access the vote ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Create a poll with the default set of empty options.
    pub async fn create_poll(
        &self,
        author: &UserId,
        question: &str,
    ) -> Result<Poll, ServiceError> {
        self.create_poll_with_options(CreatePollRequest::new(author.clone(), question))
            .await
    }

    /// Create a poll, honouring any options supplied in the request.
    #[tracing::instrument(name = "create_poll", skip_all, fields(author = %request.author))]
    pub async fn create_poll_with_options(
        &self,
        request: CreatePollRequest,
    ) -> Result<Poll, ServiceError> {
        let poll = self
            .polls
            .create(request)
            .await
            .map_err(|e| tagged(Operation::CreatePoll, e))?;

        info!(poll_id = %poll.id, options = poll.options.len(), "poll created");
        Ok(poll)
    }

    /// Append an empty option. Only the poll's author may do this.
    #[tracing::instrument(
        name = "add_option",
        skip_all,
        fields(poll_id = %poll_id, requester = %requester)
    )]
    pub async fn add_option(
        &self,
        requester: &UserId,
        poll_id: &PollId,
    ) -> Result<Poll, ServiceError> {
        self.polls
            .append_option(requester, poll_id)
            .await
            .map_err(|e| tagged(Operation::AddOption, e))
    }

    /// Set the text of option `index` and return the updated poll. Only the
    /// poll's author may do this. Editing past the last option fills forward.
    #[tracing::instrument(
        name = "edit_option",
        skip_all,
        fields(poll_id = %poll_id, requester = %requester, index = index)
    )]
    pub async fn edit_option(
        &self,
        requester: &UserId,
        poll_id: &PollId,
        index: u32,
        text: &str,
    ) -> Result<Poll, ServiceError> {
        self.polls
            .set_option_text(requester, poll_id, index, text)
            .await
            .map_err(|e| tagged(Operation::EditOption, e))?;

        self.fetch(poll_id, Operation::EditOption).await
    }

    /// Replace the question text and return the updated poll. Author only.
    #[tracing::instrument(
        name = "edit_question",
        skip_all,
        fields(poll_id = %poll_id, requester = %requester)
    )]
    pub async fn edit_question(
        &self,
        requester: &UserId,
        poll_id: &PollId,
        text: &str,
    ) -> Result<Poll, ServiceError> {
        self.polls
            .set_question(requester, poll_id, text)
            .await
            .map_err(|e| tagged(Operation::EditQuestion, e))?;

        self.fetch(poll_id, Operation::EditQuestion).await
    }

    /// Cast `voter`'s single vote and return the poll with live tallies.
    ///
    /// A retry after a timeout is safe: if the first attempt committed, the
    /// retry reports `AlreadyVoted` instead of counting twice.
    #[tracing::instrument(
        name = "vote",
        skip_all,
        fields(poll_id = %poll_id, voter = %voter, option_index = option_index)
    )]
    pub async fn vote(
        &self,
        voter: &UserId,
        poll_id: &PollId,
        option_index: u32,
    ) -> Result<Poll, ServiceError> {
        let option = self
            .ledger
            .cast_vote(voter, poll_id, option_index)
            .await
            .map_err(|e| tagged(Operation::Vote, e))?;

        info!(tally = option.tally, "vote recorded");
        self.fetch(poll_id, Operation::Vote).await
    }

    /// Get a poll by ID.
    pub async fn get_poll(&self, poll_id: &PollId) -> Result<Poll, ServiceError> {
        self.fetch(poll_id, Operation::GetPoll).await
    }

    /// The option `voter` chose in the poll, if they have voted.
    pub async fn voter_choice(
        &self,
        poll_id: &PollId,
        voter: &UserId,
    ) -> Result<Option<Vote>, ServiceError> {
        self.ledger
            .vote_of(poll_id, voter)
            .await
            .map_err(|e| tagged(Operation::VoterChoice, e))
    }

    async fn fetch(&self, poll_id: &PollId, operation: Operation) -> Result<Poll, ServiceError> {
        self.polls
            .get(poll_id)
            .await
            .map_err(|e| tagged(operation, e))?
            .ok_or_else(|| {
                tagged(
                    operation,
                    PollError::NotFound {
                        poll_id: poll_id.clone(),
                    },
                )
            })
    }
}

/// Attach the operation to a store error and log it.
fn tagged(operation: Operation, error: PollError) -> ServiceError {
    if error.is_rejection() {
        warn!(%operation, %error, "request rejected");
    } else {
        error!(%operation, %error, "store failure");
    }
    ServiceError::new(operation, error)
}
