use std::fmt;

use thiserror::Error;

use crate::poll::{PollId, UserId};

/// Errors from poll storage operations (used by trait definitions in quickpoll-core).
///
/// Every variant except `StoreUnavailable` is a definitive rejection: the
/// operation was refused and nothing was written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("poll {poll_id} not found")]
    NotFound { poll_id: PollId },

    #[error("user '{requester}' is not the author of poll {poll_id}")]
    Forbidden { poll_id: PollId, requester: UserId },

    #[error("user '{voter}' has already voted in poll {poll_id}")]
    AlreadyVoted { poll_id: PollId, voter: UserId },

    #[error("poll {poll_id} has no option {index}")]
    OptionNotFound { poll_id: PollId, index: u32 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl PollError {
    /// Transient failures the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PollError::StoreUnavailable(_))
    }

    /// Failures caused by what the user asked for ("you can't do that").
    pub fn is_rejection(&self) -> bool {
        !self.is_retryable()
    }
}

/// Service operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreatePoll,
    AddOption,
    EditOption,
    EditQuestion,
    Vote,
    GetPoll,
    VoterChoice,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreatePoll => write!(f, "create poll"),
            Operation::AddOption => write!(f, "add option"),
            Operation::EditOption => write!(f, "edit option"),
            Operation::EditQuestion => write!(f, "edit question"),
            Operation::Vote => write!(f, "vote"),
            Operation::GetPoll => write!(f, "get poll"),
            Operation::VoterChoice => write!(f, "voter choice"),
        }
    }
}

/// A [`PollError`] tagged with the service operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {source}")]
pub struct ServiceError {
    pub operation: Operation,
    #[source]
    pub source: PollError,
}

impl ServiceError {
    pub fn new(operation: Operation, source: PollError) -> Self {
        Self { operation, source }
    }

    pub fn kind(&self) -> &PollError {
        &self.source
    }

    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_error_display() {
        let poll_id = PollId::new();
        let err = PollError::OptionNotFound {
            poll_id: poll_id.clone(),
            index: 99,
        };
        assert_eq!(err.to_string(), format!("poll {poll_id} has no option 99"));
    }

    #[test]
    fn test_only_store_failures_are_retryable() {
        let poll_id = PollId::new();
        assert!(PollError::StoreUnavailable("disk I/O error".to_string()).is_retryable());
        assert!(
            !PollError::AlreadyVoted {
                poll_id: poll_id.clone(),
                voter: UserId::from("u2"),
            }
            .is_retryable()
        );
        assert!(
            PollError::Forbidden {
                poll_id,
                requester: UserId::from("u2"),
            }
            .is_rejection()
        );
    }

    #[test]
    fn test_service_error_carries_operation() {
        let poll_id = PollId::new();
        let err = ServiceError::new(
            Operation::Vote,
            PollError::NotFound {
                poll_id: poll_id.clone(),
            },
        );
        assert_eq!(err.to_string(), format!("vote failed: poll {poll_id} not found"));
        assert!(matches!(err.kind(), PollError::NotFound { .. }));
        assert!(!err.is_retryable());
    }
}
