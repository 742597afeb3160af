//! Chat action dispatch.
//!
//! Chat platforms deliver user interactions as an action identifier plus the
//! token the UI attached to the control (`poll/<pollId>` for poll-level
//! buttons, `poll/<pollId>/<index>` for per-option inputs and vote buttons)
//! and, for text inputs, the entered value. [`Command::parse`] validates that
//! triple and [`Dispatcher`] maps it onto [`PollService`].
//!
//! The dispatcher is transport-agnostic: rendering the returned [`Outcome`]
//! is left to the caller.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use quickpoll_types::error::ServiceError;
use quickpoll_types::poll::{Poll, PollId, UserId};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::repository::{PollRepository, VoteLedger};
use crate::service::poll::PollService;

const TOKEN_PREFIX: &str = "poll/";

/// Errors from dispatching a chat action.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed action: {0}")]
    Malformed(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Identifies a poll, or one option of a poll, inside a UI control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollToken {
    pub poll_id: PollId,
    pub index: Option<u32>,
}

impl PollToken {
    pub fn poll(poll_id: PollId) -> Self {
        Self {
            poll_id,
            index: None,
        }
    }

    pub fn option(poll_id: PollId, index: u32) -> Self {
        Self {
            poll_id,
            index: Some(index),
        }
    }
}

impl fmt::Display for PollToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{TOKEN_PREFIX}{}/{index}", self.poll_id),
            None => write!(f, "{TOKEN_PREFIX}{}", self.poll_id),
        }
    }
}

impl FromStr for PollToken {
    type Err = DispatchError;

    /// Accepts `poll/<id>`, `poll/<id>/<index>` and a bare `<id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(TOKEN_PREFIX).unwrap_or(s);
        let mut parts = rest.splitn(2, '/');

        let poll_id = parts
            .next()
            .unwrap_or_default()
            .parse::<PollId>()
            .map_err(|e| DispatchError::Malformed(format!("invalid poll id in '{s}': {e}")))?;
        let index = parts
            .next()
            .map(|index| {
                index
                    .parse::<u32>()
                    .map_err(|e| DispatchError::Malformed(format!("invalid index in '{s}': {e}")))
            })
            .transpose()?;

        Ok(Self { poll_id, index })
    }
}

/// A validated user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a new poll with the given question.
    Create { question: String },
    /// Author typed into option `index`.
    EditOption {
        poll_id: PollId,
        index: u32,
        text: String,
    },
    /// Author pressed "add option".
    AddOption { poll_id: PollId },
    /// Author published the poll to the channel.
    Send { poll_id: PollId },
    /// Author discarded the draft.
    Cancel,
    /// A user chose option `index`.
    Vote { poll_id: PollId, index: u32 },
}

impl Command {
    pub const CREATE: &'static str = "create";
    pub const EDIT_OPTION: &'static str = "option-updated";
    pub const ADD_OPTION: &'static str = "add-option";
    pub const SEND: &'static str = "send";
    pub const CANCEL: &'static str = "cancel";
    pub const VOTE: &'static str = "option-selected";

    /// Validate a raw `(action, token, value)` triple.
    pub fn parse(
        action: &str,
        token: Option<&str>,
        value: Option<&str>,
    ) -> Result<Self, DispatchError> {
        match action {
            Self::CREATE => Ok(Command::Create {
                question: value.or(token).unwrap_or_default().trim().to_string(),
            }),
            Self::EDIT_OPTION => {
                let (poll_id, index) = option_token(action, token)?;
                Ok(Command::EditOption {
                    poll_id,
                    index,
                    text: value.unwrap_or_default().to_string(),
                })
            }
            Self::ADD_OPTION => Ok(Command::AddOption {
                poll_id: poll_token(action, token)?,
            }),
            Self::SEND => Ok(Command::Send {
                poll_id: poll_token(action, token)?,
            }),
            Self::CANCEL => Ok(Command::Cancel),
            Self::VOTE => {
                let (poll_id, index) = option_token(action, token)?;
                Ok(Command::Vote { poll_id, index })
            }
            other => Err(DispatchError::Malformed(format!("unknown action '{other}'"))),
        }
    }
}

fn required_token(action: &str, token: Option<&str>) -> Result<PollToken, DispatchError> {
    token
        .ok_or_else(|| {
            DispatchError::Malformed(format!("action '{action}' requires a poll token"))
        })?
        .parse()
}

fn poll_token(action: &str, token: Option<&str>) -> Result<PollId, DispatchError> {
    Ok(required_token(action, token)?.poll_id)
}

fn option_token(action: &str, token: Option<&str>) -> Result<(PollId, u32), DispatchError> {
    let token = required_token(action, token)?;
    match token.index {
        Some(index) => Ok((token.poll_id, index)),
        None => Err(DispatchError::Malformed(format!(
            "action '{action}' requires an option token, got '{token}'"
        ))),
    }
}

/// What the caller should show after a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", content = "poll", rename_all = "snake_case")]
pub enum Outcome {
    /// The author's editable draft.
    Draft(Poll),
    /// The poll as posted to the channel, with vote buttons.
    Published(Poll),
    /// The posted poll after a vote, with live tallies.
    Voted(Poll),
    /// The draft should be removed.
    Cancelled,
}

/// Maps chat commands onto the poll service.
pub struct Dispatcher<R: PollRepository, L: VoteLedger> {
    service: Arc<PollService<R, L>>,
}

impl<R: PollRepository, L: VoteLedger> Clone for Dispatcher<R, L> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<R: PollRepository, L: VoteLedger> Dispatcher<R, L> {
    pub fn new(service: Arc<PollService<R, L>>) -> Self {
        Self { service }
    }

    /// Run `command` on behalf of `user`.
    pub async fn dispatch(
        &self,
        user: &UserId,
        command: Command,
    ) -> Result<Outcome, DispatchError> {
        debug!(%user, ?command, "dispatching");
        let outcome = match command {
            Command::Create { question } => {
                Outcome::Draft(self.service.create_poll(user, &question).await?)
            }
            Command::EditOption {
                poll_id,
                index,
                text,
            } => Outcome::Draft(self.service.edit_option(user, &poll_id, index, &text).await?),
            Command::AddOption { poll_id } => {
                Outcome::Draft(self.service.add_option(user, &poll_id).await?)
            }
            Command::Send { poll_id } => {
                Outcome::Published(self.service.get_poll(&poll_id).await?)
            }
            Command::Cancel => Outcome::Cancelled,
            Command::Vote { poll_id, index } => {
                Outcome::Voted(self.service.vote(user, &poll_id, index).await?)
            }
        };
        Ok(outcome)
    }
}
