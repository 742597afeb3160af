use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Number of empty options a poll is seeded with when the author supplies none.
pub const DEFAULT_OPTION_COUNT: u32 = 3;

/// Unique identifier for a poll, wrapping a UUID v7.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PollId(pub Uuid);

impl PollId {
    /// Allocate a fresh, globally unique PollId.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for PollId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PollId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier of a chat user (poll author or voter).
///
/// Identity is established by the caller; the store treats it as an opaque
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One selectable choice within a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    /// Position of the option. Stable once assigned; options are append-only.
    pub index: u32,
    pub text: String,
    /// Number of votes attributed to this option. Only ever increases.
    pub tally: u64,
}

impl PollOption {
    /// A fresh option with empty text and no votes.
    pub fn empty(index: u32) -> Self {
        Self {
            index,
            text: String::new(),
            tally: 0,
        }
    }
}

/// A question with an ordered set of options, owned by one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    /// Immutable after creation. Only the author may edit the poll.
    pub author: UserId,
    pub question: String,
    /// Ordered by `index`.
    pub options: Vec<PollOption>,
}

impl Poll {
    /// Whether `user` is allowed to edit this poll's question and options.
    pub fn is_author(&self, user: &UserId) -> bool {
        &self.author == user
    }

    pub fn option(&self, index: u32) -> Option<&PollOption> {
        self.options.iter().find(|o| o.index == index)
    }

    /// The index a newly appended option receives, or `None` once the last
    /// option sits at `u32::MAX`.
    pub fn next_option_index(&self) -> Option<u32> {
        match self.options.last() {
            Some(last) => last.index.checked_add(1),
            None => Some(0),
        }
    }

    /// Sum of all option tallies. Equals the number of recorded votes.
    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| o.tally).sum()
    }
}

/// A single user's one-time choice of an option within a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub poll_id: PollId,
    pub voter: UserId,
    pub option_index: u32,
}

/// Request to create a new poll. Only `author` and `question` are required --
/// when `options` is `None` the poll gets [`DEFAULT_OPTION_COUNT`] empty options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePollRequest {
    pub author: UserId,
    pub question: String,
    pub options: Option<Vec<String>>,
}

impl CreatePollRequest {
    pub fn new(author: impl Into<UserId>, question: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            question: question.into(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    /// Build the poll this request describes under a freshly allocated id.
    pub fn into_poll(self) -> Poll {
        let options = match self.options {
            Some(texts) => texts
                .into_iter()
                .zip(0u32..)
                .map(|(text, index)| PollOption {
                    index,
                    text,
                    tally: 0,
                })
                .collect(),
            None => (0..DEFAULT_OPTION_COUNT).map(PollOption::empty).collect(),
        };

        Poll {
            id: PollId::new(),
            author: self.author,
            question: self.question,
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_id_display_roundtrip() {
        let id = PollId::new();
        let parsed: PollId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_poll_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<PollId>().is_err());
    }

    #[test]
    fn test_poll_ids_are_unique() {
        assert_ne!(PollId::new(), PollId::new());
    }

    #[test]
    fn test_request_without_options_seeds_defaults() {
        let poll = CreatePollRequest::new("u1", "2+2?").into_poll();
        assert_eq!(poll.options.len(), DEFAULT_OPTION_COUNT as usize);
        assert!(poll.options.iter().all(|o| o.text.is_empty() && o.tally == 0));
        let indices: Vec<u32> = poll.options.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(poll.author, UserId::from("u1"));
        assert_eq!(poll.question, "2+2?");
    }

    #[test]
    fn test_request_with_options_keeps_order() {
        let poll = CreatePollRequest::new("u1", "Lunch?")
            .with_options(vec!["Pizza".to_string(), "Sushi".to_string()])
            .into_poll();
        assert_eq!(poll.options.len(), 2);
        assert_eq!(poll.options[1].index, 1);
        assert_eq!(poll.options[1].text, "Sushi");
        assert_eq!(poll.next_option_index(), Some(2));
    }

    #[test]
    fn test_next_option_index_saturates_at_max() {
        let mut poll = CreatePollRequest::new("u1", "q").into_poll();
        poll.options.push(PollOption::empty(u32::MAX));
        assert_eq!(poll.next_option_index(), None);

        poll.options.clear();
        assert_eq!(poll.next_option_index(), Some(0));
    }

    #[test]
    fn test_total_votes_sums_tallies() {
        let mut poll = CreatePollRequest::new("u1", "q").into_poll();
        poll.options[0].tally = 1;
        poll.options[2].tally = 4;
        assert_eq!(poll.total_votes(), 5);
        assert_eq!(poll.option(2).map(|o| o.tally), Some(4));
        assert!(poll.option(7).is_none());
    }

    #[test]
    fn test_user_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&UserId::from("U123")).unwrap();
        assert_eq!(json, "\"U123\"");
    }
}
