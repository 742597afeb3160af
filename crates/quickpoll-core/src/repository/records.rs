//! Persisted record layout shared by every storage backend.
//!
//! A poll is stored as a group of records under one partition key
//! (`poll/<pollId>`), distinguished by sort key:
//!
//! | Record   | sort key                        | fields                      |
//! |----------|---------------------------------|-----------------------------|
//! | metadata | `_meta`                         | author, question            |
//! | option   | `_option/<index, 10 digits>`    | text, tally                 |
//! | vote     | `vote/<voterId>`                | option index                |
//!
//! Option indices are zero-padded so that sort-key order is index order.
//! Reading a poll is a single range read over its partition followed by
//! [`assemble_poll`].

use quickpoll_types::poll::{Poll, PollId, PollOption, UserId, Vote};

pub const META_SORT_KEY: &str = "_meta";
pub const OPTION_PREFIX: &str = "_option/";
pub const VOTE_PREFIX: &str = "vote/";

const PARTITION_PREFIX: &str = "poll/";

pub fn partition_key(poll_id: &PollId) -> String {
    format!("{PARTITION_PREFIX}{poll_id}")
}

pub fn option_sort_key(index: u32) -> String {
    format!("{OPTION_PREFIX}{index:010}")
}

pub fn vote_sort_key(voter: &UserId) -> String {
    format!("{VOTE_PREFIX}{voter}")
}

/// What a sort key identifies within a poll partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Meta,
    Option(u32),
    Vote(UserId),
}

impl RecordKind {
    /// Classify a record by its sort-key prefix. Returns `None` for keys that
    /// do not belong to the layout (including malformed option indices).
    /// Any suffix after `vote/` is a voter id, the empty one included.
    pub fn classify(sort_key: &str) -> Option<Self> {
        if sort_key == META_SORT_KEY {
            return Some(RecordKind::Meta);
        }
        if let Some(index) = sort_key.strip_prefix(OPTION_PREFIX) {
            return index.parse().ok().map(RecordKind::Option);
        }
        sort_key
            .strip_prefix(VOTE_PREFIX)
            .map(|voter| RecordKind::Vote(UserId::from(voter)))
    }
}

/// One decoded record of a poll partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredRecord {
    Meta { author: UserId, question: String },
    Option(PollOption),
    Vote(Vote),
}

impl StoredRecord {
    pub fn sort_key(&self) -> String {
        match self {
            StoredRecord::Meta { .. } => META_SORT_KEY.to_string(),
            StoredRecord::Option(option) => option_sort_key(option.index),
            StoredRecord::Vote(vote) => vote_sort_key(&vote.voter),
        }
    }
}

/// Decompose a poll into the records that persist it. Votes are never part
/// of a freshly created poll, so none are emitted.
pub fn poll_records(poll: &Poll) -> Vec<StoredRecord> {
    let mut records = Vec::with_capacity(poll.options.len() + 1);
    records.push(StoredRecord::Meta {
        author: poll.author.clone(),
        question: poll.question.clone(),
    });
    records.extend(poll.options.iter().cloned().map(StoredRecord::Option));
    records
}

/// Rebuild a poll from the records of its partition.
///
/// Records may arrive in any order; options are returned sorted by index.
/// Vote records are ignored (tallies already reflect them). Returns `None`
/// when the partition has no metadata record.
pub fn assemble_poll(
    poll_id: &PollId,
    records: impl IntoIterator<Item = StoredRecord>,
) -> Option<Poll> {
    let mut meta = None;
    let mut options = Vec::new();

    for record in records {
        match record {
            StoredRecord::Meta { author, question } => meta = Some((author, question)),
            StoredRecord::Option(option) => options.push(option),
            StoredRecord::Vote(_) => {}
        }
    }

    let (author, question) = meta?;
    options.sort_by_key(|o| o.index);

    Some(Poll {
        id: poll_id.clone(),
        author,
        question,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickpoll_types::poll::CreatePollRequest;

    #[test]
    fn test_option_sort_keys_order_by_index() {
        let mut keys: Vec<String> = [10, 2, 100, 0].into_iter().map(option_sort_key).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "_option/0000000000",
                "_option/0000000002",
                "_option/0000000010",
                "_option/0000000100",
            ]
        );
    }

    #[test]
    fn test_classify_sort_keys() {
        assert_eq!(RecordKind::classify("_meta"), Some(RecordKind::Meta));
        assert_eq!(
            RecordKind::classify(&option_sort_key(7)),
            Some(RecordKind::Option(7))
        );
        assert_eq!(
            RecordKind::classify("vote/U42"),
            Some(RecordKind::Vote(UserId::from("U42")))
        );
        assert_eq!(RecordKind::classify("_option/abc"), None);
        assert_eq!(
            RecordKind::classify("vote/"),
            Some(RecordKind::Vote(UserId::from("")))
        );
        assert_eq!(RecordKind::classify("something-else"), None);
    }

    #[test]
    fn test_partition_key_format() {
        let poll_id = PollId::new();
        assert_eq!(partition_key(&poll_id), format!("poll/{poll_id}"));
    }

    #[test]
    fn test_assemble_roundtrips_records() {
        let poll = CreatePollRequest::new("u1", "2+2?").into_poll();
        let mut records = poll_records(&poll);
        records.reverse();
        records.push(StoredRecord::Vote(Vote {
            poll_id: poll.id.clone(),
            voter: UserId::from("u2"),
            option_index: 0,
        }));

        let assembled = assemble_poll(&poll.id, records).unwrap();
        assert_eq!(assembled, poll);
    }

    #[test]
    fn test_assemble_without_meta_is_none() {
        let poll_id = PollId::new();
        let records = vec![StoredRecord::Option(PollOption::empty(0))];
        assert!(assemble_poll(&poll_id, records).is_none());
    }
}
