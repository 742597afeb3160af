//! In-memory poll store.
//!
//! Implements both [`PollRepository`] and [`VoteLedger`] over a `DashMap` of
//! poll partitions, using the same record layout as the persistent stores.
//! Every operation on a poll runs under the exclusive guard of that poll's
//! map entry, which makes each check-and-write one indivisible step.
//! Clones share the same underlying data.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quickpoll_types::error::PollError;
use quickpoll_types::poll::{CreatePollRequest, Poll, PollId, PollOption, UserId, Vote};
use tracing::debug;

use super::poll::PollRepository;
use super::records::{
    META_SORT_KEY, OPTION_PREFIX, StoredRecord, assemble_poll, option_sort_key, partition_key,
    poll_records, vote_sort_key,
};
use super::vote::VoteLedger;

/// Records of one poll, keyed by sort key.
type Partition = BTreeMap<String, StoredRecord>;

/// First key after every `_option/...` key (`'0'` follows `'/'`).
const OPTION_KEYS_END: &str = "_option0";

/// Thread-safe in-memory implementation of the storage ports.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPollStore {
    partitions: Arc<DashMap<String, Partition>>,
}

impl InMemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn authorize(partition: &Partition, poll_id: &PollId, requester: &UserId) -> Result<(), PollError> {
    match partition.get(META_SORT_KEY) {
        Some(StoredRecord::Meta { author, .. }) if author == requester => Ok(()),
        Some(StoredRecord::Meta { .. }) => Err(PollError::Forbidden {
            poll_id: poll_id.clone(),
            requester: requester.clone(),
        }),
        _ => Err(PollError::NotFound {
            poll_id: poll_id.clone(),
        }),
    }
}

/// Highest option index present. Option sort keys sort in index order, so
/// only the last one is inspected.
fn last_option_index(partition: &Partition) -> Result<Option<u32>, PollError> {
    let last = partition
        .range::<str, _>((Bound::Included(OPTION_PREFIX), Bound::Excluded(OPTION_KEYS_END)))
        .next_back();
    match last {
        Some((_, StoredRecord::Option(option))) => Ok(Some(option.index)),
        Some((key, other)) => Err(PollError::StoreUnavailable(format!(
            "corrupt record at {key}: {other:?}"
        ))),
        None => Ok(None),
    }
}

fn next_option_index(partition: &Partition, poll_id: &PollId) -> Result<u32, PollError> {
    match last_option_index(partition)? {
        Some(last) => last.checked_add(1).ok_or_else(|| {
            PollError::StoreUnavailable(format!("option indices exhausted on poll {poll_id}"))
        }),
        None => Ok(0),
    }
}

fn not_found(poll_id: &PollId) -> PollError {
    PollError::NotFound {
        poll_id: poll_id.clone(),
    }
}

impl PollRepository for InMemoryPollStore {
    async fn create(&self, request: CreatePollRequest) -> Result<Poll, PollError> {
        let poll = request.into_poll();
        let partition: Partition = poll_records(&poll)
            .into_iter()
            .map(|record| (record.sort_key(), record))
            .collect();

        match self.partitions.entry(partition_key(&poll.id)) {
            Entry::Occupied(_) => {
                return Err(PollError::StoreUnavailable(format!(
                    "poll id {} already allocated",
                    poll.id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(partition);
            }
        }

        debug!(poll_id = %poll.id, options = poll.options.len(), "created poll");
        Ok(poll)
    }

    async fn get(&self, poll_id: &PollId) -> Result<Option<Poll>, PollError> {
        let Some(partition) = self.partitions.get(&partition_key(poll_id)) else {
            return Ok(None);
        };
        Ok(assemble_poll(poll_id, partition.values().cloned()))
    }

    async fn append_option(&self, requester: &UserId, poll_id: &PollId) -> Result<Poll, PollError> {
        let mut partition = self
            .partitions
            .get_mut(&partition_key(poll_id))
            .ok_or_else(|| not_found(poll_id))?;
        authorize(&partition, poll_id, requester)?;

        let index = next_option_index(&partition, poll_id)?;
        partition.insert(
            option_sort_key(index),
            StoredRecord::Option(PollOption::empty(index)),
        );
        debug!(%poll_id, index, "appended option");

        assemble_poll(poll_id, partition.values().cloned()).ok_or_else(|| not_found(poll_id))
    }

    async fn set_option_text(
        &self,
        requester: &UserId,
        poll_id: &PollId,
        index: u32,
        text: &str,
    ) -> Result<(), PollError> {
        let mut partition = self
            .partitions
            .get_mut(&partition_key(poll_id))
            .ok_or_else(|| not_found(poll_id))?;
        authorize(&partition, poll_id, requester)?;

        // `last < index` makes `last + 1` safe.
        let fill_from = match last_option_index(&partition)? {
            Some(last) if last < index => last + 1,
            Some(_) => index,
            None => 0,
        };
        partition.extend((fill_from..index).map(|missing| {
            (
                option_sort_key(missing),
                StoredRecord::Option(PollOption::empty(missing)),
            )
        }));

        match partition
            .entry(option_sort_key(index))
            .or_insert_with(|| StoredRecord::Option(PollOption::empty(index)))
        {
            StoredRecord::Option(option) => option.text = text.to_string(),
            other => {
                return Err(PollError::StoreUnavailable(format!(
                    "corrupt option record at index {index}: {other:?}"
                )));
            }
        }

        debug!(%poll_id, index, "set option text");
        Ok(())
    }

    async fn set_question(
        &self,
        requester: &UserId,
        poll_id: &PollId,
        text: &str,
    ) -> Result<(), PollError> {
        let mut partition = self
            .partitions
            .get_mut(&partition_key(poll_id))
            .ok_or_else(|| not_found(poll_id))?;
        authorize(&partition, poll_id, requester)?;

        if let Some(StoredRecord::Meta { question, .. }) = partition.get_mut(META_SORT_KEY) {
            *question = text.to_string();
        }
        Ok(())
    }
}

impl VoteLedger for InMemoryPollStore {
    async fn cast_vote(
        &self,
        voter: &UserId,
        poll_id: &PollId,
        option_index: u32,
    ) -> Result<PollOption, PollError> {
        let mut partition = self
            .partitions
            .get_mut(&partition_key(poll_id))
            .ok_or_else(|| not_found(poll_id))?;

        let vote_key = vote_sort_key(voter);
        if partition.contains_key(&vote_key) {
            return Err(PollError::AlreadyVoted {
                poll_id: poll_id.clone(),
                voter: voter.clone(),
            });
        }

        let option = match partition.get_mut(&option_sort_key(option_index)) {
            Some(StoredRecord::Option(option)) => {
                option.tally += 1;
                option.clone()
            }
            _ => {
                return Err(PollError::OptionNotFound {
                    poll_id: poll_id.clone(),
                    index: option_index,
                });
            }
        };

        partition.insert(
            vote_key,
            StoredRecord::Vote(Vote {
                poll_id: poll_id.clone(),
                voter: voter.clone(),
                option_index,
            }),
        );

        debug!(%poll_id, %voter, option_index, tally = option.tally, "recorded vote");
        Ok(option)
    }

    async fn vote_of(&self, poll_id: &PollId, voter: &UserId) -> Result<Option<Vote>, PollError> {
        let Some(partition) = self.partitions.get(&partition_key(poll_id)) else {
            return Ok(None);
        };
        match partition.get(&vote_sort_key(voter)) {
            Some(StoredRecord::Vote(vote)) => Ok(Some(vote.clone())),
            _ => Ok(None),
        }
    }

    async fn count_votes(&self, poll_id: &PollId) -> Result<u64, PollError> {
        let Some(partition) = self.partitions.get(&partition_key(poll_id)) else {
            return Ok(0);
        };
        let count = partition
            .values()
            .filter(|record| matches!(record, StoredRecord::Vote(_)))
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract;

    #[tokio::test]
    async fn test_create_seeds_default_options() {
        contract::create_seeds_default_options(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_create_with_supplied_options() {
        contract::create_with_supplied_options(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_create_then_get_roundtrip() {
        contract::create_then_get_roundtrip(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_get_missing_poll() {
        contract::get_missing_poll(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_author_appends_option() {
        contract::author_appends_option(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_non_author_cannot_edit() {
        contract::non_author_cannot_edit(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_author_sets_option_text() {
        contract::author_sets_option_text(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_set_option_text_fills_forward() {
        contract::set_option_text_fills_forward(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_edit_preserves_tally() {
        contract::edit_preserves_tally(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_author_sets_question() {
        contract::author_sets_question(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_mutating_missing_poll() {
        contract::mutating_missing_poll(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_vote_increments_tally() {
        contract::vote_increments_tally(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_second_vote_rejected() {
        contract::second_vote_rejected(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_vote_for_missing_option() {
        contract::vote_for_missing_option(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_votes_from_many_users() {
        contract::votes_from_many_users(InMemoryPollStore::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_same_voter() {
        contract::concurrent_votes_same_voter(InMemoryPollStore::new(), 16).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_distinct_voters() {
        contract::concurrent_votes_distinct_voters(InMemoryPollStore::new(), 16).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_get_distinct_indices() {
        contract::concurrent_appends_get_distinct_indices(InMemoryPollStore::new(), 8).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_large_fill_does_not_stall_other_polls() {
        contract::large_fill_does_not_stall_other_polls(InMemoryPollStore::new(), 20_000).await;
    }

    #[tokio::test]
    async fn test_empty_voter_id_is_an_ordinary_voter() {
        contract::empty_voter_id_is_an_ordinary_voter(InMemoryPollStore::new()).await;
    }

    #[tokio::test]
    async fn test_append_after_last_index_reports_exhaustion() {
        let store = InMemoryPollStore::new();
        let author = UserId::from("u1");
        let poll = store
            .create(CreatePollRequest::new("u1", "full?"))
            .await
            .unwrap();

        store
            .partitions
            .get_mut(&partition_key(&poll.id))
            .unwrap()
            .insert(
                option_sort_key(u32::MAX),
                StoredRecord::Option(PollOption::empty(u32::MAX)),
            );

        let err = store.append_option(&author, &poll.id).await.unwrap_err();
        assert!(matches!(err, PollError::StoreUnavailable(_)));

        // Setting text on the top index needs no fill and still works.
        store
            .set_option_text(&author, &poll.id, u32::MAX, "last")
            .await
            .unwrap();
        let stored = store.get(&poll.id).await.unwrap().unwrap();
        assert_eq!(stored.options.len(), 4);
        assert_eq!(stored.options[3].text, "last");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = InMemoryPollStore::new();
        let poll = store
            .create(CreatePollRequest::new("u1", "shared?"))
            .await
            .unwrap();

        let other = store.clone();
        other.cast_vote(&UserId::from("u2"), &poll.id, 1).await.unwrap();

        let seen = store.get(&poll.id).await.unwrap().unwrap();
        assert_eq!(seen.options[1].tally, 1);
    }
}
