//! SQLite poll store.
//!
//! Implements `PollRepository` and `VoteLedger` from `quickpoll-core` over the
//! `poll_records` table, one row per record of the shared partition layout.
//! Every mutation runs in a transaction on the single writer connection;
//! the author check, the vote-uniqueness check and the tally increment all
//! commit or roll back together.

use quickpoll_core::repository::records::{
    META_SORT_KEY, OPTION_PREFIX, RecordKind, StoredRecord, assemble_poll, option_sort_key,
    partition_key, poll_records, vote_sort_key,
};
use quickpoll_core::repository::{APPEND_OPTION_ATTEMPTS, PollRepository, VoteLedger};
use quickpoll_types::error::PollError;
use quickpoll_types::poll::{CreatePollRequest, Poll, PollId, PollOption, UserId, Vote};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, warn};

use super::pool::DatabasePool;

/// SQLite-backed implementation of the storage ports.
#[derive(Clone)]
pub struct SqlitePollStore {
    pool: DatabasePool,
}

impl SqlitePollStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct RecordRow {
    sort: String,
    author: Option<String>,
    question: Option<String>,
    option_index: Option<i64>,
    option_text: Option<String>,
    tally: i64,
    voter: Option<String>,
}

impl RecordRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            sort: row.try_get("sort")?,
            author: row.try_get("author")?,
            question: row.try_get("question")?,
            option_index: row.try_get("option_index")?,
            option_text: row.try_get("option_text")?,
            tally: row.try_get("tally")?,
            voter: row.try_get("voter")?,
        })
    }

    /// Decode into a record. Rows whose sort key is outside the layout are
    /// skipped; rows whose columns contradict their sort key are corrupt.
    fn into_record(self, poll_id: &PollId) -> Result<Option<StoredRecord>, PollError> {
        let Some(kind) = RecordKind::classify(&self.sort) else {
            warn!(%poll_id, sort = %self.sort, "skipping unrecognised record");
            return Ok(None);
        };

        let record = match kind {
            RecordKind::Meta => StoredRecord::Meta {
                author: UserId::from(self.author.unwrap_or_default()),
                question: self.question.unwrap_or_default(),
            },
            RecordKind::Option(index) => StoredRecord::Option(PollOption {
                index,
                text: self.option_text.unwrap_or_default(),
                tally: to_tally(self.tally)?,
            }),
            RecordKind::Vote(voter) => {
                let option_index = self
                    .option_index
                    .ok_or_else(|| corrupt(&self.sort, "vote without option index"))
                    .and_then(|index| to_index(&self.sort, index))?;
                if self.voter.as_deref().is_some_and(|stored| stored != voter.as_str()) {
                    return Err(corrupt(&self.sort, "voter column disagrees with key"));
                }
                StoredRecord::Vote(Vote {
                    poll_id: poll_id.clone(),
                    voter,
                    option_index,
                })
            }
        };
        Ok(Some(record))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn store_error(err: sqlx::Error) -> PollError {
    PollError::StoreUnavailable(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE"))
}

fn corrupt(sort: &str, reason: &str) -> PollError {
    PollError::StoreUnavailable(format!("corrupt record {sort}: {reason}"))
}

fn to_tally(tally: i64) -> Result<u64, PollError> {
    u64::try_from(tally).map_err(|_| PollError::StoreUnavailable(format!("negative tally {tally}")))
}

fn to_index(sort: &str, index: i64) -> Result<u32, PollError> {
    u32::try_from(index).map_err(|_| corrupt(sort, "option index out of range"))
}

fn not_found(poll_id: &PollId) -> PollError {
    PollError::NotFound {
        poll_id: poll_id.clone(),
    }
}

/// Load and assemble a poll inside an open transaction.
async fn load_poll(
    tx: &mut Transaction<'static, Sqlite>,
    poll_id: &PollId,
) -> Result<Option<Poll>, PollError> {
    let rows = sqlx::query("SELECT * FROM poll_records WHERE partition = ? ORDER BY sort")
        .bind(partition_key(poll_id))
        .fetch_all(&mut **tx)
        .await
        .map_err(store_error)?;
    assemble_rows(poll_id, &rows)
}

fn assemble_rows(poll_id: &PollId, rows: &[SqliteRow]) -> Result<Option<Poll>, PollError> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let row = RecordRow::from_row(row).map_err(store_error)?;
        if let Some(record) = row.into_record(poll_id)? {
            records.push(record);
        }
    }
    Ok(assemble_poll(poll_id, records))
}

/// Check that the poll exists and `requester` wrote it.
async fn authorize(
    tx: &mut Transaction<'static, Sqlite>,
    poll_id: &PollId,
    requester: &UserId,
) -> Result<(), PollError> {
    let author: Option<Option<String>> =
        sqlx::query_scalar("SELECT author FROM poll_records WHERE partition = ? AND sort = ?")
            .bind(partition_key(poll_id))
            .bind(META_SORT_KEY)
            .fetch_optional(&mut **tx)
            .await
            .map_err(store_error)?;

    match author {
        None => Err(not_found(poll_id)),
        Some(author) if author.as_deref() == Some(requester.as_str()) => Ok(()),
        Some(_) => Err(PollError::Forbidden {
            poll_id: poll_id.clone(),
            requester: requester.clone(),
        }),
    }
}

/// Highest option index present in the poll, if any.
async fn last_option_index(
    tx: &mut Transaction<'static, Sqlite>,
    poll_id: &PollId,
) -> Result<Option<u32>, PollError> {
    let last: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(option_index) FROM poll_records WHERE partition = ? AND kind = 'option'",
    )
    .bind(partition_key(poll_id))
    .fetch_one(&mut **tx)
    .await
    .map_err(store_error)?;
    last.map(|index| to_index("_option", index)).transpose()
}

async fn next_option_index(
    tx: &mut Transaction<'static, Sqlite>,
    poll_id: &PollId,
) -> Result<u32, PollError> {
    match last_option_index(tx, poll_id).await? {
        Some(last) => last.checked_add(1).ok_or_else(|| {
            PollError::StoreUnavailable(format!("option indices exhausted on poll {poll_id}"))
        }),
        None => Ok(0),
    }
}

/// Insert empty options for every index in `from..to` with one statement.
async fn fill_options(
    tx: &mut Transaction<'static, Sqlite>,
    poll_id: &PollId,
    from: u32,
    to: u32,
) -> Result<(), PollError> {
    if from >= to {
        return Ok(());
    }
    sqlx::query(
        r#"WITH RECURSIVE seq(i) AS (
               SELECT ?
               UNION ALL
               SELECT i + 1 FROM seq WHERE i + 1 < ?
           )
           INSERT OR IGNORE INTO poll_records (partition, sort, kind, option_index, option_text, tally)
           SELECT ?, ? || printf('%010d', i), 'option', i, '', 0 FROM seq"#,
    )
    .bind(i64::from(from))
    .bind(i64::from(to))
    .bind(partition_key(poll_id))
    .bind(OPTION_PREFIX)
    .execute(&mut **tx)
    .await
    .map_err(store_error)?;
    Ok(())
}

async fn insert_record(
    tx: &mut Transaction<'static, Sqlite>,
    poll_id: &PollId,
    record: &StoredRecord,
) -> Result<(), sqlx::Error> {
    let query = match record {
        StoredRecord::Meta { author, question } => sqlx::query(
            "INSERT INTO poll_records (partition, sort, kind, author, question) VALUES (?, ?, 'meta', ?, ?)",
        )
        .bind(partition_key(poll_id))
        .bind(record.sort_key())
        .bind(author.as_str().to_string())
        .bind(question.clone()),
        StoredRecord::Option(option) => sqlx::query(
            "INSERT INTO poll_records (partition, sort, kind, option_index, option_text, tally) VALUES (?, ?, 'option', ?, ?, ?)",
        )
        .bind(partition_key(poll_id))
        .bind(record.sort_key())
        .bind(i64::from(option.index))
        .bind(option.text.clone())
        .bind(option.tally as i64),
        StoredRecord::Vote(vote) => sqlx::query(
            "INSERT INTO poll_records (partition, sort, kind, voter, option_index) VALUES (?, ?, 'vote', ?, ?)",
        )
        .bind(partition_key(poll_id))
        .bind(record.sort_key())
        .bind(vote.voter.as_str().to_string())
        .bind(i64::from(vote.option_index)),
    };
    query.execute(&mut **tx).await.map(|_| ())
}

// ---------------------------------------------------------------------------
// PollRepository implementation
// ---------------------------------------------------------------------------

impl PollRepository for SqlitePollStore {
    async fn create(&self, request: CreatePollRequest) -> Result<Poll, PollError> {
        let poll = request.into_poll();
        let mut tx = self.pool.writer.begin().await.map_err(store_error)?;

        for record in poll_records(&poll) {
            match insert_record(&mut tx, &poll.id, &record).await {
                Ok(()) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(PollError::StoreUnavailable(format!(
                        "poll id {} already allocated",
                        poll.id
                    )));
                }
                Err(e) => return Err(store_error(e)),
            }
        }

        tx.commit().await.map_err(store_error)?;
        debug!(poll_id = %poll.id, options = poll.options.len(), "created poll");
        Ok(poll)
    }

    async fn get(&self, poll_id: &PollId) -> Result<Option<Poll>, PollError> {
        let rows = sqlx::query("SELECT * FROM poll_records WHERE partition = ? ORDER BY sort")
            .bind(partition_key(poll_id))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(store_error)?;
        assemble_rows(poll_id, &rows)
    }

    /// Claims the next index with an insert that fails if the key exists,
    /// retrying on conflict. The single writer connection already serializes
    /// appends from this pool, so a conflict only arises when the next option
    /// key is held by a row the index query does not count as an option. The
    /// retries then run out and the append reports `StoreUnavailable`.
    async fn append_option(&self, requester: &UserId, poll_id: &PollId) -> Result<Poll, PollError> {
        for attempt in 1..=APPEND_OPTION_ATTEMPTS {
            let mut tx = self.pool.writer.begin().await.map_err(store_error)?;
            authorize(&mut tx, poll_id, requester).await?;

            let index = next_option_index(&mut tx, poll_id).await?;
            let record = StoredRecord::Option(PollOption::empty(index));
            match insert_record(&mut tx, poll_id, &record).await {
                Ok(()) => {}
                Err(e) if is_unique_violation(&e) => {
                    // Another writer claimed this index first; re-read and retry.
                    debug!(%poll_id, index, attempt, "option index taken, retrying");
                    continue;
                }
                Err(e) => return Err(store_error(e)),
            }

            let poll = load_poll(&mut tx, poll_id)
                .await?
                .ok_or_else(|| not_found(poll_id))?;
            tx.commit().await.map_err(store_error)?;
            debug!(%poll_id, index, "appended option");
            return Ok(poll);
        }

        Err(PollError::StoreUnavailable(format!(
            "could not claim an option index on poll {poll_id} after {APPEND_OPTION_ATTEMPTS} attempts"
        )))
    }

    async fn set_option_text(
        &self,
        requester: &UserId,
        poll_id: &PollId,
        index: u32,
        text: &str,
    ) -> Result<(), PollError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_error)?;
        authorize(&mut tx, poll_id, requester).await?;

        // `last < index` makes `last + 1` safe.
        let fill_from = match last_option_index(&mut tx, poll_id).await? {
            Some(last) if last < index => last + 1,
            Some(_) => index,
            None => 0,
        };
        fill_options(&mut tx, poll_id, fill_from, index).await?;

        sqlx::query(
            r#"INSERT INTO poll_records (partition, sort, kind, option_index, option_text, tally)
               VALUES (?, ?, 'option', ?, ?, 0)
               ON CONFLICT (partition, sort) DO UPDATE SET option_text = excluded.option_text"#,
        )
        .bind(partition_key(poll_id))
        .bind(option_sort_key(index))
        .bind(i64::from(index))
        .bind(text)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        debug!(%poll_id, index, "set option text");
        Ok(())
    }

    async fn set_question(
        &self,
        requester: &UserId,
        poll_id: &PollId,
        text: &str,
    ) -> Result<(), PollError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_error)?;
        authorize(&mut tx, poll_id, requester).await?;

        sqlx::query("UPDATE poll_records SET question = ? WHERE partition = ? AND sort = ?")
            .bind(text)
            .bind(partition_key(poll_id))
            .bind(META_SORT_KEY)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// VoteLedger implementation
// ---------------------------------------------------------------------------

impl VoteLedger for SqlitePollStore {
    async fn cast_vote(
        &self,
        voter: &UserId,
        poll_id: &PollId,
        option_index: u32,
    ) -> Result<PollOption, PollError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_error)?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM poll_records WHERE partition = ? AND sort = ?")
                .bind(partition_key(poll_id))
                .bind(META_SORT_KEY)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_error)?;
        if exists.is_none() {
            return Err(not_found(poll_id));
        }

        let vote = StoredRecord::Vote(Vote {
            poll_id: poll_id.clone(),
            voter: voter.clone(),
            option_index,
        });
        match insert_record(&mut tx, poll_id, &vote).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(PollError::AlreadyVoted {
                    poll_id: poll_id.clone(),
                    voter: voter.clone(),
                });
            }
            Err(e) => return Err(store_error(e)),
        }

        let updated = sqlx::query(
            r#"UPDATE poll_records SET tally = tally + 1
               WHERE partition = ? AND sort = ? AND kind = 'option'
               RETURNING option_text, tally"#,
        )
        .bind(partition_key(poll_id))
        .bind(option_sort_key(option_index))
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        let Some(row) = updated else {
            tx.rollback().await.map_err(store_error)?;
            return Err(PollError::OptionNotFound {
                poll_id: poll_id.clone(),
                index: option_index,
            });
        };

        let text: Option<String> = row.try_get("option_text").map_err(store_error)?;
        let tally: i64 = row.try_get("tally").map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;

        debug!(%poll_id, %voter, option_index, tally, "recorded vote");
        Ok(PollOption {
            index: option_index,
            text: text.unwrap_or_default(),
            tally: to_tally(tally)?,
        })
    }

    async fn vote_of(&self, poll_id: &PollId, voter: &UserId) -> Result<Option<Vote>, PollError> {
        let index: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT option_index FROM poll_records WHERE partition = ? AND sort = ? AND kind = 'vote'",
        )
        .bind(partition_key(poll_id))
        .bind(vote_sort_key(voter))
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(store_error)?;

        let Some(index) = index else {
            return Ok(None);
        };
        let sort = vote_sort_key(voter);
        let option_index = index
            .ok_or_else(|| corrupt(&sort, "vote without option index"))
            .and_then(|index| to_index(&sort, index))?;

        Ok(Some(Vote {
            poll_id: poll_id.clone(),
            voter: voter.clone(),
            option_index,
        }))
    }

    async fn count_votes(&self, poll_id: &PollId) -> Result<u64, PollError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM poll_records WHERE partition = ? AND kind = 'vote'",
        )
        .bind(partition_key(poll_id))
        .fetch_one(&self.pool.reader)
        .await
        .map_err(store_error)?;
        to_tally(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickpoll_core::contract;

    async fn test_store() -> SqlitePollStore {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        SqlitePollStore::new(DatabasePool::new(&url).await.unwrap())
    }

    #[tokio::test]
    async fn test_create_seeds_default_options() {
        contract::create_seeds_default_options(test_store().await).await;
    }

    #[tokio::test]
    async fn test_create_with_supplied_options() {
        contract::create_with_supplied_options(test_store().await).await;
    }

    #[tokio::test]
    async fn test_create_then_get_roundtrip() {
        contract::create_then_get_roundtrip(test_store().await).await;
    }

    #[tokio::test]
    async fn test_get_missing_poll() {
        contract::get_missing_poll(test_store().await).await;
    }

    #[tokio::test]
    async fn test_author_appends_option() {
        contract::author_appends_option(test_store().await).await;
    }

    #[tokio::test]
    async fn test_non_author_cannot_edit() {
        contract::non_author_cannot_edit(test_store().await).await;
    }

    #[tokio::test]
    async fn test_author_sets_option_text() {
        contract::author_sets_option_text(test_store().await).await;
    }

    #[tokio::test]
    async fn test_set_option_text_fills_forward() {
        contract::set_option_text_fills_forward(test_store().await).await;
    }

    #[tokio::test]
    async fn test_edit_preserves_tally() {
        contract::edit_preserves_tally(test_store().await).await;
    }

    #[tokio::test]
    async fn test_author_sets_question() {
        contract::author_sets_question(test_store().await).await;
    }

    #[tokio::test]
    async fn test_mutating_missing_poll() {
        contract::mutating_missing_poll(test_store().await).await;
    }

    #[tokio::test]
    async fn test_vote_increments_tally() {
        contract::vote_increments_tally(test_store().await).await;
    }

    #[tokio::test]
    async fn test_second_vote_rejected() {
        contract::second_vote_rejected(test_store().await).await;
    }

    #[tokio::test]
    async fn test_vote_for_missing_option() {
        contract::vote_for_missing_option(test_store().await).await;
    }

    #[tokio::test]
    async fn test_votes_from_many_users() {
        contract::votes_from_many_users(test_store().await).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_same_voter() {
        contract::concurrent_votes_same_voter(test_store().await, 16).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_distinct_voters() {
        contract::concurrent_votes_distinct_voters(test_store().await, 16).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_get_distinct_indices() {
        contract::concurrent_appends_get_distinct_indices(test_store().await, 8).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_large_fill_does_not_stall_other_polls() {
        contract::large_fill_does_not_stall_other_polls(test_store().await, 20_000).await;
    }

    #[tokio::test]
    async fn test_empty_voter_id_is_an_ordinary_voter() {
        contract::empty_voter_id_is_an_ordinary_voter(test_store().await).await;
    }

    #[tokio::test]
    async fn test_fill_writes_canonical_option_keys() {
        let store = test_store().await;
        let author = UserId::from("u1");
        let poll = store
            .create(CreatePollRequest::new("u1", "keys?"))
            .await
            .unwrap();

        store
            .set_option_text(&author, &poll.id, 12, "twelve")
            .await
            .unwrap();

        let keys: Vec<(String, i64)> = sqlx::query_as(
            "SELECT sort, option_index FROM poll_records WHERE partition = ? AND kind = 'option' ORDER BY sort",
        )
        .bind(partition_key(&poll.id))
        .fetch_all(&store.pool.reader)
        .await
        .unwrap();

        let expected: Vec<(String, i64)> =
            (0..=12).map(|i| (option_sort_key(i), i64::from(i))).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_append_conflict_exhausts_retries() {
        let store = test_store().await;
        let author = UserId::from("u1");
        let poll = store
            .create(CreatePollRequest::new("u1", "blocked?"))
            .await
            .unwrap();

        // A row the index query ignores sits on the next option key.
        sqlx::query("INSERT INTO poll_records (partition, sort, kind) VALUES (?, ?, 'meta')")
            .bind(partition_key(&poll.id))
            .bind(option_sort_key(3))
            .execute(&store.pool.writer)
            .await
            .unwrap();

        let err = store.append_option(&author, &poll.id).await.unwrap_err();
        match err {
            PollError::StoreUnavailable(message) => {
                assert!(message.contains("attempts"), "unexpected message: {message}")
            }
            other => panic!("unexpected error {other:?}"),
        }

        // Nothing from the failed attempts was committed.
        let options: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM poll_records WHERE partition = ? AND kind = 'option'",
        )
        .bind(partition_key(&poll.id))
        .fetch_one(&store.pool.reader)
        .await
        .unwrap();
        assert_eq!(options, 3);
    }

    #[tokio::test]
    async fn test_rejected_vote_leaves_no_record() {
        let store = test_store().await;
        let poll = store
            .create(CreatePollRequest::new("u1", "2+2?"))
            .await
            .unwrap();
        let voter = UserId::from("u2");

        let err = store.cast_vote(&voter, &poll.id, 9).await.unwrap_err();
        assert!(matches!(err, PollError::OptionNotFound { index: 9, .. }));
        assert!(store.vote_of(&poll.id, &voter).await.unwrap().is_none());
        assert_eq!(store.count_votes(&poll.id).await.unwrap(), 0);

        // The rolled-back attempt must not block a valid vote.
        store.cast_vote(&voter, &poll.id, 0).await.unwrap();
        assert_eq!(store.count_votes(&poll.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_sort_keys_are_ignored() {
        let store = test_store().await;
        let poll = store
            .create(CreatePollRequest::new("u1", "2+2?"))
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO poll_records (partition, sort, kind) VALUES (?, 'zzz/extra', 'meta')",
        )
        .bind(partition_key(&poll.id))
        .execute(&store.pool.writer)
        .await
        .unwrap();

        let loaded = store.get(&poll.id).await.unwrap().unwrap();
        assert_eq!(loaded, poll);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("polls.db").display());

        let poll = {
            let store = SqlitePollStore::new(DatabasePool::new(&url).await.unwrap());
            let poll = store
                .create(CreatePollRequest::new("u1", "Persist?"))
                .await
                .unwrap();
            store.cast_vote(&UserId::from("u2"), &poll.id, 1).await.unwrap();
            poll
        };

        let reopened = SqlitePollStore::new(DatabasePool::new(&url).await.unwrap());
        let loaded = reopened.get(&poll.id).await.unwrap().unwrap();
        assert_eq!(loaded.question, "Persist?");
        assert_eq!(loaded.options[1].tally, 1);
    }
}
