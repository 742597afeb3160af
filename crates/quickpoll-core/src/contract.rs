//! Storage contract suite.
//!
//! Behaviour every [`PollRepository`] + [`VoteLedger`] backend must show,
//! exercised through [`PollService`]. Each check takes a fresh, empty store;
//! backends call them from their own `#[tokio::test]` functions. Enabled for
//! other crates with the `test-support` feature.

use std::sync::Arc;
use std::time::Duration;

use quickpoll_types::error::PollError;
use quickpoll_types::poll::{CreatePollRequest, Poll, PollId, UserId};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::repository::{PollRepository, VoteLedger};
use crate::service::poll::PollService;

fn service<S>(store: S) -> PollService<S, S>
where
    S: PollRepository + VoteLedger + Clone,
{
    PollService::new(store.clone(), store)
}

fn user(id: &str) -> UserId {
    UserId::from(id)
}

fn tallies(poll: &Poll) -> Vec<u64> {
    poll.options.iter().map(|o| o.tally).collect()
}

async fn new_poll<S>(service: &PollService<S, S>, author: &str) -> Poll
where
    S: PollRepository + VoteLedger,
{
    service
        .create_poll(&user(author), "What is 2+2?")
        .await
        .expect("create poll")
}

pub async fn create_seeds_default_options<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let poll = new_poll(&service, "u1").await;

    assert_eq!(poll.author, user("u1"));
    assert_eq!(poll.question, "What is 2+2?");
    assert_eq!(poll.options.len(), 3);
    for (expected, option) in poll.options.iter().enumerate() {
        assert_eq!(option.index as usize, expected);
        assert!(option.text.is_empty());
        assert_eq!(option.tally, 0);
    }
}

pub async fn create_with_supplied_options<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let request = CreatePollRequest::new("u1", "Lunch?").with_options(vec![
        "Pizza".to_string(),
        "Sushi".to_string(),
        "Tacos".to_string(),
        "Salad".to_string(),
    ]);
    let poll = service.create_poll_with_options(request).await.unwrap();

    let stored = service.get_poll(&poll.id).await.unwrap();
    assert_eq!(stored.options.len(), 4);
    assert_eq!(stored.options[3].text, "Salad");
    assert_eq!(tallies(&stored), vec![0, 0, 0, 0]);
}

pub async fn create_then_get_roundtrip<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let created = new_poll(&service, "user123").await;

    let first = service.get_poll(&created.id).await.unwrap();
    let second = service.get_poll(&created.id).await.unwrap();
    assert_eq!(first, created);
    assert_eq!(first, second);
}

pub async fn get_missing_poll<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let found = store.get(&PollId::new()).await.unwrap();
    assert!(found.is_none());
}

pub async fn author_appends_option<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let author = user("user123");
    let poll = new_poll(&service, "user123").await;
    service
        .edit_option(&author, &poll.id, 0, "Answer 0")
        .await
        .unwrap();

    let appended = service.add_option(&author, &poll.id).await.unwrap();
    assert_eq!(appended.options.len(), poll.options.len() + 1);
    assert_eq!(appended.options[3].index, 3);
    assert!(appended.options[3].text.is_empty());

    let stored = service.get_poll(&poll.id).await.unwrap();
    assert_eq!(stored, appended);
    assert_eq!(stored.options[0].text, "Answer 0");
}

pub async fn non_author_cannot_edit<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let poll = new_poll(&service, "u1").await;
    let intruder = user("u2");

    let err = service.add_option(&intruder, &poll.id).await.unwrap_err();
    assert!(matches!(err.kind(), PollError::Forbidden { .. }));

    let err = service
        .edit_option(&intruder, &poll.id, 0, "hijacked")
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), PollError::Forbidden { .. }));

    let err = service
        .edit_option(&intruder, &poll.id, 10, "hijacked")
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), PollError::Forbidden { .. }));

    let err = service
        .edit_question(&intruder, &poll.id, "hijacked")
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), PollError::Forbidden { .. }));

    assert_eq!(service.get_poll(&poll.id).await.unwrap(), poll);
}

pub async fn author_sets_option_text<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let author = user("user123");
    let poll = new_poll(&service, "user123").await;

    service
        .edit_option(&author, &poll.id, 0, "Answer 0")
        .await
        .unwrap();
    service
        .edit_option(&author, &poll.id, 0, "Answer zero")
        .await
        .unwrap();

    let stored = service.get_poll(&poll.id).await.unwrap();
    assert_eq!(stored.options[0].text, "Answer zero");
    assert_eq!(stored.options.len(), 3);
}

pub async fn set_option_text_fills_forward<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let author = user("user123");
    let poll = new_poll(&service, "user123").await;

    let updated = service
        .edit_option(&author, &poll.id, 5, "Answer 5")
        .await
        .unwrap();

    assert_eq!(updated.options.len(), 6);
    let indices: Vec<u32> = updated.options.iter().map(|o| o.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    assert!(updated.options[3].text.is_empty());
    assert!(updated.options[4].text.is_empty());
    assert_eq!(updated.options[5].text, "Answer 5");

    // The filled options are real: they can be voted for.
    let after = service.vote(&user("u2"), &poll.id, 4).await.unwrap();
    assert_eq!(after.options[4].tally, 1);
}

pub async fn edit_preserves_tally<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let author = user("u1");
    let poll = new_poll(&service, "u1").await;
    service.vote(&user("u2"), &poll.id, 1).await.unwrap();

    let updated = service
        .edit_option(&author, &poll.id, 1, "Four")
        .await
        .unwrap();
    assert_eq!(updated.options[1].text, "Four");
    assert_eq!(updated.options[1].tally, 1);
}

pub async fn author_sets_question<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let poll = new_poll(&service, "u1").await;

    let updated = service
        .edit_question(&user("u1"), &poll.id, "What is 3+3?")
        .await
        .unwrap();
    assert_eq!(updated.question, "What is 3+3?");
    assert_eq!(updated.options, poll.options);
}

pub async fn mutating_missing_poll<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let missing = PollId::new();
    let someone = user("u1");

    let err = service.add_option(&someone, &missing).await.unwrap_err();
    assert!(matches!(err.kind(), PollError::NotFound { .. }));

    let err = service
        .edit_option(&someone, &missing, 0, "x")
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), PollError::NotFound { .. }));

    let err = service.vote(&someone, &missing, 0).await.unwrap_err();
    assert!(matches!(err.kind(), PollError::NotFound { .. }));

    assert!(service.polls().get(&missing).await.unwrap().is_none());
}

pub async fn vote_increments_tally<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let poll = new_poll(&service, "user1").await;

    service.vote(&user("user2"), &poll.id, 0).await.unwrap();

    let stored = service.get_poll(&poll.id).await.unwrap();
    assert_eq!(stored.options[0].tally, 1);
    assert_eq!(service.ledger().count_votes(&poll.id).await.unwrap(), 1);

    let vote = service
        .ledger()
        .vote_of(&poll.id, &user("user2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(vote.option_index, 0);
    assert_eq!(vote.poll_id, poll.id);
}

pub async fn second_vote_rejected<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let poll = new_poll(&service, "user1").await;
    let voter = user("user2");

    service.vote(&voter, &poll.id, 0).await.unwrap();

    let err = service.vote(&voter, &poll.id, 0).await.unwrap_err();
    assert!(matches!(err.kind(), PollError::AlreadyVoted { .. }));

    let err = service.vote(&voter, &poll.id, 2).await.unwrap_err();
    assert!(matches!(err.kind(), PollError::AlreadyVoted { .. }));

    // Already voting takes precedence over an invalid target.
    let err = service.vote(&voter, &poll.id, 60).await.unwrap_err();
    assert!(matches!(err.kind(), PollError::AlreadyVoted { .. }));

    let stored = service.get_poll(&poll.id).await.unwrap();
    assert_eq!(tallies(&stored), vec![1, 0, 0]);
}

pub async fn vote_for_missing_option<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let poll = new_poll(&service, "user1").await;
    service.add_option(&user("user1"), &poll.id).await.unwrap();
    let before = service.get_poll(&poll.id).await.unwrap();
    assert_eq!(before.options.len(), 4);

    let voter = user("user2");
    let err = service.vote(&voter, &poll.id, 99).await.unwrap_err();
    assert!(matches!(err.kind(), PollError::OptionNotFound { index: 99, .. }));

    assert_eq!(service.get_poll(&poll.id).await.unwrap(), before);
    assert!(service.voter_choice(&poll.id, &voter).await.unwrap().is_none());
    assert_eq!(service.ledger().count_votes(&poll.id).await.unwrap(), 0);

    // The rejected attempt does not use up the voter's vote.
    service.vote(&voter, &poll.id, 3).await.unwrap();
}

pub async fn votes_from_many_users<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let poll = new_poll(&service, "user1").await;

    for (voter, index) in [("user2", 0), ("user3", 1), ("user4", 1), ("user5", 2), ("user6", 2)] {
        service.vote(&user(voter), &poll.id, index).await.unwrap();
    }

    let stored = service.get_poll(&poll.id).await.unwrap();
    assert_eq!(tallies(&stored), vec![1, 2, 2]);
    assert_eq!(
        stored.total_votes(),
        service.ledger().count_votes(&poll.id).await.unwrap()
    );
}

pub async fn concurrent_votes_same_voter<S>(store: S, attempts: usize)
where
    S: PollRepository + VoteLedger + Clone + 'static,
{
    let service = Arc::new(service(store));
    let poll = new_poll(&service, "u1").await;

    let mut tasks = JoinSet::new();
    for _ in 0..attempts {
        let service = Arc::clone(&service);
        let poll_id = poll.id.clone();
        tasks.spawn(async move { service.vote(&user("u2"), &poll_id, 0).await });
    }

    let mut successes = 0;
    let mut already_voted = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("vote task panicked") {
            Ok(_) => successes += 1,
            Err(err) if matches!(err.kind(), PollError::AlreadyVoted { .. }) => already_voted += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(already_voted, attempts - 1);

    let stored = service.get_poll(&poll.id).await.unwrap();
    assert_eq!(tallies(&stored), vec![1, 0, 0]);
    assert_eq!(service.ledger().count_votes(&poll.id).await.unwrap(), 1);
}

pub async fn concurrent_votes_distinct_voters<S>(store: S, voters: usize)
where
    S: PollRepository + VoteLedger + Clone + 'static,
{
    let service = Arc::new(service(store));
    let poll = new_poll(&service, "u1").await;

    let mut tasks = JoinSet::new();
    for n in 0..voters {
        let service = Arc::clone(&service);
        let poll_id = poll.id.clone();
        tasks.spawn(async move { service.vote(&user(&format!("voter-{n}")), &poll_id, 1).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("vote task panicked").expect("vote");
    }

    let stored = service.get_poll(&poll.id).await.unwrap();
    assert_eq!(tallies(&stored), vec![0, voters as u64, 0]);
    assert_eq!(
        service.ledger().count_votes(&poll.id).await.unwrap(),
        voters as u64
    );
}

pub async fn concurrent_appends_get_distinct_indices<S>(store: S, appends: usize)
where
    S: PollRepository + VoteLedger + Clone + 'static,
{
    let service = Arc::new(service(store));
    let poll = new_poll(&service, "u1").await;

    let mut tasks = JoinSet::new();
    for _ in 0..appends {
        let service = Arc::clone(&service);
        let poll_id = poll.id.clone();
        tasks.spawn(async move { service.add_option(&user("u1"), &poll_id).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("append task panicked").expect("append option");
    }

    let stored = service.get_poll(&poll.id).await.unwrap();
    let indices: Vec<u32> = stored.options.iter().map(|o| o.index).collect();
    let expected: Vec<u32> = (0..(3 + appends as u32)).collect();
    assert_eq!(indices, expected);
}

pub async fn large_fill_does_not_stall_other_polls<S>(store: S, gap: u32)
where
    S: PollRepository + VoteLedger + Clone + 'static,
{
    let service = Arc::new(service(store));
    let filled = new_poll(&service, "u1").await;
    let other = new_poll(&service, "u2").await;

    let fill = {
        let service = Arc::clone(&service);
        let poll_id = filled.id.clone();
        tokio::spawn(async move { service.edit_option(&user("u1"), &poll_id, gap, "far").await })
    };

    let voted = timeout(
        Duration::from_secs(10),
        service.vote(&user("u3"), &other.id, 0),
    )
    .await
    .expect("vote on another poll stalled")
    .expect("vote");
    assert_eq!(tallies(&voted), vec![1, 0, 0]);

    let updated = timeout(Duration::from_secs(20), fill)
        .await
        .expect("fill stalled")
        .expect("fill task panicked")
        .expect("fill");
    let last = gap as usize;
    assert_eq!(updated.options.len(), last + 1);
    assert_eq!(updated.options[last].text, "far");
    for (expected, option) in updated.options[..last].iter().enumerate() {
        assert_eq!(option.index as usize, expected);
        assert!(option.text.is_empty());
    }
}

pub async fn empty_voter_id_is_an_ordinary_voter<S>(store: S)
where
    S: PollRepository + VoteLedger + Clone,
{
    let service = service(store);
    let poll = new_poll(&service, "u1").await;
    let anonymous = user("");

    let after = service.vote(&anonymous, &poll.id, 2).await.unwrap();
    assert_eq!(tallies(&after), vec![0, 0, 1]);

    let err = service.vote(&anonymous, &poll.id, 0).await.unwrap_err();
    assert!(matches!(err.kind(), PollError::AlreadyVoted { .. }));

    let choice = service.voter_choice(&poll.id, &anonymous).await.unwrap();
    assert_eq!(choice.map(|v| v.option_index), Some(2));

    let stored = service.get_poll(&poll.id).await.unwrap();
    assert_eq!(
        stored.total_votes(),
        service.ledger().count_votes(&poll.id).await.unwrap()
    );
    assert_eq!(stored.total_votes(), 1);
}
