//! Poll subcommand handlers and rendering.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use quickpoll_types::poll::{CreatePollRequest, Poll, PollId, UserId, Vote};

use crate::state::AppState;

/// Create a poll, with the default empty options unless some were given.
pub async fn create_poll(
    state: &AppState,
    author: &str,
    question: &str,
    options: Vec<String>,
    json: bool,
) -> Result<()> {
    let mut request = CreatePollRequest::new(author, question);
    if !options.is_empty() {
        request = request.with_options(options);
    }

    let poll = state
        .poll_service
        .create_poll_with_options(request)
        .await
        .context("Failed to create poll")?;

    print_poll(&poll, None, json, Some("Created poll"))
}

pub async fn add_option(state: &AppState, user: &str, poll_id: &PollId, json: bool) -> Result<()> {
    let poll = state
        .poll_service
        .add_option(&UserId::from(user), poll_id)
        .await
        .with_context(|| format!("Failed to add an option to poll {poll_id}"))?;

    print_poll(&poll, None, json, Some("Added option"))
}

pub async fn edit_option(
    state: &AppState,
    user: &str,
    poll_id: &PollId,
    index: u32,
    text: &str,
    json: bool,
) -> Result<()> {
    let poll = state
        .poll_service
        .edit_option(&UserId::from(user), poll_id, index, text)
        .await
        .with_context(|| format!("Failed to edit option {index} of poll {poll_id}"))?;

    print_poll(&poll, None, json, Some("Updated option"))
}

pub async fn edit_question(
    state: &AppState,
    user: &str,
    poll_id: &PollId,
    text: &str,
    json: bool,
) -> Result<()> {
    let poll = state
        .poll_service
        .edit_question(&UserId::from(user), poll_id, text)
        .await
        .with_context(|| format!("Failed to edit the question of poll {poll_id}"))?;

    print_poll(&poll, None, json, Some("Updated question"))
}

pub async fn vote(
    state: &AppState,
    user: &str,
    poll_id: &PollId,
    index: u32,
    json: bool,
) -> Result<()> {
    let voter = UserId::from(user);
    let poll = state
        .poll_service
        .vote(&voter, poll_id, index)
        .await
        .with_context(|| format!("Failed to record vote on poll {poll_id}"))?;

    let choice = Vote {
        poll_id: poll_id.clone(),
        voter,
        option_index: index,
    };
    print_poll(&poll, Some(&choice), json, Some("Vote recorded"))
}

pub async fn show_poll(
    state: &AppState,
    poll_id: &PollId,
    voter: Option<&str>,
    json: bool,
) -> Result<()> {
    let poll = state
        .poll_service
        .get_poll(poll_id)
        .await
        .with_context(|| format!("Poll {poll_id} not found"))?;

    let choice = match voter {
        Some(voter) => state
            .poll_service
            .voter_choice(poll_id, &UserId::from(voter))
            .await
            .context("Failed to look up vote")?,
        None => None,
    };

    print_poll(&poll, choice.as_ref(), json, None)
}

/// Print a poll as JSON or as a styled table.
pub fn print_poll(
    poll: &Poll,
    choice: Option<&Vote>,
    json: bool,
    headline: Option<&str>,
) -> Result<()> {
    if json {
        let mut value = serde_json::to_value(poll)?;
        if let Some(choice) = choice {
            value["choice"] = serde_json::json!(choice.option_index);
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    if let Some(headline) = headline {
        println!("  {} {}", style("ok").green(), headline);
        println!();
    }
    println!("  {}", style(&poll.question).bold());
    println!(
        "  {} {}  {} {}",
        style("id").dim(),
        style(&poll.id).cyan(),
        style("by").dim(),
        poll.author
    );
    println!();
    println!("{}", poll_table(poll, choice));
    println!("  {} vote(s)", style(poll.total_votes()).bold());
    println!();

    Ok(())
}

fn poll_table(poll: &Poll, choice: Option<&Vote>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::White),
            Cell::new("Option").fg(Color::White),
            Cell::new("Votes").fg(Color::White),
        ]);

    for option in &poll.options {
        let chosen = choice.is_some_and(|c| c.option_index == option.index);
        let text = if option.text.is_empty() {
            Cell::new("(empty)").fg(Color::DarkGrey)
        } else if chosen {
            Cell::new(format!("{} (your vote)", option.text)).fg(Color::Green)
        } else {
            Cell::new(&option.text)
        };
        table.add_row(vec![
            Cell::new(option.index),
            text,
            Cell::new(option.tally).fg(Color::Cyan),
        ]);
    }

    table
}
