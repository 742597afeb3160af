//! `qpoll action`: feed a raw chat interaction through the dispatcher.

use anyhow::{Context, Result};
use console::style;
use quickpoll_core::dispatch::{Command, Outcome};
use quickpoll_types::poll::UserId;

use super::poll::print_poll;
use crate::state::AppState;

pub async fn handle_action(
    state: &AppState,
    user: &str,
    action: &str,
    token: Option<&str>,
    value: Option<&str>,
    json: bool,
) -> Result<()> {
    let command = Command::parse(action, token, value)?;
    let outcome = state
        .dispatcher
        .dispatch(&UserId::from(user), command)
        .await
        .with_context(|| format!("Action '{action}' failed"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match &outcome {
        Outcome::Draft(poll) => print_poll(poll, None, false, Some("Draft")),
        Outcome::Published(poll) => print_poll(poll, None, false, Some("Published")),
        Outcome::Voted(poll) => print_poll(poll, None, false, Some("Vote recorded")),
        Outcome::Cancelled => {
            println!();
            println!("  {} Draft discarded", style("ok").green());
            println!();
            Ok(())
        }
    }
}
