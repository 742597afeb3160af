//! quickpoll command-line entry point.
//!
//! Binary name: `qpoll`
//!
//! Parses CLI arguments, loads configuration, opens the database and then
//! runs the requested command.

mod cli;
mod state;

use clap::Parser;
use quickpoll_infra::config::{load_config, resolve_data_dir};
use quickpoll_observe::tracing_setup::{init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = resolve_data_dir();
    let config = load_config(&data_dir).await;

    init_tracing(cli.log_filter(), cli.json, config.enable_otel)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    let state = AppState::init(&data_dir, &config).await?;
    let result = run(cli, &state).await;

    shutdown_tracing();
    result
}

async fn run(cli: Cli, state: &AppState) -> anyhow::Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Create {
            author,
            question,
            options,
        } => cli::poll::create_poll(state, &author, &question, options, json).await,
        Commands::AddOption { user, poll } => {
            cli::poll::add_option(state, &user, &poll, json).await
        }
        Commands::EditOption {
            user,
            poll,
            index,
            text,
        } => cli::poll::edit_option(state, &user, &poll, index, &text, json).await,
        Commands::EditQuestion { user, poll, text } => {
            cli::poll::edit_question(state, &user, &poll, &text, json).await
        }
        Commands::Vote { user, poll, index } => {
            cli::poll::vote(state, &user, &poll, index, json).await
        }
        Commands::Show { poll, voter } => {
            cli::poll::show_poll(state, &poll, voter.as_deref(), json).await
        }
        Commands::Action {
            user,
            action,
            token,
            value,
        } => {
            cli::action::handle_action(
                state,
                &user,
                &action,
                token.as_deref(),
                value.as_deref(),
                json,
            )
            .await
        }
    }
}
