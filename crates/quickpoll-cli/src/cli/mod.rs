//! CLI command definitions for the `qpoll` binary.
//!
//! Uses clap derive macros for argument parsing. Every command acts on
//! behalf of an explicit user id, the way a chat integration would.

pub mod action;
pub mod poll;

use clap::{Parser, Subcommand};
use quickpoll_types::poll::PollId;

/// Run quick polls: create, edit, vote, inspect.
#[derive(Parser)]
#[command(name = "qpoll", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed logging (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log directives for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,quickpoll=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a poll. Without --option it starts with three empty options.
    Create {
        /// User id of the author.
        author: String,

        /// The question to ask.
        question: String,

        /// Option text (repeat for several options).
        #[arg(long = "option", short = 'o')]
        options: Vec<String>,
    },

    /// Append an empty option (author only).
    AddOption {
        /// User id making the change.
        user: String,

        /// Poll id.
        poll: PollId,
    },

    /// Set the text of an option (author only).
    EditOption {
        /// User id making the change.
        user: String,

        /// Poll id.
        poll: PollId,

        /// Zero-based option index.
        index: u32,

        /// New option text.
        text: String,
    },

    /// Replace the question (author only).
    EditQuestion {
        /// User id making the change.
        user: String,

        /// Poll id.
        poll: PollId,

        /// New question text.
        text: String,
    },

    /// Cast a vote. Each user votes once per poll.
    Vote {
        /// User id of the voter.
        user: String,

        /// Poll id.
        poll: PollId,

        /// Zero-based option index.
        index: u32,
    },

    /// Show a poll with its tallies.
    Show {
        /// Poll id.
        poll: PollId,

        /// Also show which option this user voted for.
        #[arg(long)]
        voter: Option<String>,
    },

    /// Replay a raw chat interaction through the dispatcher.
    Action {
        /// User id performing the interaction.
        user: String,

        /// Action identifier (create, option-updated, add-option, send, cancel, option-selected).
        action: String,

        /// Control token, e.g. poll/<id> or poll/<id>/<index>.
        token: Option<String>,

        /// Entered text, for text inputs.
        value: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_parse_create_with_options() {
        let cli = Cli::try_parse_from([
            "qpoll", "create", "U1", "Lunch?", "-o", "Tacos", "--option", "Pizza",
        ])
        .unwrap();
        match cli.command {
            Commands::Create {
                author,
                question,
                options,
            } => {
                assert_eq!(author, "U1");
                assert_eq!(question, "Lunch?");
                assert_eq!(options, vec!["Tacos", "Pizza"]);
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_poll_id() {
        assert!(Cli::try_parse_from(["qpoll", "show", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_log_filter_by_verbosity() {
        let poll = PollId::new().to_string();
        let quiet = Cli::try_parse_from(["qpoll", "--quiet", "show", &poll]).unwrap();
        assert_eq!(quiet.log_filter(), "error");

        let debug = Cli::try_parse_from(["qpoll", "-v", "show", &poll]).unwrap();
        assert_eq!(debug.log_filter(), "info,quickpoll=debug");
    }
}
