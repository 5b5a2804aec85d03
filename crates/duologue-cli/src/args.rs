use clap::{Parser, Subcommand};

/// Orchestrate controlled conversations between two LLM agents and capture
/// every state transition as an append-only event log.
#[derive(Parser, Debug)]
#[command(name = "duologue", version, about)]
pub struct Cli {
    /// Output directory (overrides OUTPUT_DIR and the platform default)
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an experiment from a validated JSON config
    Run {
        /// Path to the experiment config (JSON)
        config: String,

        /// Stay attached to the terminal instead of daemonizing
        #[arg(long)]
        foreground: bool,
    },

    /// Show experiment status from manifests and event logs
    Status {
        /// Experiment id, id prefix, or name; omit to list everything
        query: Option<String>,
    },

    /// Request a graceful stop of a running experiment
    Stop {
        /// Experiment id, id prefix, or name
        query: String,
    },

    /// Import an experiment's event logs into its relational store
    Import {
        /// Experiment id, id prefix, or name
        query: String,
    },

    /// Render a conversation's Markdown transcript from its event log
    Transcript {
        /// Conversation id or id prefix
        conversation: String,
    },

    /// Start a new conversation seeded with the first K turns of another
    Branch {
        /// Source conversation id or id prefix
        conversation: String,

        /// Number of leading turns to keep
        #[arg(long)]
        turn: u32,

        /// Replace agent A's model in the branch
        #[arg(long)]
        agent_a_model: Option<String>,

        /// Replace agent B's model in the branch
        #[arg(long)]
        agent_b_model: Option<String>,

        /// Turn cap for the branched conversation (defaults to the source's)
        #[arg(long)]
        max_turns: Option<u32>,

        /// Stay attached to the terminal instead of daemonizing
        #[arg(long)]
        foreground: bool,
    },
}
