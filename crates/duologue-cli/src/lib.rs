mod args;
mod context;
mod handlers;

use anyhow::Result;

pub use args::{Cli, Command};
pub use context::CliContext;

pub fn run(cli: Cli) -> Result<()> {
    let context = CliContext::resolve(cli.output_dir.as_deref())?;

    match cli.command {
        Command::Run { config, foreground } => handlers::run::handle(&context, &config, foreground),
        Command::Status { query } => handlers::status::handle(&context, query.as_deref()),
        Command::Stop { query } => handlers::stop::handle(&context, &query),
        Command::Import { query } => handlers::import::handle(&context, &query),
        Command::Transcript { conversation } => {
            handlers::transcript::handle(&context, &conversation)
        }
        Command::Branch {
            conversation,
            turn,
            agent_a_model,
            agent_b_model,
            max_turns,
            foreground,
        } => handlers::branch::handle(
            &context,
            &conversation,
            turn,
            agent_a_model,
            agent_b_model,
            max_turns,
            foreground,
        ),
    }
}
