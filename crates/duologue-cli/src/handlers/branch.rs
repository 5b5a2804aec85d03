use anyhow::{Context, Result, bail};

use duologue_engine::StateBuilder;
use duologue_runtime::read_manifest;

use crate::context::CliContext;
use crate::handlers::run;

#[allow(clippy::too_many_arguments)]
pub fn handle(
    context: &CliContext,
    conversation: &str,
    turn: u32,
    agent_a_model: Option<String>,
    agent_b_model: Option<String>,
    max_turns: Option<u32>,
    foreground: bool,
) -> Result<()> {
    let (experiment_dir, log_path) = context.find_conversation_log(conversation)?;

    let state = StateBuilder::replay_file_at_turn(&log_path, turn)?;
    if state.turns_completed < turn {
        bail!(
            "conversation has only {} turns, cannot branch at {}",
            state.turns_completed,
            turn
        );
    }
    let source_id = state
        .conversation_id
        .context("source log has no conversation id")?;

    // The source experiment's config is the base; overrides apply on top
    let source_manifest = read_manifest(&experiment_dir)?;
    let mut config = source_manifest.config;
    config.name = format!("{}-branch", config.name);
    config.repetitions = 1;
    if let Some(model) = agent_a_model {
        config.agent_a_model = model;
    }
    if let Some(model) = agent_b_model {
        config.agent_b_model = model;
    }
    if let Some(max_turns) = max_turns {
        config.max_turns = max_turns;
    }
    config.branch_from = Some(source_id);
    config.branch_turn = Some(turn);
    config.branch_messages = state.messages;
    config.validate()?;

    println!(
        "branching {} at turn {} ({} seeded messages)",
        source_id,
        turn,
        config.branch_messages.len()
    );
    run::launch(context, config, foreground)
}
