use anyhow::Result;

use duologue_engine::StateBuilder;
use duologue_runtime::write_transcript;

use crate::context::CliContext;

pub fn handle(context: &CliContext, conversation: &str) -> Result<()> {
    let (experiment_dir, log_path) = context.find_conversation_log(conversation)?;
    let state = StateBuilder::replay_file(&log_path)?;

    let conversation_id = state
        .conversation_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| conversation.to_string());
    let out_path = experiment_dir.join(format!("transcript_{}.md", conversation_id));
    write_transcript(&state, &out_path)?;
    println!("{}", out_path.display());

    Ok(())
}
