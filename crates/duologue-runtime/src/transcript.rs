//! Human-readable Markdown rendering of a replayed conversation. Observers
//! who want live output tail the JSONL files instead; this runs on demand.

use std::path::Path;

use duologue_engine::ConversationState;
use duologue_types::{AgentId, Sender};

use crate::error::Result;

pub fn render_transcript(state: &ConversationState) -> String {
    let mut out = String::new();

    let name = |id: AgentId| {
        state
            .agent(id)
            .map(|agent| agent.name().to_string())
            .unwrap_or_else(|| id.as_str().to_string())
    };

    out.push_str("# Conversation\n\n");
    if let Some(conversation_id) = state.conversation_id {
        out.push_str(&format!("- id: `{}`\n", conversation_id));
    }
    if let (Some(agent_a), Some(agent_b)) = (&state.agent_a, &state.agent_b) {
        out.push_str(&format!(
            "- {}: `{}`\n- {}: `{}`\n",
            name(AgentId::AgentA),
            agent_a.model,
            name(AgentId::AgentB),
            agent_b.model
        ));
    }
    if let Some(branched_from) = state.branched_from {
        out.push_str(&format!(
            "- branched from `{}` at turn {}\n",
            branched_from,
            state.branch_turn.unwrap_or(0)
        ));
    }
    out.push('\n');

    let mut turn = 0u32;
    let mut speakers_this_turn = 0u32;
    for message in &state.messages {
        match message.agent_id {
            Sender::System => {
                out.push_str(&format!("> {}\n\n", message.content.replace('\n', "\n> ")));
            }
            Sender::Human => {
                out.push_str(&format!("**Initial prompt:** {}\n\n", message.content));
            }
            Sender::AgentA | Sender::AgentB => {
                if speakers_this_turn == 0 {
                    out.push_str(&format!("## Turn {}\n\n", turn));
                }
                let agent = message.agent_id.agent().unwrap_or(AgentId::AgentA);
                out.push_str(&format!("**{}:** {}\n\n", name(agent), message.content));
                speakers_this_turn += 1;
                if speakers_this_turn == 2 {
                    if let Some(score) = state.convergence_trail.get(turn as usize) {
                        out.push_str(&format!("_convergence: {:.3}_\n\n", score));
                    }
                    turn += 1;
                    speakers_this_turn = 0;
                }
            }
        }
    }

    out.push_str("---\n\n");
    if let Some(reason) = state.ended_reason {
        out.push_str(&format!("- ended: {}\n", reason.as_str()));
    }
    if let Some(score) = state.final_convergence {
        out.push_str(&format!("- final convergence: {:.3}\n", score));
    }
    out.push_str(&format!(
        "- turns: {}\n- tokens: {} in / {} out\n",
        state.turns_completed, state.tokens_in, state.tokens_out
    ));

    out
}

pub fn write_transcript(state: &ConversationState, path: &Path) -> Result<()> {
    std::fs::write(path, render_transcript(state))?;
    Ok(())
}
