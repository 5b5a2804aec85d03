//! Canned experiment configs and well-formed event logs for replay and
//! import tests.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use duologue_types::{
    AgentConfig, AgentId, AwarenessLevel, ConvergenceSettings, EndedReason, EventPayload,
    EventRecord, ExperimentConfig,
};

/// A minimal valid config for the given models
pub fn experiment_config(
    agent_a_model: &str,
    agent_b_model: &str,
    repetitions: u32,
    max_turns: u32,
) -> ExperimentConfig {
    ExperimentConfig {
        name: "fixture".to_string(),
        agent_a_model: agent_a_model.to_string(),
        agent_b_model: agent_b_model.to_string(),
        repetitions,
        max_turns,
        initial_prompt: Some("Please begin.".to_string()),
        temperature_a: None,
        temperature_b: None,
        awareness: AwarenessLevel::None,
        awareness_a: None,
        awareness_b: None,
        convergence: ConvergenceSettings::default(),
        max_parallel: None,
        choose_names: false,
        thinking_enabled: false,
        thinking_budget: None,
        thinking_a: None,
        thinking_b: None,
        first_speaker: AgentId::AgentA,
        allow_truncation: false,
        branch_from: None,
        branch_turn: None,
        branch_messages: Vec::new(),
    }
}

fn fixture_agent(id: AgentId) -> AgentConfig {
    AgentConfig {
        id,
        model: "test".to_string(),
        display_name: match id {
            AgentId::AgentA => "test-1".to_string(),
            AgentId::AgentB => "test-2".to_string(),
        },
        chosen_name: None,
        temperature: None,
        awareness: AwarenessLevel::None,
        thinking_enabled: false,
        thinking_budget: None,
    }
}

/// Write a complete, well-formed conversation log with `turns` turns into
/// `dir`, returning the file path
pub fn write_event_log(
    dir: &Path,
    conversation_id: Uuid,
    experiment_id: Uuid,
    turns: u32,
) -> Result<std::path::PathBuf> {
    let mut sequence = 0u64;
    let mut record = |payload: EventPayload| {
        sequence += 1;
        EventRecord {
            sequence,
            timestamp: Utc::now(),
            conversation_id: Some(conversation_id),
            experiment_id: Some(experiment_id),
            payload,
            metadata: None,
        }
    };

    let mut events = vec![record(EventPayload::ConversationStart {
        agent_a: fixture_agent(AgentId::AgentA),
        agent_b: fixture_agent(AgentId::AgentB),
        initial_prompt: "Please begin.".to_string(),
        max_turns: turns,
        first_speaker: AgentId::AgentA,
        branched_from: None,
        branch_turn: None,
    })];

    for turn in 0..turns {
        events.push(record(EventPayload::TurnStart { turn_number: turn }));
        for agent_id in [AgentId::AgentA, AgentId::AgentB] {
            events.push(record(EventPayload::MessageComplete {
                agent_id,
                turn_number: turn,
                content: format!("message from {} in turn {}", agent_id, turn),
                model: "test".to_string(),
                tokens_in: Some(8),
                tokens_out: Some(8),
                tokens_estimated: false,
                duration_ms: 1,
            }));
        }
        events.push(record(EventPayload::TurnComplete {
            turn_number: turn,
            convergence_score: 0.3,
        }));
    }

    events.push(record(EventPayload::ConversationEnd {
        ended_reason: EndedReason::MaxTurns,
        final_convergence: Some(0.3),
        duration_ms: 10,
        total_turns: turns,
        error: None,
    }));

    let path = dir.join(format!("{}_events.jsonl", conversation_id));
    let mut file = std::fs::File::create(&path)?;
    for event in events {
        writeln!(file, "{}", event.to_jsonl()?)?;
    }
    Ok(path)
}
