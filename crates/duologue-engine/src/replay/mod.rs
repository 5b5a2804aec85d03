//! Event-log replay. Monitors, status commands, and branching all
//! reconstruct conversation state by folding the JSONL file in order;
//! nothing live-tails the relational store.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use duologue_types::{
    AgentConfig, AgentId, ConversationStatus, EndedReason, EventKind, EventPayload, EventRecord,
    Message,
};

use crate::error::{Error, Result};

/// Read every event from one JSONL file, in file order
pub fn read_events(path: &Path) -> Result<Vec<EventRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        events.push(EventRecord::from_jsonl(line)?);
    }
    Ok(events)
}

/// One assembled thinking trace
#[derive(Debug, Clone)]
pub struct ThinkingRecord {
    pub turn_number: u32,
    pub agent_id: AgentId,
    pub content: String,
    pub thinking_tokens: Option<u64>,
    pub duration_ms: Option<u64>,
}

/// Conversation state reconstructed from an event log
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub conversation_id: Option<Uuid>,
    pub experiment_id: Option<Uuid>,
    pub agent_a: Option<AgentConfig>,
    pub agent_b: Option<AgentConfig>,
    pub initial_prompt: String,
    pub max_turns: u32,
    pub first_speaker: Option<AgentId>,
    pub branched_from: Option<Uuid>,
    pub branch_turn: Option<u32>,
    pub messages: Vec<Message>,
    pub turns_completed: u32,
    pub convergence_trail: Vec<f64>,
    pub thinking: Vec<ThinkingRecord>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub status: Option<ConversationStatus>,
    pub ended_reason: Option<EndedReason>,
    pub final_convergence: Option<f64>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ConversationState {
    pub fn agent(&self, id: AgentId) -> Option<&AgentConfig> {
        match id {
            AgentId::AgentA => self.agent_a.as_ref(),
            AgentId::AgentB => self.agent_b.as_ref(),
        }
    }
}

/// Folds events into [`ConversationState`].
///
/// Replay is prefix-stable: folding any prefix and then continuing gives the
/// same final state as folding everything at once. `at_turn(k)` stops
/// consuming once the first `k` turns are complete, which is exactly the
/// state a branch seeds from.
pub struct StateBuilder {
    state: ConversationState,
    stop_at_turn: Option<u32>,
    stopped_early: bool,
    last_sequence: Option<u64>,
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBuilder {
    pub fn new() -> Self {
        Self {
            state: ConversationState::default(),
            stop_at_turn: None,
            stopped_early: false,
            last_sequence: None,
        }
    }

    /// Stop folding once `turns` turns have completed
    pub fn at_turn(turns: u32) -> Self {
        Self {
            stop_at_turn: Some(turns),
            ..Self::new()
        }
    }

    /// Whether the builder has seen everything it needs
    pub fn is_done(&self) -> bool {
        self.stopped_early || self.state.status.is_some_and(|s| s.is_terminal())
    }

    /// Fold one event. Rejects sequence regressions and events after the
    /// ConversationEnd; extra events after the stop turn are ignored.
    pub fn apply(&mut self, event: &EventRecord) -> Result<()> {
        if self.stopped_early {
            return Ok(());
        }

        if let Some(last) = self.last_sequence
            && event.sequence <= last
        {
            return Err(Error::Replay(format!(
                "sequence regression: {} after {}",
                event.sequence, last
            )));
        }
        if self.state.status.is_some_and(|s| s.is_terminal()) {
            return Err(Error::Replay(format!(
                "event {} after conversation end",
                event.kind().as_str()
            )));
        }
        self.last_sequence = Some(event.sequence);

        if self.state.conversation_id.is_none() {
            self.state.conversation_id = event.conversation_id;
        }
        if self.state.experiment_id.is_none() {
            self.state.experiment_id = event.experiment_id;
        }

        match &event.payload {
            EventPayload::ConversationStart {
                agent_a,
                agent_b,
                initial_prompt,
                max_turns,
                first_speaker,
                branched_from,
                branch_turn,
            } => {
                self.state.agent_a = Some(agent_a.clone());
                self.state.agent_b = Some(agent_b.clone());
                self.state.initial_prompt = initial_prompt.clone();
                self.state.max_turns = *max_turns;
                self.state.first_speaker = Some(*first_speaker);
                self.state.branched_from = *branched_from;
                self.state.branch_turn = *branch_turn;
                self.state.status = Some(ConversationStatus::Running);
                self.state.started_at = Some(event.timestamp);
                if !initial_prompt.is_empty() {
                    let mut message = Message::human(initial_prompt.clone());
                    message.timestamp = event.timestamp;
                    self.state.messages.push(message);
                }
            }

            EventPayload::SystemPrompt {
                agent_id,
                content,
                label,
            } => {
                // Name announcements update the agent in place. Prompts
                // addressed to one agent are injected at routing time and
                // stay out of the canonical history, as do advisory notices;
                // only broadcasts both agents saw join the replayed history.
                match label.as_deref() {
                    Some("name_chosen") => self.apply_chosen_name(event),
                    Some("convergence_notice") => {}
                    _ if agent_id.is_some() => {}
                    _ => {
                        let mut message = Message::system(content.clone());
                        message.timestamp = event.timestamp;
                        self.state.messages.push(message);
                    }
                }
            }

            EventPayload::MessageComplete {
                agent_id,
                content,
                tokens_in,
                tokens_out,
                ..
            } => {
                let mut message = Message::from_agent(*agent_id, content.clone());
                message.timestamp = event.timestamp;
                self.state.messages.push(message);
                self.state.tokens_in += tokens_in.unwrap_or(0);
                self.state.tokens_out += tokens_out.unwrap_or(0);
            }

            EventPayload::ThinkingComplete {
                agent_id,
                turn_number,
                content,
                thinking_tokens,
                duration_ms,
            } => {
                self.state.thinking.push(ThinkingRecord {
                    turn_number: *turn_number,
                    agent_id: *agent_id,
                    content: content.clone(),
                    thinking_tokens: *thinking_tokens,
                    duration_ms: *duration_ms,
                });
            }

            EventPayload::TurnComplete {
                turn_number,
                convergence_score,
            } => {
                self.state.turns_completed = turn_number + 1;
                self.state.convergence_trail.push(*convergence_score);
                if let Some(stop) = self.stop_at_turn
                    && self.state.turns_completed >= stop
                {
                    self.stopped_early = true;
                }
            }

            EventPayload::ConversationEnd {
                ended_reason,
                final_convergence,
                error,
                ..
            } => {
                self.state.status = Some(ended_reason.final_status());
                self.state.ended_reason = Some(*ended_reason);
                self.state.final_convergence = *final_convergence;
                self.state.error = error.clone();
                self.state.ended_at = Some(event.timestamp);
            }

            // Chunk, pacing, and lifecycle events carry no state
            _ => {}
        }

        Ok(())
    }

    fn apply_chosen_name(&mut self, event: &EventRecord) {
        let Some(metadata) = &event.metadata else {
            return;
        };
        let Some(name) = metadata["name"].as_str() else {
            return;
        };
        let agent = match metadata["agent_id"].as_str() {
            Some("agent_a") => self.state.agent_a.as_mut(),
            Some("agent_b") => self.state.agent_b.as_mut(),
            _ => None,
        };
        if let Some(agent) = agent {
            agent.chosen_name = Some(name.to_string());
        }
    }

    pub fn finish(self) -> ConversationState {
        self.state
    }

    /// Fold a whole event slice
    pub fn replay(events: &[EventRecord]) -> Result<ConversationState> {
        let mut builder = Self::new();
        for event in events {
            builder.apply(event)?;
        }
        Ok(builder.finish())
    }

    /// Fold a conversation log file from disk
    pub fn replay_file(path: &Path) -> Result<ConversationState> {
        let events = read_events(path)?;
        Self::replay(&events)
    }

    /// Fold a log file, stopping after the first `turns` turns
    pub fn replay_file_at_turn(path: &Path, turns: u32) -> Result<ConversationState> {
        let events = read_events(path)?;
        let mut builder = Self::at_turn(turns);
        for event in &events {
            builder.apply(event)?;
            if builder.is_done() {
                break;
            }
        }
        Ok(builder.finish())
    }
}

/// Check the universal log invariants:
/// sequences strictly increase, the log is framed by exactly one
/// ConversationStart and one ConversationEnd, each turn has at most one
/// MessageComplete per agent, and TurnComplete follows them.
pub fn validate_log(events: &[EventRecord]) -> Result<()> {
    if events.is_empty() {
        return Err(Error::Replay("empty event log".to_string()));
    }

    if events.first().unwrap().kind() != EventKind::ConversationStart {
        return Err(Error::Replay(
            "log does not begin with conversation_start".to_string(),
        ));
    }
    if events.last().unwrap().kind() != EventKind::ConversationEnd {
        return Err(Error::Replay(
            "log does not end with conversation_end".to_string(),
        ));
    }

    let mut last_sequence: Option<u64> = None;
    let mut completes_this_turn: HashSet<AgentId> = HashSet::new();
    let mut current_turn: Option<u32> = None;

    for (index, event) in events.iter().enumerate() {
        if let Some(last) = last_sequence
            && event.sequence <= last
        {
            return Err(Error::Replay(format!(
                "sequence not monotonic at index {}",
                index
            )));
        }
        last_sequence = Some(event.sequence);

        match &event.payload {
            EventPayload::ConversationStart { .. } if index != 0 => {
                return Err(Error::Replay("duplicate conversation_start".to_string()));
            }
            EventPayload::ConversationEnd { .. } if index != events.len() - 1 => {
                return Err(Error::Replay(
                    "events follow conversation_end".to_string(),
                ));
            }
            EventPayload::TurnStart { turn_number } => {
                current_turn = Some(*turn_number);
                completes_this_turn.clear();
            }
            EventPayload::MessageComplete {
                agent_id,
                turn_number,
                ..
            } => {
                if current_turn != Some(*turn_number) {
                    return Err(Error::Replay(format!(
                        "message_complete for turn {} outside that turn",
                        turn_number
                    )));
                }
                if !completes_this_turn.insert(*agent_id) {
                    return Err(Error::Replay(format!(
                        "second message_complete for {} in turn {}",
                        agent_id, turn_number
                    )));
                }
            }
            EventPayload::TurnComplete { turn_number, .. } => {
                if current_turn != Some(*turn_number) {
                    return Err(Error::Replay(format!(
                        "turn_complete for turn {} without matching turn_start",
                        turn_number
                    )));
                }
                current_turn = None;
            }
            _ => {}
        }
    }

    Ok(())
}
