use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentConfig, AgentId};
use crate::message::Message;

/// Terminal and non-terminal states of one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Created,
    Running,
    Completed,
    Failed,
    Interrupted,
    ContextLimitReached,
}

impl ConversationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            ConversationStatus::Created | ConversationStatus::Running
        )
    }
}

/// Why a conversation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndedReason {
    MaxTurns,
    HighConvergence,
    Error,
    Interrupted,
    ContextLimitReached,
}

impl EndedReason {
    /// The conversation status this reason terminates into.
    ///
    /// `context_limit_reached` is a non-error terminal state, not a failure.
    pub fn final_status(self) -> ConversationStatus {
        match self {
            EndedReason::MaxTurns | EndedReason::HighConvergence => ConversationStatus::Completed,
            EndedReason::Error => ConversationStatus::Failed,
            EndedReason::Interrupted => ConversationStatus::Interrupted,
            EndedReason::ContextLimitReached => ConversationStatus::ContextLimitReached,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EndedReason::MaxTurns => "max_turns",
            EndedReason::HighConvergence => "high_convergence",
            EndedReason::Error => "error",
            EndedReason::Interrupted => "interrupted",
            EndedReason::ContextLimitReached => "context_limit_reached",
        }
    }
}

/// One completed exchange: a message from each agent plus the convergence
/// score computed over the history window ending at this turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_number: u32,
    pub a_message: Message,
    pub b_message: Message,
    pub convergence_score: f64,
}

/// Full state of one two-agent conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub agent_a: AgentConfig,
    pub agent_b: AgentConfig,
    pub initial_prompt: String,
    pub max_turns: u32,
    pub first_speaker: AgentId,
    pub messages: Vec<Message>,
    pub status: ConversationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence_reason: Option<EndedReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_convergence: Option<f64>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Conversation {
    pub fn agent(&self, id: AgentId) -> &AgentConfig {
        match id {
            AgentId::AgentA => &self.agent_a,
            AgentId::AgentB => &self.agent_b,
        }
    }

    pub fn agent_mut(&mut self, id: AgentId) -> &mut AgentConfig {
        match id {
            AgentId::AgentA => &mut self.agent_a,
            AgentId::AgentB => &mut self.agent_b,
        }
    }
}
