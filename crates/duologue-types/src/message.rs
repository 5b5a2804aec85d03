use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;

/// Provider-facing role. Distinct from [`Sender`]: role is what the vendor
/// API sees after routing, sender is the source of truth for who spoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Source of a message in the canonical history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    AgentA,
    AgentB,
    System,
    Human,
}

impl Sender {
    /// The agent behind this sender, if any
    pub fn agent(self) -> Option<AgentId> {
        match self {
            Sender::AgentA => Some(AgentId::AgentA),
            Sender::AgentB => Some(AgentId::AgentB),
            Sender::System | Sender::Human => None,
        }
    }
}

impl From<AgentId> for Sender {
    fn from(id: AgentId) -> Self {
        match id {
            AgentId::AgentA => Sender::AgentA,
            AgentId::AgentB => Sender::AgentB,
        }
    }
}

/// One message in the canonical conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub agent_id: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// An assistant message spoken by one of the two agents
    pub fn from_agent(agent: AgentId, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            agent_id: agent.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            agent_id: Sender::System,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            agent_id: Sender::Human,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_and_sender_are_independent() {
        let msg = Message::from_agent(AgentId::AgentB, "hello");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.agent_id, Sender::AgentB);
    }

    #[test]
    fn test_sender_serialization() {
        assert_eq!(
            serde_json::to_string(&Sender::Human).unwrap(),
            "\"human\""
        );
        let sender: Sender = serde_json::from_str("\"agent_a\"").unwrap();
        assert_eq!(sender, Sender::AgentA);
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = Message::human("say hi");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "say hi");
        assert_eq!(back.agent_id, Sender::Human);
    }
}
