use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one side of a conversation. Exactly two agents exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    AgentA,
    AgentB,
}

impl AgentId {
    pub fn partner(self) -> AgentId {
        match self {
            AgentId::AgentA => AgentId::AgentB,
            AgentId::AgentB => AgentId::AgentA,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentId::AgentA => "agent_a",
            AgentId::AgentB => "agent_b",
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System prompt preset controlling what each agent is told about its counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AwarenessLevel {
    None,
    #[default]
    Basic,
    Firm,
    Research,
    Backrooms,
}

/// Resolved per-agent configuration.
///
/// Immutable after conversation start except `chosen_name`, which is set at
/// most once from the agent's first message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: AgentId,
    pub model: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub awareness: AwarenessLevel,
    #[serde(default)]
    pub thinking_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
}

impl AgentConfig {
    /// The name shown in transcripts: self-chosen when available
    pub fn name(&self) -> &str {
        self.chosen_name.as_deref().unwrap_or(&self.display_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AgentId::AgentA).unwrap(),
            "\"agent_a\""
        );
        assert_eq!(
            serde_json::to_string(&AgentId::AgentB).unwrap(),
            "\"agent_b\""
        );
    }

    #[test]
    fn test_partner_is_involutive() {
        assert_eq!(AgentId::AgentA.partner(), AgentId::AgentB);
        assert_eq!(AgentId::AgentA.partner().partner(), AgentId::AgentA);
    }

    #[test]
    fn test_chosen_name_wins_over_display_name() {
        let mut agent = AgentConfig {
            id: AgentId::AgentA,
            model: "claude-sonnet-4-20250514".to_string(),
            display_name: "sonnet-1".to_string(),
            chosen_name: None,
            temperature: None,
            awareness: AwarenessLevel::Basic,
            thinking_enabled: false,
            thinking_budget: None,
        };
        assert_eq!(agent.name(), "sonnet-1");

        agent.chosen_name = Some("Aria".to_string());
        assert_eq!(agent.name(), "Aria");
    }
}
