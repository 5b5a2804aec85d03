use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentConfig, AgentId};
use crate::conversation::EndedReason;

// NOTE: Event Schema Design
//
// 1. One JSON object per JSONL line, internally tagged: the `type` field is
//    the discriminator and variant fields sit at top level, so logs stay
//    greppable and third-party readers need no nesting knowledge.
// 2. Per-conversation sequence numbers are assigned by the bus, never by
//    producers; replay order is the sequence order, not arrival order.
// 3. Chunk events carry deltas only; the complete events repeat the full
//    accumulated text so a reader can ignore chunks entirely.
// 4. Token counts are vendor-reported when available; `tokens_estimated`
//    marks the char-heuristic fallback so analysis can discount them.

/// Discriminator for subscription filtering and storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ConversationStart,
    ConversationEnd,
    TurnStart,
    TurnComplete,
    MessageRequest,
    MessageChunk,
    MessageComplete,
    ThinkingChunk,
    ThinkingComplete,
    SystemPrompt,
    ContextTruncation,
    ApiError,
    ProviderTimeout,
    RateLimitPace,
    InterruptRequest,
    ConversationPaused,
    ConversationResumed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ConversationStart => "conversation_start",
            EventKind::ConversationEnd => "conversation_end",
            EventKind::TurnStart => "turn_start",
            EventKind::TurnComplete => "turn_complete",
            EventKind::MessageRequest => "message_request",
            EventKind::MessageChunk => "message_chunk",
            EventKind::MessageComplete => "message_complete",
            EventKind::ThinkingChunk => "thinking_chunk",
            EventKind::ThinkingComplete => "thinking_complete",
            EventKind::SystemPrompt => "system_prompt",
            EventKind::ContextTruncation => "context_truncation",
            EventKind::ApiError => "api_error",
            EventKind::ProviderTimeout => "provider_timeout",
            EventKind::RateLimitPace => "rate_limit_pace",
            EventKind::InterruptRequest => "interrupt_request",
            EventKind::ConversationPaused => "conversation_paused",
            EventKind::ConversationResumed => "conversation_resumed",
        }
    }
}

/// Event type and content (internally tagged)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Opens a conversation log; exactly one per conversation, always first
    ConversationStart {
        agent_a: AgentConfig,
        agent_b: AgentConfig,
        initial_prompt: String,
        max_turns: u32,
        first_speaker: AgentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branched_from: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch_turn: Option<u32>,
    },

    /// Closes a conversation log; exactly one per conversation, always last
    ConversationEnd {
        ended_reason: EndedReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_convergence: Option<f64>,
        duration_ms: u64,
        total_turns: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    TurnStart {
        turn_number: u32,
    },

    /// Emitted after both message completions of the turn
    TurnComplete {
        turn_number: u32,
        convergence_score: f64,
    },

    /// A provider call is about to be made for this agent
    MessageRequest {
        agent_id: AgentId,
        turn_number: u32,
        model: String,
    },

    /// One streamed response delta
    MessageChunk {
        agent_id: AgentId,
        turn_number: u32,
        chunk: String,
        chunk_index: u64,
    },

    /// Full assembled response for one agent in one turn
    MessageComplete {
        agent_id: AgentId,
        turn_number: u32,
        content: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens_in: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens_out: Option<u64>,
        #[serde(default)]
        tokens_estimated: bool,
        duration_ms: u64,
    },

    /// One streamed extended-thinking delta
    ThinkingChunk {
        agent_id: AgentId,
        turn_number: u32,
        chunk: String,
        chunk_index: u64,
    },

    /// Full assembled thinking trace; at most one per (turn, agent)
    ThinkingComplete {
        agent_id: AgentId,
        turn_number: u32,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking_tokens: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },

    /// A system prompt injected into the history. `agent_id = None` means
    /// the prompt is visible to both agents.
    SystemPrompt {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },

    /// Oldest non-system messages were dropped to fit the context budget
    ContextTruncation {
        agent_id: AgentId,
        turn_number: u32,
        dropped_messages: u32,
        tokens_before: u64,
        tokens_after: u64,
        token_budget: u64,
    },

    /// A provider call failed; `retryable` records whether the retry policy
    /// still applied when the event was emitted
    ApiError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turn_number: Option<u32>,
        kind: String,
        message: String,
        retryable: bool,
    },

    ProviderTimeout {
        agent_id: AgentId,
        turn_number: u32,
        timeout_ms: u64,
    },

    /// The rate limiter or retry policy slept before a provider call
    RateLimitPace {
        provider: String,
        wait_ms: u64,
    },

    InterruptRequest {
        source: String,
    },

    ConversationPaused {
        turn_number: u32,
    },

    ConversationResumed {
        turn_number: u32,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::ConversationStart { .. } => EventKind::ConversationStart,
            EventPayload::ConversationEnd { .. } => EventKind::ConversationEnd,
            EventPayload::TurnStart { .. } => EventKind::TurnStart,
            EventPayload::TurnComplete { .. } => EventKind::TurnComplete,
            EventPayload::MessageRequest { .. } => EventKind::MessageRequest,
            EventPayload::MessageChunk { .. } => EventKind::MessageChunk,
            EventPayload::MessageComplete { .. } => EventKind::MessageComplete,
            EventPayload::ThinkingChunk { .. } => EventKind::ThinkingChunk,
            EventPayload::ThinkingComplete { .. } => EventKind::ThinkingComplete,
            EventPayload::SystemPrompt { .. } => EventKind::SystemPrompt,
            EventPayload::ContextTruncation { .. } => EventKind::ContextTruncation,
            EventPayload::ApiError { .. } => EventKind::ApiError,
            EventPayload::ProviderTimeout { .. } => EventKind::ProviderTimeout,
            EventPayload::RateLimitPace { .. } => EventKind::RateLimitPace,
            EventPayload::InterruptRequest { .. } => EventKind::InterruptRequest,
            EventPayload::ConversationPaused { .. } => EventKind::ConversationPaused,
            EventPayload::ConversationResumed { .. } => EventKind::ConversationResumed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_matches_kind_string() {
        let payload = EventPayload::TurnStart { turn_number: 3 };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "turn_start");
        assert_eq!(payload.kind().as_str(), "turn_start");
        assert_eq!(json["turn_number"], 3);
    }

    #[test]
    fn test_variant_fields_at_top_level() {
        let payload = EventPayload::MessageChunk {
            agent_id: AgentId::AgentA,
            turn_number: 1,
            chunk: "hel".to_string(),
            chunk_index: 0,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "message_chunk");
        assert_eq!(json["agent_id"], "agent_a");
        assert_eq!(json["chunk"], "hel");
    }

    #[test]
    fn test_roundtrip_conversation_end() {
        let payload = EventPayload::ConversationEnd {
            ended_reason: EndedReason::HighConvergence,
            final_convergence: Some(0.93),
            duration_ms: 12_345,
            total_turns: 7,
            error: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"ended_reason\":\"high_convergence\""));
        let back: EventPayload = serde_json::from_str(&json).unwrap();
        match back {
            EventPayload::ConversationEnd {
                ended_reason,
                final_convergence,
                total_turns,
                ..
            } => {
                assert_eq!(ended_reason, EndedReason::HighConvergence);
                assert_eq!(final_convergence, Some(0.93));
                assert_eq!(total_turns, 7);
            }
            other => panic!("wrong payload type: {:?}", other.kind()),
        }
    }

    #[test]
    fn test_all_kinds_covered() {
        // One payload per kind; keep in sync when adding variants
        let payloads = [
            EventPayload::TurnStart { turn_number: 0 },
            EventPayload::TurnComplete {
                turn_number: 0,
                convergence_score: 0.0,
            },
            EventPayload::InterruptRequest {
                source: "signal".to_string(),
            },
            EventPayload::ConversationPaused { turn_number: 0 },
            EventPayload::ConversationResumed { turn_number: 0 },
            EventPayload::RateLimitPace {
                provider: "anthropic".to_string(),
                wait_ms: 200,
            },
        ];
        for payload in payloads {
            let json = serde_json::to_value(&payload).unwrap();
            assert_eq!(json["type"], payload.kind().as_str());
        }
    }
}
