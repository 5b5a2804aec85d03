//! Row structs for the store's primary tables. Everything is stringly typed
//! at this boundary; the JSONL files remain the source of truth and these
//! rows are a projection for analysis queries.

#[derive(Debug, Clone)]
pub struct ExperimentRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    pub total_conversations: u32,
    pub completed_conversations: u32,
    pub failed_conversations: u32,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub config_json: String,
}

#[derive(Debug, Clone)]
pub struct ConversationRecord {
    pub id: String,
    pub experiment_id: Option<String>,
    pub agent_a_model: String,
    pub agent_b_model: String,
    pub agent_a_name: Option<String>,
    pub agent_b_name: Option<String>,
    pub initial_prompt: Option<String>,
    pub max_turns: u32,
    pub first_speaker: Option<String>,
    pub status: String,
    pub ended_reason: Option<String>,
    pub final_convergence: Option<f64>,
    pub total_turns: u32,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub branched_from: Option<String>,
    pub branch_turn: Option<u32>,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub conversation_id: String,
    pub turn_number: u32,
    pub agent_id: String,
    pub content: String,
    pub model: Option<String>,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub tokens_estimated: bool,
    pub duration_ms: Option<u64>,
    pub timestamp: String,
}
