use rusqlite::Connection;

use crate::Result;

// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 1;

// NOTE: Store Design Rationale
//
// Why raw-line retention in events/experiment_events?
// - The JSONL files are the source of truth; the store is a queryable
//   projection. Keeping the verbatim line preserves unknown fields across
//   schema evolution and lets the projection be rebuilt in place.
//
// Why (conversation_id, sequence) primary keys?
// - Duplicate deliveries (re-import, partially imported directories) collapse
//   via INSERT OR IGNORE, which is what makes import idempotent.
//
// Why a wide turn_metrics table instead of long-form rows?
// - Downstream analysis is column-oriented (notebooks, dataframes); one row
//   per turn with per-agent column pairs avoids a pivot on every read.

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS experiments (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            total_conversations INTEGER NOT NULL,
            completed_conversations INTEGER NOT NULL,
            failed_conversations INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            config_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            experiment_id TEXT,
            agent_a_model TEXT NOT NULL,
            agent_b_model TEXT NOT NULL,
            agent_a_name TEXT,
            agent_b_name TEXT,
            initial_prompt TEXT,
            max_turns INTEGER NOT NULL,
            first_speaker TEXT,
            status TEXT NOT NULL,
            ended_reason TEXT,
            final_convergence REAL,
            total_turns INTEGER NOT NULL,
            tokens_in INTEGER NOT NULL,
            tokens_out INTEGER NOT NULL,
            branched_from TEXT,
            branch_turn INTEGER,
            error TEXT,
            started_at TEXT,
            ended_at TEXT,
            FOREIGN KEY (experiment_id) REFERENCES experiments(id)
        );

        CREATE TABLE IF NOT EXISTS events (
            conversation_id TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            type TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            raw TEXT NOT NULL,
            PRIMARY KEY (conversation_id, sequence)
        );

        CREATE TABLE IF NOT EXISTS experiment_events (
            experiment_id TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            type TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            raw TEXT NOT NULL,
            PRIMARY KEY (experiment_id, sequence)
        );

        CREATE TABLE IF NOT EXISTS messages (
            conversation_id TEXT NOT NULL,
            turn_number INTEGER NOT NULL,
            agent_id TEXT NOT NULL,
            content TEXT NOT NULL,
            model TEXT,
            tokens_in INTEGER,
            tokens_out INTEGER,
            tokens_estimated INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER,
            timestamp TEXT NOT NULL,
            PRIMARY KEY (conversation_id, turn_number, agent_id)
        );

        CREATE TABLE IF NOT EXISTS thinking_traces (
            conversation_id TEXT NOT NULL,
            turn_number INTEGER NOT NULL,
            agent_id TEXT NOT NULL,
            content TEXT NOT NULL,
            thinking_tokens INTEGER,
            duration_ms INTEGER,
            PRIMARY KEY (conversation_id, turn_number, agent_id)
        );

        CREATE TABLE IF NOT EXISTS token_usage (
            conversation_id TEXT NOT NULL,
            turn_number INTEGER NOT NULL,
            agent_id TEXT NOT NULL,
            tokens_in INTEGER,
            tokens_out INTEGER,
            estimated INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, turn_number, agent_id)
        );

        CREATE TABLE IF NOT EXISTS context_truncations (
            conversation_id TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            turn_number INTEGER NOT NULL,
            agent_id TEXT NOT NULL,
            dropped_messages INTEGER NOT NULL,
            tokens_before INTEGER NOT NULL,
            tokens_after INTEGER NOT NULL,
            token_budget INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, sequence)
        );

        CREATE TABLE IF NOT EXISTS turn_metrics (
            conversation_id TEXT NOT NULL,
            turn_number INTEGER NOT NULL,
            convergence_score REAL NOT NULL,
            word_overlap REAL NOT NULL,
            length_ratio REAL NOT NULL,
            content_similarity REAL NOT NULL,
            a_char_count INTEGER, b_char_count INTEGER,
            a_word_count INTEGER, b_word_count INTEGER,
            a_sentence_count INTEGER, b_sentence_count INTEGER,
            a_paragraph_count INTEGER, b_paragraph_count INTEGER,
            a_question_count INTEGER, b_question_count INTEGER,
            a_exclamation_count INTEGER, b_exclamation_count INTEGER,
            a_list_item_count INTEGER, b_list_item_count INTEGER,
            a_code_block_count INTEGER, b_code_block_count INTEGER,
            a_avg_word_length REAL, b_avg_word_length REAL,
            a_avg_sentence_words REAL, b_avg_sentence_words REAL,
            a_type_token_ratio REAL, b_type_token_ratio REAL,
            a_hapax_ratio REAL, b_hapax_ratio REAL,
            a_word_entropy REAL, b_word_entropy REAL,
            a_char_entropy REAL, b_char_entropy REAL,
            a_uppercase_ratio REAL, b_uppercase_ratio REAL,
            a_punctuation_density REAL, b_punctuation_density REAL,
            a_first_person_singular INTEGER, b_first_person_singular INTEGER,
            a_first_person_plural INTEGER, b_first_person_plural INTEGER,
            a_second_person INTEGER, b_second_person INTEGER,
            PRIMARY KEY (conversation_id, turn_number)
        );

        CREATE TABLE IF NOT EXISTS import_files (
            path TEXT PRIMARY KEY,
            digest TEXT NOT NULL,
            imported_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_experiment
            ON conversations(experiment_id);
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id);
        CREATE INDEX IF NOT EXISTS idx_events_type
            ON events(type);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS import_files;
        DROP TABLE IF EXISTS turn_metrics;
        DROP TABLE IF EXISTS context_truncations;
        DROP TABLE IF EXISTS token_usage;
        DROP TABLE IF EXISTS thinking_traces;
        DROP TABLE IF EXISTS messages;
        DROP TABLE IF EXISTS experiment_events;
        DROP TABLE IF EXISTS events;
        DROP TABLE IF EXISTS conversations;
        DROP TABLE IF EXISTS experiments;
        "#,
    )?;
    Ok(())
}
