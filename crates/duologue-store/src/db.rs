use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

use duologue_engine::TurnTextMetrics;

use crate::Result;
use crate::records::{ConversationRecord, ExperimentRecord, MessageRecord};
use crate::schema::init_schema;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let db = Self { conn };
        init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        init_schema(&db.conn)?;
        Ok(db)
    }

    // Import runs one transaction per conversation; rusqlite's typed
    // transactions need &mut, so the importer drives these directly.

    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    pub fn upsert_experiment(&self, record: &ExperimentRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO experiments (
                id, name, status, total_conversations, completed_conversations,
                failed_conversations, created_at, started_at, completed_at, config_json
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                name = ?2,
                status = ?3,
                total_conversations = ?4,
                completed_conversations = ?5,
                failed_conversations = ?6,
                started_at = COALESCE(?8, started_at),
                completed_at = COALESCE(?9, completed_at),
                config_json = ?10
            "#,
            params![
                &record.id,
                &record.name,
                &record.status,
                &record.total_conversations,
                &record.completed_conversations,
                &record.failed_conversations,
                &record.created_at,
                &record.started_at,
                &record.completed_at,
                &record.config_json,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_conversation(&self, record: &ConversationRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO conversations (
                id, experiment_id, agent_a_model, agent_b_model, agent_a_name,
                agent_b_name, initial_prompt, max_turns, first_speaker, status,
                ended_reason, final_convergence, total_turns, tokens_in, tokens_out,
                branched_from, branch_turn, error, started_at, ended_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                    ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT(id) DO UPDATE SET
                experiment_id = ?2,
                agent_a_name = ?5,
                agent_b_name = ?6,
                status = ?10,
                ended_reason = ?11,
                final_convergence = ?12,
                total_turns = ?13,
                tokens_in = ?14,
                tokens_out = ?15,
                error = ?18,
                started_at = COALESCE(?19, started_at),
                ended_at = COALESCE(?20, ended_at)
            "#,
            params![
                &record.id,
                &record.experiment_id,
                &record.agent_a_model,
                &record.agent_b_model,
                &record.agent_a_name,
                &record.agent_b_name,
                &record.initial_prompt,
                &record.max_turns,
                &record.first_speaker,
                &record.status,
                &record.ended_reason,
                &record.final_convergence,
                &record.total_turns,
                &(record.tokens_in as i64),
                &(record.tokens_out as i64),
                &record.branched_from,
                &record.branch_turn,
                &record.error,
                &record.started_at,
                &record.ended_at,
            ],
        )?;
        Ok(())
    }

    /// Raw event insert keyed by (conversation_id, sequence). Returns true
    /// when the row was new; duplicates are discarded, which is what makes
    /// re-import idempotent.
    pub fn insert_event(
        &self,
        conversation_id: &str,
        sequence: u64,
        event_type: &str,
        timestamp: &str,
        raw: &str,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO events (conversation_id, sequence, type, timestamp, raw)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![conversation_id, sequence as i64, event_type, timestamp, raw],
        )?;
        Ok(changed == 1)
    }

    pub fn insert_experiment_event(
        &self,
        experiment_id: &str,
        sequence: u64,
        event_type: &str,
        timestamp: &str,
        raw: &str,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO experiment_events
                (experiment_id, sequence, type, timestamp, raw)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![experiment_id, sequence as i64, event_type, timestamp, raw],
        )?;
        Ok(changed == 1)
    }

    pub fn upsert_message(&self, record: &MessageRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO messages (
                conversation_id, turn_number, agent_id, content, model,
                tokens_in, tokens_out, tokens_estimated, duration_ms, timestamp
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(conversation_id, turn_number, agent_id) DO UPDATE SET
                content = ?4,
                model = ?5,
                tokens_in = ?6,
                tokens_out = ?7,
                tokens_estimated = ?8,
                duration_ms = ?9,
                timestamp = ?10
            "#,
            params![
                &record.conversation_id,
                &record.turn_number,
                &record.agent_id,
                &record.content,
                &record.model,
                &record.tokens_in.map(|v| v as i64),
                &record.tokens_out.map(|v| v as i64),
                &record.tokens_estimated,
                &record.duration_ms.map(|v| v as i64),
                &record.timestamp,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_thinking_trace(
        &self,
        conversation_id: &str,
        turn_number: u32,
        agent_id: &str,
        content: &str,
        thinking_tokens: Option<u64>,
        duration_ms: Option<u64>,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO thinking_traces (
                conversation_id, turn_number, agent_id, content,
                thinking_tokens, duration_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(conversation_id, turn_number, agent_id) DO UPDATE SET
                content = ?4,
                thinking_tokens = ?5,
                duration_ms = ?6
            "#,
            params![
                conversation_id,
                turn_number,
                agent_id,
                content,
                thinking_tokens.map(|v| v as i64),
                duration_ms.map(|v| v as i64)
            ],
        )?;
        Ok(())
    }

    pub fn upsert_token_usage(
        &self,
        conversation_id: &str,
        turn_number: u32,
        agent_id: &str,
        tokens_in: Option<u64>,
        tokens_out: Option<u64>,
        estimated: bool,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO token_usage (
                conversation_id, turn_number, agent_id, tokens_in, tokens_out, estimated
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(conversation_id, turn_number, agent_id) DO UPDATE SET
                tokens_in = ?4,
                tokens_out = ?5,
                estimated = ?6
            "#,
            params![
                conversation_id,
                turn_number,
                agent_id,
                tokens_in.map(|v| v as i64),
                tokens_out.map(|v| v as i64),
                estimated
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn upsert_context_truncation(
        &self,
        conversation_id: &str,
        sequence: u64,
        turn_number: u32,
        agent_id: &str,
        dropped_messages: u32,
        tokens_before: u64,
        tokens_after: u64,
        token_budget: u64,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO context_truncations (
                conversation_id, sequence, turn_number, agent_id,
                dropped_messages, tokens_before, tokens_after, token_budget
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                conversation_id,
                sequence as i64,
                turn_number,
                agent_id,
                dropped_messages,
                tokens_before as i64,
                tokens_after as i64,
                token_budget as i64
            ],
        )?;
        Ok(())
    }

    pub fn upsert_turn_metrics(
        &self,
        conversation_id: &str,
        metrics: &TurnTextMetrics,
    ) -> Result<()> {
        let a = &metrics.agent_a;
        let b = &metrics.agent_b;
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO turn_metrics (
                conversation_id, turn_number, convergence_score, word_overlap,
                length_ratio, content_similarity,
                a_char_count, b_char_count,
                a_word_count, b_word_count,
                a_sentence_count, b_sentence_count,
                a_paragraph_count, b_paragraph_count,
                a_question_count, b_question_count,
                a_exclamation_count, b_exclamation_count,
                a_list_item_count, b_list_item_count,
                a_code_block_count, b_code_block_count,
                a_avg_word_length, b_avg_word_length,
                a_avg_sentence_words, b_avg_sentence_words,
                a_type_token_ratio, b_type_token_ratio,
                a_hapax_ratio, b_hapax_ratio,
                a_word_entropy, b_word_entropy,
                a_char_entropy, b_char_entropy,
                a_uppercase_ratio, b_uppercase_ratio,
                a_punctuation_density, b_punctuation_density,
                a_first_person_singular, b_first_person_singular,
                a_first_person_plural, b_first_person_plural,
                a_second_person, b_second_person
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                    ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20,
                    ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
                    ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38, ?39, ?40,
                    ?41, ?42, ?43, ?44)
            "#,
            params![
                conversation_id,
                metrics.turn_number,
                metrics.convergence_score,
                metrics.word_overlap,
                metrics.length_ratio,
                metrics.content_similarity,
                a.char_count as i64,
                b.char_count as i64,
                a.word_count as i64,
                b.word_count as i64,
                a.sentence_count as i64,
                b.sentence_count as i64,
                a.paragraph_count as i64,
                b.paragraph_count as i64,
                a.question_count as i64,
                b.question_count as i64,
                a.exclamation_count as i64,
                b.exclamation_count as i64,
                a.list_item_count as i64,
                b.list_item_count as i64,
                a.code_block_count as i64,
                b.code_block_count as i64,
                a.avg_word_length,
                b.avg_word_length,
                a.avg_sentence_words,
                b.avg_sentence_words,
                a.type_token_ratio,
                b.type_token_ratio,
                a.hapax_ratio,
                b.hapax_ratio,
                a.word_entropy,
                b.word_entropy,
                a.char_entropy,
                b.char_entropy,
                a.uppercase_ratio,
                b.uppercase_ratio,
                a.punctuation_density,
                b.punctuation_density,
                a.first_person_singular as i64,
                b.first_person_singular as i64,
                a.first_person_plural as i64,
                b.first_person_plural as i64,
                a.second_person as i64,
                b.second_person as i64,
            ],
        )?;
        Ok(())
    }

    /// Whether this exact file content was already imported
    pub fn file_already_imported(&self, path: &str, digest: &str) -> Result<bool> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT digest FROM import_files WHERE path = ?1",
                [path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.as_deref() == Some(digest))
    }

    pub fn record_import_file(&self, path: &str, digest: &str, imported_at: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO import_files (path, digest, imported_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(path) DO UPDATE SET
                digest = ?2,
                imported_at = ?3
            "#,
            params![path, digest, imported_at],
        )?;
        Ok(())
    }

    pub fn get_experiment(&self, id: &str) -> Result<Option<ExperimentRecord>> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT id, name, status, total_conversations, completed_conversations,
                       failed_conversations, created_at, started_at, completed_at, config_json
                FROM experiments
                WHERE id = ?1
                "#,
                [id],
                |row| {
                    Ok(ExperimentRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        status: row.get(2)?,
                        total_conversations: row.get(3)?,
                        completed_conversations: row.get(4)?,
                        failed_conversations: row.get(5)?,
                        created_at: row.get(6)?,
                        started_at: row.get(7)?,
                        completed_at: row.get(8)?,
                        config_json: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_conversations(&self, experiment_id: &str) -> Result<Vec<ConversationRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, experiment_id, agent_a_model, agent_b_model, agent_a_name,
                   agent_b_name, initial_prompt, max_turns, first_speaker, status,
                   ended_reason, final_convergence, total_turns, tokens_in, tokens_out,
                   branched_from, branch_turn, error, started_at, ended_at
            FROM conversations
            WHERE experiment_id = ?1
            ORDER BY started_at
            "#,
        )?;

        let conversations = stmt
            .query_map([experiment_id], |row| {
                Ok(ConversationRecord {
                    id: row.get(0)?,
                    experiment_id: row.get(1)?,
                    agent_a_model: row.get(2)?,
                    agent_b_model: row.get(3)?,
                    agent_a_name: row.get(4)?,
                    agent_b_name: row.get(5)?,
                    initial_prompt: row.get(6)?,
                    max_turns: row.get(7)?,
                    first_speaker: row.get(8)?,
                    status: row.get(9)?,
                    ended_reason: row.get(10)?,
                    final_convergence: row.get(11)?,
                    total_turns: row.get(12)?,
                    tokens_in: row.get::<_, i64>(13)? as u64,
                    tokens_out: row.get::<_, i64>(14)? as u64,
                    branched_from: row.get(15)?,
                    branch_turn: row.get(16)?,
                    error: row.get(17)?,
                    started_at: row.get(18)?,
                    ended_at: row.get(19)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(conversations)
    }

    /// Row count for one table; used by import verification and tests
    pub fn count_rows(&self, table: &str) -> Result<u64> {
        // Table names come from a fixed internal set, never user input
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }

    pub fn count_events(&self, conversation_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE conversation_id = ?1",
            [conversation_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn experiment(id: &str) -> ExperimentRecord {
        ExperimentRecord {
            id: id.to_string(),
            name: "baseline".to_string(),
            status: "completed".to_string(),
            total_conversations: 2,
            completed_conversations: 2,
            failed_conversations: 0,
            created_at: "2026-01-10T10:00:00Z".to_string(),
            started_at: Some("2026-01-10T10:00:01Z".to_string()),
            completed_at: Some("2026-01-10T10:05:00Z".to_string()),
            config_json: "{}".to_string(),
        }
    }

    fn conversation(id: &str, experiment_id: &str) -> ConversationRecord {
        ConversationRecord {
            id: id.to_string(),
            experiment_id: Some(experiment_id.to_string()),
            agent_a_model: "test".to_string(),
            agent_b_model: "test".to_string(),
            agent_a_name: Some("test-1".to_string()),
            agent_b_name: Some("test-2".to_string()),
            initial_prompt: Some("hello".to_string()),
            max_turns: 5,
            first_speaker: Some("agent_a".to_string()),
            status: "completed".to_string(),
            ended_reason: Some("max_turns".to_string()),
            final_convergence: Some(0.4),
            total_turns: 5,
            tokens_in: 100,
            tokens_out: 50,
            branched_from: None,
            branch_turn: None,
            error: None,
            started_at: Some("2026-01-10T10:00:01Z".to_string()),
            ended_at: Some("2026-01-10T10:01:00Z".to_string()),
        }
    }

    #[test]
    fn test_schema_initializes_empty() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.count_rows("experiments").unwrap(), 0);
        assert_eq!(db.count_rows("turn_metrics").unwrap(), 0);
    }

    #[test]
    fn test_experiment_upsert_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_experiment(&experiment("exp-1")).unwrap();
        db.upsert_experiment(&experiment("exp-1")).unwrap();

        assert_eq!(db.count_rows("experiments").unwrap(), 1);
        let record = db.get_experiment("exp-1").unwrap().unwrap();
        assert_eq!(record.name, "baseline");
        assert_eq!(record.completed_conversations, 2);
    }

    #[test]
    fn test_conversation_listing() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_experiment(&experiment("exp-1")).unwrap();
        db.upsert_conversation(&conversation("conv-1", "exp-1")).unwrap();
        db.upsert_conversation(&conversation("conv-2", "exp-1")).unwrap();

        let conversations = db.list_conversations("exp-1").unwrap();
        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].ended_reason.as_deref(), Some("max_turns"));
    }

    #[test]
    fn test_duplicate_events_discarded() {
        let db = Database::open_in_memory().unwrap();
        let inserted = db
            .insert_event("conv-1", 1, "turn_start", "2026-01-10T10:00:00Z", "{}")
            .unwrap();
        assert!(inserted);
        let inserted = db
            .insert_event("conv-1", 1, "turn_start", "2026-01-10T10:00:00Z", "{}")
            .unwrap();
        assert!(!inserted);
        assert_eq!(db.count_events("conv-1").unwrap(), 1);
    }

    #[test]
    fn test_import_file_digest_tracking() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.file_already_imported("/a.jsonl", "abc").unwrap());

        db.record_import_file("/a.jsonl", "abc", "2026-01-10T10:00:00Z")
            .unwrap();
        assert!(db.file_already_imported("/a.jsonl", "abc").unwrap());
        // Changed content means a different digest and a fresh import
        assert!(!db.file_already_imported("/a.jsonl", "def").unwrap());
    }

    #[test]
    fn test_turn_metrics_wide_row() {
        let db = Database::open_in_memory().unwrap();
        let metrics = duologue_engine::turn_text_metrics(3, "Hello there!", "Hello there!", 0.95);
        db.upsert_turn_metrics("conv-1", &metrics).unwrap();
        db.upsert_turn_metrics("conv-1", &metrics).unwrap();
        assert_eq!(db.count_rows("turn_metrics").unwrap(), 1);
    }
}
