//! Post-run batch import: every `*_events.jsonl` in an experiment directory
//! is loaded into the relational store, one transaction per conversation.
//! The store is a pure function of the event files; re-import is a no-op
//! thanks to digest tracking and `(conversation_id, sequence)` dedup.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use duologue_engine::{StateBuilder, turn_text_metrics};
use duologue_types::{AgentId, EventPayload, EventRecord, Manifest};

use crate::Database;
use crate::error::{Error, Result};
use crate::records::{ConversationRecord, ExperimentRecord, MessageRecord};

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub conversations: usize,
    pub events_inserted: u64,
    pub files_skipped: usize,
    /// Files that failed to import; the rest of the directory still loads
    pub errors: Vec<String>,
}

/// Load one experiment directory into the store
pub fn import_experiment(db: &Database, experiment_dir: &Path) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    let manifest = read_manifest(experiment_dir)?;
    if let Some(manifest) = &manifest {
        db.upsert_experiment(&experiment_record(manifest))?;
    }

    let entries: Vec<_> = walkdir::WalkDir::new(experiment_dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if name == "experiment.jsonl" {
            match import_experiment_log(db, &path, manifest.as_ref()) {
                Ok(inserted) => summary.events_inserted += inserted,
                Err(err) => summary.errors.push(format!("{}: {}", name, err)),
            }
        } else if name.ends_with("_events.jsonl") {
            match import_conversation_log(db, &path) {
                Ok(ImportedFile::Loaded(inserted)) => {
                    summary.conversations += 1;
                    summary.events_inserted += inserted;
                }
                Ok(ImportedFile::Unchanged) => summary.files_skipped += 1,
                Err(err) => {
                    let _ = db.rollback();
                    summary.errors.push(format!("{}: {}", name, err));
                }
            }
        }
    }

    Ok(summary)
}

enum ImportedFile {
    Loaded(u64),
    Unchanged,
}

fn read_manifest(experiment_dir: &Path) -> Result<Option<Manifest>> {
    let path = experiment_dir.join("manifest.json");
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let manifest: Manifest = serde_json::from_str(&content)?;
    Ok(Some(manifest))
}

fn experiment_record(manifest: &Manifest) -> ExperimentRecord {
    ExperimentRecord {
        id: manifest.experiment_id.to_string(),
        name: manifest.name.clone(),
        status: status_str(&manifest.status),
        total_conversations: manifest.total_conversations,
        completed_conversations: manifest.completed_conversations,
        failed_conversations: manifest.failed_conversations,
        created_at: manifest
            .created_at
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        started_at: manifest
            .started_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        completed_at: manifest
            .completed_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        config_json: serde_json::to_string(&manifest.config).unwrap_or_else(|_| "{}".to_string()),
    }
}

fn status_str<T: serde::Serialize>(status: &T) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn file_digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Parse a JSONL file into (raw line, typed record) pairs
fn read_lines(path: &Path) -> Result<Vec<(String, EventRecord)>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = EventRecord::from_jsonl(trimmed)
            .map_err(|err| Error::Parse(format!("{}: {}", path.display(), err)))?;
        lines.push((trimmed.to_string(), record));
    }
    Ok(lines)
}

fn import_experiment_log(
    db: &Database,
    path: &Path,
    manifest: Option<&Manifest>,
) -> Result<u64> {
    let digest = file_digest(path)?;
    let path_str = path.to_string_lossy().to_string();
    if db.file_already_imported(&path_str, &digest)? {
        return Ok(0);
    }

    let lines = read_lines(path)?;
    let mut inserted = 0u64;

    db.begin()?;
    for (raw, record) in &lines {
        let experiment_id = record
            .experiment_id
            .map(|id| id.to_string())
            .or_else(|| manifest.map(|m| m.experiment_id.to_string()));
        let Some(experiment_id) = experiment_id else {
            continue;
        };
        if db.insert_experiment_event(
            &experiment_id,
            record.sequence,
            record.kind().as_str(),
            &record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            raw,
        )? {
            inserted += 1;
        }
    }
    db.record_import_file(
        &path_str,
        &digest,
        &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    )?;
    db.commit()?;

    Ok(inserted)
}

fn import_conversation_log(db: &Database, path: &Path) -> Result<ImportedFile> {
    let digest = file_digest(path)?;
    let path_str = path.to_string_lossy().to_string();
    if db.file_already_imported(&path_str, &digest)? {
        return Ok(ImportedFile::Unchanged);
    }

    let lines = read_lines(path)?;
    let events: Vec<EventRecord> = lines.iter().map(|(_, record)| record.clone()).collect();
    let conversation_id = events
        .iter()
        .find_map(|event| event.conversation_id)
        .ok_or_else(|| Error::Parse(format!("{}: no conversation_id", path.display())))?
        .to_string();

    let state = StateBuilder::replay(&events)?;

    db.begin()?;

    let mut inserted = 0u64;
    for (raw, record) in &lines {
        if db.insert_event(
            &conversation_id,
            record.sequence,
            record.kind().as_str(),
            &record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            raw,
        )? {
            inserted += 1;
        }
    }

    db.upsert_conversation(&ConversationRecord {
        id: conversation_id.clone(),
        experiment_id: state.experiment_id.map(|id| id.to_string()),
        agent_a_model: state
            .agent_a
            .as_ref()
            .map(|a| a.model.clone())
            .unwrap_or_default(),
        agent_b_model: state
            .agent_b
            .as_ref()
            .map(|a| a.model.clone())
            .unwrap_or_default(),
        agent_a_name: state.agent_a.as_ref().map(|a| a.name().to_string()),
        agent_b_name: state.agent_b.as_ref().map(|a| a.name().to_string()),
        initial_prompt: Some(state.initial_prompt.clone()),
        max_turns: state.max_turns,
        first_speaker: state.first_speaker.map(|s| s.as_str().to_string()),
        status: state
            .status
            .map(|s| status_str(&s))
            .unwrap_or_else(|| "created".to_string()),
        ended_reason: state.ended_reason.map(|r| r.as_str().to_string()),
        final_convergence: state.final_convergence,
        total_turns: state.turns_completed,
        tokens_in: state.tokens_in,
        tokens_out: state.tokens_out,
        branched_from: state.branched_from.map(|id| id.to_string()),
        branch_turn: state.branch_turn,
        error: state.error.clone(),
        started_at: state
            .started_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ended_at: state
            .ended_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
    })?;

    // Per-turn tables come from the events directly; replay already proved
    // the log well-formed
    let mut turn_texts: BTreeMap<u32, (String, String)> = BTreeMap::new();
    let mut turn_scores: BTreeMap<u32, f64> = BTreeMap::new();

    for (_, record) in &lines {
        match &record.payload {
            EventPayload::MessageComplete {
                agent_id,
                turn_number,
                content,
                model,
                tokens_in,
                tokens_out,
                tokens_estimated,
                duration_ms,
            } => {
                db.upsert_message(&MessageRecord {
                    conversation_id: conversation_id.clone(),
                    turn_number: *turn_number,
                    agent_id: agent_id.as_str().to_string(),
                    content: content.clone(),
                    model: Some(model.clone()),
                    tokens_in: *tokens_in,
                    tokens_out: *tokens_out,
                    tokens_estimated: *tokens_estimated,
                    duration_ms: Some(*duration_ms),
                    timestamp: record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                })?;
                db.upsert_token_usage(
                    &conversation_id,
                    *turn_number,
                    agent_id.as_str(),
                    *tokens_in,
                    *tokens_out,
                    *tokens_estimated,
                )?;

                let entry = turn_texts.entry(*turn_number).or_default();
                match agent_id {
                    AgentId::AgentA => entry.0 = content.clone(),
                    AgentId::AgentB => entry.1 = content.clone(),
                }
            }

            EventPayload::ThinkingComplete {
                agent_id,
                turn_number,
                content,
                thinking_tokens,
                duration_ms,
            } => {
                db.upsert_thinking_trace(
                    &conversation_id,
                    *turn_number,
                    agent_id.as_str(),
                    content,
                    *thinking_tokens,
                    *duration_ms,
                )?;
            }

            EventPayload::ContextTruncation {
                agent_id,
                turn_number,
                dropped_messages,
                tokens_before,
                tokens_after,
                token_budget,
            } => {
                db.upsert_context_truncation(
                    &conversation_id,
                    record.sequence,
                    *turn_number,
                    agent_id.as_str(),
                    *dropped_messages,
                    *tokens_before,
                    *tokens_after,
                    *token_budget,
                )?;
            }

            EventPayload::TurnComplete {
                turn_number,
                convergence_score,
            } => {
                turn_scores.insert(*turn_number, *convergence_score);
            }

            _ => {}
        }
    }

    for (turn_number, score) in &turn_scores {
        let (a_text, b_text) = turn_texts
            .get(turn_number)
            .cloned()
            .unwrap_or_default();
        let metrics = turn_text_metrics(*turn_number, &a_text, &b_text, *score);
        db.upsert_turn_metrics(&conversation_id, &metrics)?;
    }

    db.record_import_file(
        &path_str,
        &digest,
        &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    )?;
    db.commit()?;

    Ok(ImportedFile::Loaded(inserted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duologue_types::{
        AgentConfig, AwarenessLevel, ConvergenceSettings, EndedReason, EventPayload,
        ExperimentConfig, ExperimentStatus,
    };
    use std::io::Write;
    use uuid::Uuid;

    fn agent(id: AgentId) -> AgentConfig {
        AgentConfig {
            id,
            model: "test".to_string(),
            display_name: "test".to_string(),
            chosen_name: None,
            temperature: None,
            awareness: AwarenessLevel::Basic,
            thinking_enabled: false,
            thinking_budget: None,
        }
    }

    fn config() -> ExperimentConfig {
        ExperimentConfig {
            name: "imported".to_string(),
            agent_a_model: "test".to_string(),
            agent_b_model: "test".to_string(),
            repetitions: 1,
            max_turns: 2,
            initial_prompt: Some("go".to_string()),
            temperature_a: None,
            temperature_b: None,
            awareness: AwarenessLevel::Basic,
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

    fn write_conversation(
        dir: &Path,
        conversation_id: Uuid,
        experiment_id: Uuid,
        turns: u32,
    ) {
        let mut events = Vec::new();
        let mut seq = 0u64;
        let mut next = || {
            seq += 1;
            seq
        };

        let record = |sequence: u64, payload: EventPayload| EventRecord {
            sequence,
            timestamp: Utc::now(),
            conversation_id: Some(conversation_id),
            experiment_id: Some(experiment_id),
            payload,
            metadata: None,
        };

        events.push(record(
            next(),
            EventPayload::ConversationStart {
                agent_a: agent(AgentId::AgentA),
                agent_b: agent(AgentId::AgentB),
                initial_prompt: "go".to_string(),
                max_turns: turns,
                first_speaker: AgentId::AgentA,
                branched_from: None,
                branch_turn: None,
            },
        ));
        for turn in 0..turns {
            events.push(record(next(), EventPayload::TurnStart { turn_number: turn }));
            for agent_id in [AgentId::AgentA, AgentId::AgentB] {
                events.push(record(
                    next(),
                    EventPayload::MessageComplete {
                        agent_id,
                        turn_number: turn,
                        content: format!("words for turn {}", turn),
                        model: "test".to_string(),
                        tokens_in: Some(12),
                        tokens_out: Some(6),
                        tokens_estimated: false,
                        duration_ms: 2,
                    },
                ));
            }
            events.push(record(
                next(),
                EventPayload::TurnComplete {
                    turn_number: turn,
                    convergence_score: 0.9,
                },
            ));
        }
        events.push(record(
            next(),
            EventPayload::ConversationEnd {
                ended_reason: EndedReason::MaxTurns,
                final_convergence: Some(0.9),
                duration_ms: 40,
                total_turns: turns,
                error: None,
            },
        ));

        let path = dir.join(format!("{}_events.jsonl", conversation_id));
        let mut file = std::fs::File::create(path).unwrap();
        for event in events {
            writeln!(file, "{}", event.to_jsonl().unwrap()).unwrap();
        }
    }

    fn write_manifest(dir: &Path, experiment_id: Uuid) {
        let manifest = Manifest {
            experiment_id,
            name: "imported".to_string(),
            status: ExperimentStatus::Completed,
            total_conversations: 2,
            completed_conversations: 2,
            failed_conversations: 0,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
            config: config(),
        };
        std::fs::write(
            dir.join("manifest.json"),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
    }

    fn sample_dir() -> (tempfile::TempDir, Uuid) {
        let dir = tempfile::tempdir().unwrap();
        let experiment_id = Uuid::new_v4();
        write_manifest(dir.path(), experiment_id);
        write_conversation(dir.path(), Uuid::new_v4(), experiment_id, 2);
        write_conversation(dir.path(), Uuid::new_v4(), experiment_id, 3);
        (dir, experiment_id)
    }

    #[test]
    fn test_import_loads_all_tables() {
        let (dir, experiment_id) = sample_dir();
        let db = Database::open_in_memory().unwrap();

        let summary = import_experiment(&db, dir.path()).unwrap();
        assert!(summary.errors.is_empty());
        assert_eq!(summary.conversations, 2);

        assert_eq!(db.count_rows("experiments").unwrap(), 1);
        assert_eq!(db.count_rows("conversations").unwrap(), 2);
        // 2 messages per turn, 2 + 3 turns
        assert_eq!(db.count_rows("messages").unwrap(), 10);
        assert_eq!(db.count_rows("turn_metrics").unwrap(), 5);
        assert_eq!(db.count_rows("token_usage").unwrap(), 10);

        let conversations = db.list_conversations(&experiment_id.to_string()).unwrap();
        assert_eq!(conversations.len(), 2);
        assert!(conversations.iter().all(|c| c.status == "completed"));
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let (dir, _) = sample_dir();
        let db = Database::open_in_memory().unwrap();

        let first = import_experiment(&db, dir.path()).unwrap();
        assert!(first.events_inserted > 0);
        let events_after_first = db.count_rows("events").unwrap();

        let second = import_experiment(&db, dir.path()).unwrap();
        assert_eq!(second.events_inserted, 0);
        assert_eq!(second.files_skipped, 2);
        assert_eq!(db.count_rows("events").unwrap(), events_after_first);
        assert_eq!(db.count_rows("messages").unwrap(), 10);
        assert_eq!(db.count_rows("conversations").unwrap(), 2);
    }

    #[test]
    fn test_changed_file_reimports_without_duplicates() {
        let (dir, experiment_id) = sample_dir();
        let db = Database::open_in_memory().unwrap();
        import_experiment(&db, dir.path()).unwrap();

        // Append a new conversation; prior files are unchanged and skipped
        write_conversation(dir.path(), Uuid::new_v4(), experiment_id, 1);
        let summary = import_experiment(&db, dir.path()).unwrap();
        assert_eq!(summary.conversations, 1);
        assert_eq!(summary.files_skipped, 2);
        assert_eq!(db.count_rows("conversations").unwrap(), 3);
    }

    #[test]
    fn test_malformed_file_does_not_block_others() {
        let (dir, _) = sample_dir();
        std::fs::write(dir.path().join("broken_events.jsonl"), "not json\n").unwrap();

        let db = Database::open_in_memory().unwrap();
        let summary = import_experiment(&db, dir.path()).unwrap();
        assert_eq!(summary.conversations, 2);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("broken_events.jsonl"));
    }
}
