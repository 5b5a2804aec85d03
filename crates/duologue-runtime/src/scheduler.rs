//! Experiment scheduling: N independent conversations with bounded
//! parallelism, a single-writer manifest rewritten atomically after every
//! terminal conversation, and the post-run relational import.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use duologue_providers::{Provider, build_provider};
use duologue_store::{Database, ImportSummary, STORE_FILENAME, import_experiment};
use duologue_types::{
    ConversationStatus, EventPayload, ExperimentConfig, ExperimentStatus, Manifest, short_id,
};

use crate::bus::EventBus;
use crate::conductor::{Conductor, ConversationResult};
use crate::config::RuntimeSettings;
use crate::error::{Error, Result};

/// Terminal summary of one experiment run
#[derive(Debug)]
pub struct ExperimentOutcome {
    pub experiment_id: Uuid,
    pub status: ExperimentStatus,
    pub completed_conversations: u32,
    pub failed_conversations: u32,
    pub experiment_dir: PathBuf,
    pub import: Option<ImportSummary>,
}

/// Builds the provider for a model id; swapped out by tests that script
/// provider behavior
pub type ProviderFactory =
    Arc<dyn Fn(&str) -> duologue_providers::Result<Arc<dyn Provider>> + Send + Sync>;

pub struct ExperimentScheduler {
    settings: RuntimeSettings,
    config: ExperimentConfig,
    experiment_id: Uuid,
    experiment_dir: PathBuf,
    bus: Arc<EventBus>,
    manifest: Manifest,
    provider_factory: ProviderFactory,
}

impl ExperimentScheduler {
    /// Validate the config, preflight API keys, create the experiment
    /// directory, and write the initial manifest. Fails fast before any
    /// conversation begins; no events are emitted on a config error.
    pub fn new(config: ExperimentConfig, settings: RuntimeSettings) -> Result<Self> {
        config.validate()?;
        duologue_providers::preflight(&[
            config.agent_a_model.as_str(),
            config.agent_b_model.as_str(),
        ])?;

        let experiment_id = Uuid::new_v4();
        let experiment_dir = settings.experiments_dir().join(experiment_id.to_string());
        std::fs::create_dir_all(&experiment_dir)?;

        let manifest = Manifest {
            experiment_id,
            name: config.name.clone(),
            status: ExperimentStatus::Created,
            total_conversations: config.repetitions,
            completed_conversations: 0,
            failed_conversations: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            config: config.clone(),
        };
        write_manifest(&experiment_dir, &manifest)?;

        let bus = Arc::new(EventBus::new(experiment_dir.clone(), Some(experiment_id)));

        Ok(Self {
            settings,
            config,
            experiment_id,
            experiment_dir,
            bus,
            manifest,
            provider_factory: Arc::new(build_provider),
        })
    }

    /// Replace the provider construction path; each conversation gets fresh
    /// providers from the factory
    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.provider_factory = factory;
        self
    }

    pub fn experiment_id(&self) -> Uuid {
        self.experiment_id
    }

    pub fn short_id(&self) -> String {
        short_id(&self.experiment_id)
    }

    pub fn experiment_dir(&self) -> &Path {
        &self.experiment_dir
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Run every conversation, at most `max_parallel` at a time. On
    /// cancellation no new conversations launch; running ones end
    /// `interrupted` at their next check, and never-launched ones never
    /// open a log.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<ExperimentOutcome> {
        self.manifest.status = ExperimentStatus::Running;
        self.manifest.started_at = Some(Utc::now());
        write_manifest(&self.experiment_dir, &self.manifest)?;

        let max_parallel = self
            .config
            .max_parallel
            .unwrap_or(self.settings.default_max_parallel)
            .max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(max_parallel));
        let mut tasks: JoinSet<Option<ConversationResult>> = JoinSet::new();

        for _ in 0..self.config.repetitions {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let bus = self.bus.clone();
            let config = self.config.clone();
            let settings = self.settings.clone();
            let experiment_id = self.experiment_id;
            let factory = self.provider_factory.clone();

            tasks.spawn(async move {
                // Admission first: conversations cancelled while queued
                // must never emit a ConversationStart
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                if cancel.is_cancelled() {
                    return None;
                }

                let provider_a = match factory(&config.agent_a_model) {
                    Ok(provider) => provider,
                    Err(err) => {
                        tracing::error!("provider construction failed: {}", err);
                        return None;
                    }
                };
                let provider_b = match factory(&config.agent_b_model) {
                    Ok(provider) => provider,
                    Err(err) => {
                        tracing::error!("provider construction failed: {}", err);
                        return None;
                    }
                };

                let conductor = match Conductor::new(
                    bus,
                    experiment_id,
                    &config,
                    &settings,
                    provider_a,
                    provider_b,
                ) {
                    Ok(conductor) => conductor,
                    Err(err) => {
                        tracing::error!("conductor construction failed: {}", err);
                        return None;
                    }
                };

                Some(conductor.run(cancel.child_token()).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(Some(result)) => result,
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!("conversation task panicked: {}", err);
                    self.manifest.failed_conversations += 1;
                    write_manifest(&self.experiment_dir, &self.manifest)?;
                    continue;
                }
            };

            match result.status {
                ConversationStatus::Completed | ConversationStatus::ContextLimitReached => {
                    self.manifest.completed_conversations += 1;
                }
                ConversationStatus::Failed => {
                    self.manifest.failed_conversations += 1;
                }
                // Interrupted conversations count toward neither bucket
                _ => {}
            }
            write_manifest(&self.experiment_dir, &self.manifest)?;
        }

        let finished = self.manifest.completed_conversations + self.manifest.failed_conversations;
        self.manifest.status = if cancel.is_cancelled() {
            let _ = self.bus.emit(
                None,
                EventPayload::InterruptRequest {
                    source: "scheduler".to_string(),
                },
            );
            ExperimentStatus::Interrupted
        } else if finished == self.manifest.total_conversations {
            // An experiment where nothing completed did not succeed
            if self.manifest.completed_conversations == 0 && self.manifest.failed_conversations > 0
            {
                ExperimentStatus::Failed
            } else {
                ExperimentStatus::Completed
            }
        } else {
            ExperimentStatus::Interrupted
        };
        self.manifest.completed_at = Some(Utc::now());
        write_manifest(&self.experiment_dir, &self.manifest)?;

        self.bus.stop().map_err(|err| Error::Bus(err.to_string()))?;

        // Post-run relational import; a failed import leaves the JSONL
        // files authoritative and is reported, not fatal
        let import = match Database::open(&self.experiment_dir.join(STORE_FILENAME)) {
            Ok(db) => match import_experiment(&db, &self.experiment_dir) {
                Ok(summary) => Some(summary),
                Err(err) => {
                    tracing::warn!("post-run import failed: {}", err);
                    None
                }
            },
            Err(err) => {
                tracing::warn!("could not open relational store: {}", err);
                None
            }
        };

        Ok(ExperimentOutcome {
            experiment_id: self.experiment_id,
            status: self.manifest.status,
            completed_conversations: self.manifest.completed_conversations,
            failed_conversations: self.manifest.failed_conversations,
            experiment_dir: self.experiment_dir.clone(),
            import,
        })
    }
}

/// Write-to-temp then rename so readers never observe torn state
pub fn write_manifest(experiment_dir: &Path, manifest: &Manifest) -> Result<()> {
    let content = serde_json::to_string_pretty(manifest)?;
    let temp = experiment_dir.join("manifest.json.tmp");
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, experiment_dir.join("manifest.json"))?;
    Ok(())
}

/// Read a manifest back from an experiment directory
pub fn read_manifest(experiment_dir: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(experiment_dir.join("manifest.json"))?;
    Ok(serde_json::from_str(&content)?)
}

/// Locate an experiment directory by full id, id prefix, or name.
/// Ambiguous prefixes and names are rejected rather than guessed at.
pub fn find_experiment_dir(settings: &RuntimeSettings, query: &str) -> Result<PathBuf> {
    let experiments_dir = settings.experiments_dir();
    if !experiments_dir.exists() {
        return Err(Error::Config(format!("no experiments under {}", experiments_dir.display())));
    }

    let mut matches = Vec::new();
    for entry in std::fs::read_dir(&experiments_dir)? {
        let path = entry?.path();
        if !path.is_dir() || path.file_name().is_some_and(|n| n == "active") {
            continue;
        }
        let dir_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if dir_name == query || dir_name.replace('-', "").starts_with(&query.replace('-', "")) {
            matches.push(path);
            continue;
        }
        if let Ok(manifest) = read_manifest(&path)
            && manifest.name == query
        {
            matches.push(path);
        }
    }

    match matches.len() {
        0 => Err(Error::Config(format!("no experiment matches '{}'", query))),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::Config(format!(
            "ambiguous experiment query '{}': {} matches",
            query,
            matches.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duologue_types::{AgentId, AwarenessLevel, ConvergenceSettings};

    fn config(repetitions: u32) -> ExperimentConfig {
        ExperimentConfig {
            name: "sched".to_string(),
            agent_a_model: "silent".to_string(),
            agent_b_model: "silent".to_string(),
            repetitions,
            max_turns: 2,
            initial_prompt: Some("hi".to_string()),
            temperature_a: None,
            temperature_b: None,
            awareness: AwarenessLevel::None,
            awareness_a: None,
            awareness_b: None,
            convergence: ConvergenceSettings {
                action: duologue_types::ConvergenceAction::Continue,
                ..ConvergenceSettings::default()
            },
            max_parallel: Some(2),
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

    #[test]
    fn test_new_writes_initial_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RuntimeSettings::for_output_dir(dir.path().to_path_buf());
        let scheduler = ExperimentScheduler::new(config(3), settings).unwrap();

        let manifest = read_manifest(scheduler.experiment_dir()).unwrap();
        assert_eq!(manifest.status, ExperimentStatus::Created);
        assert_eq!(manifest.total_conversations, 3);
        assert_eq!(manifest.completed_conversations, 0);
    }

    #[test]
    fn test_invalid_config_rejected_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RuntimeSettings::for_output_dir(dir.path().to_path_buf());
        let mut bad = config(1);
        bad.repetitions = 0;
        assert!(ExperimentScheduler::new(bad, settings).is_err());
        // No experiment directory appeared
        assert!(!dir.path().join("experiments").exists());
    }

    #[test]
    fn test_manifest_rename_is_atomic_shape() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RuntimeSettings::for_output_dir(dir.path().to_path_buf());
        let scheduler = ExperimentScheduler::new(config(1), settings).unwrap();

        // The temp file never lingers
        assert!(!scheduler.experiment_dir().join("manifest.json.tmp").exists());
        assert!(scheduler.experiment_dir().join("manifest.json").exists());
    }
}
