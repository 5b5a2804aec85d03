use std::path::PathBuf;

use anyhow::{Result, bail};

use duologue_runtime::RuntimeSettings;

/// Resolved settings shared by every handler
pub struct CliContext {
    pub settings: RuntimeSettings,
}

impl CliContext {
    pub fn resolve(explicit_output: Option<&str>) -> Result<Self> {
        let settings = RuntimeSettings::resolve(explicit_output)?;
        Ok(Self { settings })
    }

    /// Locate a conversation log by conversation id or id prefix, searching
    /// every experiment directory. Returns (experiment_dir, log_path).
    pub fn find_conversation_log(&self, query: &str) -> Result<(PathBuf, PathBuf)> {
        let experiments_dir = self.settings.experiments_dir();
        if !experiments_dir.exists() {
            bail!("no experiments under {}", experiments_dir.display());
        }

        let normalized = query.replace('-', "");
        let mut matches = Vec::new();

        for entry in std::fs::read_dir(&experiments_dir)? {
            let experiment_dir = entry?.path();
            if !experiment_dir.is_dir() {
                continue;
            }
            for file in std::fs::read_dir(&experiment_dir)? {
                let path = file?.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(conversation_id) = name.strip_suffix("_events.jsonl") else {
                    continue;
                };
                if conversation_id.replace('-', "").starts_with(&normalized) {
                    matches.push((experiment_dir.clone(), path));
                    break;
                }
            }
        }

        match matches.len() {
            0 => bail!("no conversation matches '{}'", query),
            1 => Ok(matches.remove(0)),
            n => bail!("ambiguous conversation id '{}': {} matches", query, n),
        }
    }
}
