//! Isolated on-disk world for experiment tests: a tempdir laid out like a
//! real output directory.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;
use uuid::Uuid;

use crate::fixtures::write_event_log;

pub struct ExperimentWorld {
    temp_dir: TempDir,
}

impl Default for ExperimentWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentWorld {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// The output directory (what OUTPUT_DIR would point at)
    pub fn output_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn experiments_dir(&self) -> PathBuf {
        self.temp_dir.path().join("experiments")
    }

    /// Create an experiment directory populated with `conversations`
    /// complete logs of `turns` turns each
    pub fn with_experiment(&self, conversations: u32, turns: u32) -> Result<(PathBuf, Uuid)> {
        let experiment_id = Uuid::new_v4();
        let dir = self.experiments_dir().join(experiment_id.to_string());
        std::fs::create_dir_all(&dir)?;
        for _ in 0..conversations {
            write_event_log(&dir, Uuid::new_v4(), experiment_id, turns)?;
        }
        Ok((dir, experiment_id))
    }

    /// Drop the STOP sentinel into an experiment directory
    pub fn request_stop(&self, experiment_dir: &Path) -> Result<()> {
        std::fs::write(experiment_dir.join("STOP"), "")?;
        Ok(())
    }
}
