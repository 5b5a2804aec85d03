use anyhow::{Context, Result};

use duologue_runtime::daemon::init_tracing;
use duologue_runtime::{run_daemonized, run_foreground};
use duologue_types::ExperimentConfig;

use crate::context::CliContext;

pub fn handle(context: &CliContext, config_path: &str, foreground: bool) -> Result<()> {
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("cannot read config {}", config_path))?;
    let config: ExperimentConfig =
        serde_json::from_str(&content).with_context(|| "invalid experiment config")?;
    config.validate()?;

    launch(context, config, foreground)
}

pub fn launch(context: &CliContext, config: ExperimentConfig, foreground: bool) -> Result<()> {
    if foreground {
        init_tracing(None);
        let outcome = run_foreground(config, context.settings.clone())?;
        println!(
            "experiment {} {}: {} completed, {} failed",
            outcome.experiment_id,
            status_word(outcome.status),
            outcome.completed_conversations,
            outcome.failed_conversations
        );
        println!("logs: {}", outcome.experiment_dir.display());
        if let Some(import) = outcome.import {
            println!(
                "imported {} conversations ({} events)",
                import.conversations, import.events_inserted
            );
        }
    } else {
        match run_daemonized(config, context.settings.clone())? {
            Some(launch) => {
                println!("experiment {} started (pid {})", launch.experiment_id, launch.pid);
                println!("logs: {}", launch.experiment_dir.display());
                println!(
                    "stop with: duologue stop {} (or touch {}/STOP)",
                    launch.experiment_id,
                    launch.experiment_dir.display()
                );
            }
            // The child never reaches here; it exits inside run_daemonized
            None => unreachable!("daemon child returned"),
        }
    }
    Ok(())
}

fn status_word(status: duologue_types::ExperimentStatus) -> &'static str {
    match status {
        duologue_types::ExperimentStatus::Created => "created",
        duologue_types::ExperimentStatus::Running => "running",
        duologue_types::ExperimentStatus::Completed => "completed",
        duologue_types::ExperimentStatus::Failed => "failed",
        duologue_types::ExperimentStatus::Interrupted => "interrupted",
    }
}
