use anyhow::Result;

use duologue_engine::StateBuilder;
use duologue_runtime::{find_experiment_dir, read_manifest};

use crate::context::CliContext;

pub fn handle(context: &CliContext, query: Option<&str>) -> Result<()> {
    match query {
        Some(query) => show_one(context, query),
        None => list_all(context),
    }
}

fn list_all(context: &CliContext) -> Result<()> {
    let experiments_dir = context.settings.experiments_dir();
    if !experiments_dir.exists() {
        println!("no experiments under {}", experiments_dir.display());
        return Ok(());
    }

    let mut rows = Vec::new();
    for entry in std::fs::read_dir(&experiments_dir)? {
        let path = entry?.path();
        if !path.is_dir() || path.file_name().is_some_and(|n| n == "active") {
            continue;
        }
        if let Ok(manifest) = read_manifest(&path) {
            rows.push(manifest);
        }
    }
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    if rows.is_empty() {
        println!("no experiments found");
        return Ok(());
    }
    for manifest in rows {
        println!(
            "{}  {:<12}  {:>3}/{:<3}  {}",
            manifest.experiment_id,
            format!("{:?}", manifest.status).to_lowercase(),
            manifest.completed_conversations + manifest.failed_conversations,
            manifest.total_conversations,
            manifest.name
        );
    }
    Ok(())
}

fn show_one(context: &CliContext, query: &str) -> Result<()> {
    let experiment_dir = find_experiment_dir(&context.settings, query)?;
    let manifest = read_manifest(&experiment_dir)?;

    println!("experiment: {} ({})", manifest.name, manifest.experiment_id);
    println!("status:     {:?}", manifest.status);
    println!(
        "progress:   {} completed, {} failed, {} total",
        manifest.completed_conversations,
        manifest.failed_conversations,
        manifest.total_conversations
    );
    println!("created:    {}", manifest.created_at.to_rfc3339());
    if let Some(completed_at) = manifest.completed_at {
        println!("finished:   {}", completed_at.to_rfc3339());
    }
    println!("directory:  {}", experiment_dir.display());

    // Live per-conversation state comes from replaying the logs, never
    // from the relational store
    for entry in std::fs::read_dir(&experiment_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with("_events.jsonl") {
            continue;
        }
        match StateBuilder::replay_file(&path) {
            Ok(state) => {
                let status = state
                    .status
                    .map(|s| format!("{:?}", s).to_lowercase())
                    .unwrap_or_else(|| "unknown".to_string());
                let convergence = state
                    .final_convergence
                    .map(|c| format!("{:.3}", c))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {}  {:<22} turns {:>3}  convergence {}",
                    state
                        .conversation_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| name.to_string()),
                    status,
                    state.turns_completed,
                    convergence
                );
            }
            Err(err) => println!("  {}  unreadable: {}", name, err),
        }
    }

    Ok(())
}
