use anyhow::Result;

use duologue_runtime::find_experiment_dir;
use duologue_store::{Database, STORE_FILENAME, import_experiment};

use crate::context::CliContext;

pub fn handle(context: &CliContext, query: &str) -> Result<()> {
    let experiment_dir = find_experiment_dir(&context.settings, query)?;
    let db = Database::open(&experiment_dir.join(STORE_FILENAME))?;

    let summary = import_experiment(&db, &experiment_dir)?;
    println!(
        "imported {} conversations, {} new events, {} files unchanged",
        summary.conversations, summary.events_inserted, summary.files_skipped
    );
    for error in &summary.errors {
        println!("  skipped: {}", error);
    }
    println!("store: {}", experiment_dir.join(STORE_FILENAME).display());

    Ok(())
}
