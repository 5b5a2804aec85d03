use anyhow::Result;

use duologue_runtime::{find_experiment_dir, read_manifest};

use crate::context::CliContext;

pub fn handle(context: &CliContext, query: &str) -> Result<()> {
    let experiment_dir = find_experiment_dir(&context.settings, query)?;
    let manifest = read_manifest(&experiment_dir)?;

    // The sentinel works everywhere; a live daemon also gets SIGTERM when
    // its PID file is present
    std::fs::write(experiment_dir.join("STOP"), "")?;
    println!("stop requested for {}", manifest.experiment_id);

    let pid_path = context
        .settings
        .active_dir()
        .join(format!("{}.pid", manifest.experiment_id));
    if pid_path.exists() {
        match duologue_runtime::daemon::read_pid_file(&pid_path) {
            Ok(pid) => {
                signal_terminate(pid);
                println!("signalled daemon pid {}", pid);
            }
            Err(err) => println!("pid file unreadable ({}); sentinel will stop it", err),
        }
    }

    Ok(())
}

#[cfg(unix)]
fn signal_terminate(pid: i32) {
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn signal_terminate(_pid: i32) {}
