//! Daemon lifecycle: detach from the terminal, publish a PID file, and shut
//! down cooperatively on SIGINT/SIGTERM or the `STOP` sentinel file.
//!
//! The sentinel exists for environments without signal delivery; it is
//! polled with the same watcher machinery observers use on the logs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use notify::{EventKind as FsEventKind, PollWatcher, RecursiveMode, Watcher};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use duologue_types::{ExperimentConfig, short_id};

use crate::config::RuntimeSettings;
use crate::error::{Error, Result};
use crate::scheduler::{ExperimentOutcome, ExperimentScheduler};

/// What the parent process learns after a successful daemon launch
#[derive(Debug, Clone)]
pub struct DaemonLaunch {
    pub experiment_id: Uuid,
    pub experiment_dir: PathBuf,
    pub pid: i32,
}

/// Tracing to stderr (foreground) or a log file (daemon), honoring
/// LOG_LEVEL and the DEBUG toggle
pub fn init_tracing(log_file: Option<&Path>) {
    let default_level = if std::env::var("DEBUG").is_ok_and(|v| v == "1" || v == "true") {
        "debug"
    } else {
        "info"
    };
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            let Ok(file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            else {
                return;
            };
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

/// Run an experiment in the foreground. Ctrl-C maps to the cancel token,
/// equivalent to a stop signal on the scheduler.
pub fn run_foreground(
    config: ExperimentConfig,
    settings: RuntimeSettings,
) -> Result<ExperimentOutcome> {
    let mut scheduler = ExperimentScheduler::new(config, settings)?;
    let cancel = CancellationToken::new();
    let _sentinel = StopSentinel::watch(scheduler.experiment_dir(), cancel.clone())?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            signal_cancel.cancel();
        });
        scheduler.run(cancel).await
    })
}

/// Fork an experiment into a detached daemon.
///
/// Returns `Some(launch)` in the parent; the child never returns (it runs
/// the scheduler and exits the process). Configuration errors surface in
/// the parent before any fork happens.
pub fn run_daemonized(
    config: ExperimentConfig,
    settings: RuntimeSettings,
) -> Result<Option<DaemonLaunch>> {
    // Fail fast while still attached to the terminal
    let mut scheduler = ExperimentScheduler::new(config, settings.clone())?;
    let experiment_id = scheduler.experiment_id();
    let experiment_dir = scheduler.experiment_dir().to_path_buf();

    std::fs::create_dir_all(settings.active_dir())?;

    match fork_detached(&experiment_dir)? {
        ForkOutcome::Parent { child_pid } => Ok(Some(DaemonLaunch {
            experiment_id,
            experiment_dir,
            pid: child_pid,
        })),
        ForkOutcome::Child => {
            init_tracing(Some(&experiment_dir.join("experiment.log")));
            set_process_name(&format!("duologue-{}", short_id(&experiment_id)));

            let pid_path = settings.active_dir().join(format!("{}.pid", experiment_id));
            if let Err(err) = write_pid_file(&pid_path) {
                tracing::error!("could not write pid file: {}", err);
            }

            let cancel = CancellationToken::new();
            let _sentinel = match StopSentinel::watch(&experiment_dir, cancel.clone()) {
                Ok(sentinel) => Some(sentinel),
                Err(err) => {
                    tracing::warn!("stop sentinel unavailable: {}", err);
                    None
                }
            };

            let run = tokio::runtime::Runtime::new().and_then(|runtime| {
                runtime.block_on(async {
                    let signal_cancel = cancel.clone();
                    tokio::spawn(async move {
                        wait_for_shutdown_signal().await;
                        signal_cancel.cancel();
                    });
                    scheduler
                        .run(cancel)
                        .await
                        .map_err(|err| std::io::Error::other(err.to_string()))
                })
            });

            let _ = std::fs::remove_file(&pid_path);

            match run {
                Ok(outcome) => {
                    tracing::info!(
                        experiment = %outcome.experiment_id,
                        completed = outcome.completed_conversations,
                        failed = outcome.failed_conversations,
                        "experiment finished"
                    );
                    // Failures are discovered through the manifest; the
                    // daemon exits non-zero only for fatal config errors,
                    // which never reach this point
                    std::process::exit(0);
                }
                Err(err) => {
                    tracing::error!("experiment run failed: {}", err);
                    std::process::exit(0);
                }
            }
        }
    }
}

enum ForkOutcome {
    Parent { child_pid: i32 },
    Child,
}

#[cfg(unix)]
fn fork_detached(experiment_dir: &Path) -> Result<ForkOutcome> {
    use std::os::unix::io::AsRawFd;

    // Fork once; the reported child pid is the daemon's pid and matches
    // the PID file it writes
    match unsafe { libc::fork() } {
        -1 => return Err(Error::Io(std::io::Error::last_os_error())),
        0 => {}
        child_pid => return Ok(ForkOutcome::Parent { child_pid }),
    }

    // Detach from the controlling terminal
    unsafe {
        libc::setsid();
    }

    // stdin from /dev/null, stdout/stderr into startup.log
    let startup = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(experiment_dir.join("startup.log"))?;
    let devnull = std::fs::OpenOptions::new().read(true).open("/dev/null")?;
    unsafe {
        libc::dup2(devnull.as_raw_fd(), 0);
        libc::dup2(startup.as_raw_fd(), 1);
        libc::dup2(startup.as_raw_fd(), 2);
    }

    Ok(ForkOutcome::Child)
}

#[cfg(not(unix))]
fn fork_detached(_experiment_dir: &Path) -> Result<ForkOutcome> {
    Err(Error::Config(
        "daemon mode requires a unix platform; use --foreground".to_string(),
    ))
}

/// `"<pid>\n<started_at>\n"`
pub fn write_pid_file(path: &Path) -> Result<()> {
    let content = format!(
        "{}\n{}\n",
        std::process::id(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    std::fs::write(path, content)?;
    Ok(())
}

/// Parse the pid back out of a PID file
pub fn read_pid_file(path: &Path) -> Result<i32> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .next()
        .and_then(|line| line.trim().parse().ok())
        .ok_or_else(|| Error::Config(format!("malformed pid file {}", path.display())))
}

#[cfg(target_os = "linux")]
fn set_process_name(name: &str) {
    if let Ok(name) = std::ffi::CString::new(name) {
        unsafe {
            libc::prctl(libc::PR_SET_NAME, name.as_ptr(), 0, 0, 0);
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn set_process_name(_name: &str) {}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Watches an experiment directory for the `STOP` sentinel file and fires
/// the cancel token when it appears
pub struct StopSentinel {
    _watcher: PollWatcher,
    _handle: std::thread::JoinHandle<()>,
}

impl StopSentinel {
    pub fn watch(experiment_dir: &Path, cancel: CancellationToken) -> Result<Self> {
        // A sentinel left from a previous run counts immediately
        if experiment_dir.join("STOP").exists() {
            cancel.cancel();
        }

        let (tx, rx) = std::sync::mpsc::channel();
        let config = notify::Config::default().with_poll_interval(Duration::from_millis(500));
        let mut watcher = PollWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            config,
        )
        .map_err(|err| Error::Config(format!("stop watcher: {}", err)))?;
        watcher
            .watch(experiment_dir, RecursiveMode::NonRecursive)
            .map_err(|err| Error::Config(format!("stop watcher: {}", err)))?;

        let handle = std::thread::Builder::new()
            .name("stop-sentinel".to_string())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if matches!(event.kind, FsEventKind::Create(_) | FsEventKind::Modify(_))
                        && event
                            .paths
                            .iter()
                            .any(|path| path.file_name().is_some_and(|name| name == "STOP"))
                    {
                        cancel.cancel();
                        break;
                    }
                }
            })?;

        Ok(Self {
            _watcher: watcher,
            _handle: handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.pid");
        write_pid_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        assert_eq!(read_pid_file(&path).unwrap(), std::process::id() as i32);
    }

    #[test]
    fn test_preexisting_stop_sentinel_cancels_immediately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("STOP"), "").unwrap();

        let cancel = CancellationToken::new();
        let _sentinel = StopSentinel::watch(dir.path(), cancel.clone()).unwrap();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_stop_sentinel_fires_on_creation() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let _sentinel = StopSentinel::watch(dir.path(), cancel.clone()).unwrap();
        assert!(!cancel.is_cancelled());

        std::fs::write(dir.path().join("STOP"), "").unwrap();
        // Poll interval is 500 ms; allow a few cycles
        for _ in 0..20 {
            if cancel.is_cancelled() {
                break;
            }
            std::thread::sleep(Duration::from_millis(200));
        }
        assert!(cancel.is_cancelled());
    }
}
