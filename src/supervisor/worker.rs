// The isolated indexing worker process

use anyhow::{Context, Result};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::IndexError;
use crate::index::db::IndexDatabase;
use crate::indexer::{Indexer, RunOutcome};

/// Environment override for the worker binary
pub const WORKER_EXE_ENV: &str = "REPOMAP_WORKER_EXE";

/// Hidden subcommand the worker is started with
pub const WORKER_SUBCOMMAND: &str = "index-worker";

/// The binary to re-launch as a worker: the override, or this executable
pub fn resolve_worker_exe() -> Result<PathBuf> {
    if let Ok(raw) = std::env::var(WORKER_EXE_ENV) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    std::env::current_exe().context("cannot locate the repomap executable")
}

/// Launch `exe index-worker` for one run. The child dies with its handle.
pub fn spawn_worker(exe: &Path, project_root: &Path, run_id: i64) -> Result<Child> {
    Command::new(exe)
        .arg(WORKER_SUBCOMMAND)
        .arg("--project")
        .arg(project_root)
        .arg("--run-id")
        .arg(run_id.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn indexing worker {}", exe.display()))
}

/// Worker entry point: index `project_root` as run `run_id`.
///
/// The run was already claimed by the supervisor. Failures are recorded in
/// the store by the indexer before the error is returned.
pub fn run_worker(project_root: &Path, run_id: i64) -> Result<()> {
    let config = Config::from_project_dir(project_root);
    let indexer = Indexer::new(project_root, config).context("opening index store")?;
    enforce_limits(
        super::limits::apply_self_limits(&indexer.config().limits),
        indexer.db(),
        run_id,
    )?;

    match indexer.run(run_id, &mut |_| {})? {
        RunOutcome::Completed(summary) => {
            info!(
                "Worker finished run {}: {} symbols from {} files",
                run_id, summary.symbols, summary.files
            );
        }
        RunOutcome::Superseded => {
            info!("Worker run {} superseded", run_id);
        }
    }
    Ok(())
}

/// An uncapped worker never indexes: a failed limit setup fails the run.
fn enforce_limits<E: Display>(applied: std::result::Result<(), E>, db: &IndexDatabase, run_id: i64) -> Result<()> {
    let Err(e) = applied else {
        return Ok(());
    };
    let err = IndexError::ResourceLimitExceeded(format!("could not apply worker limits: {}", e));
    warn!("Run {}: {}", run_id, err);
    if let Err(mark_err) = db.mark_failed(run_id, &err.to_string()) {
        warn!("Could not record failure of run {}: {}", run_id, mark_err);
    }
    Err(err.into())
}
