// Runs indexing in a killable child process and tracks the active run

pub mod limits;
pub mod watchdog;
pub mod worker;

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::IndexError;
use crate::index::db::IndexDatabase;
use crate::index::now_millis;
use crate::indexer::cache::{check_staleness, Staleness};
use crate::indexer::parser::CACHE_SCHEMA_VERSION;
use crate::indexer::walker::discover_files;
use limits::{classify_exit, WorkerExit};
use watchdog::Watchdog;

/// Why a worker was killed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    /// The watchdog already marked the run failed
    Hung,
    /// The session ended
    Canceled,
}

/// Answer to a reindex request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexAck {
    Started { run_id: i64 },
    AlreadyIndexing,
    Fresh { reason: String },
}

struct ActiveRun {
    run_id: i64,
    kill: Option<oneshot::Sender<KillReason>>,
}

/// Starts worker processes, one at a time, and records how they end
#[derive(Clone)]
pub struct Supervisor {
    project_root: PathBuf,
    config: Config,
    db: IndexDatabase,
    worker_exe: PathBuf,
    active: Arc<Mutex<Option<ActiveRun>>>,
}

impl Supervisor {
    pub fn new(project_root: impl AsRef<Path>, config: Config, db: IndexDatabase) -> anyhow::Result<Self> {
        Ok(Self {
            project_root: project_root.as_ref().to_path_buf(),
            config,
            db,
            worker_exe: worker::resolve_worker_exe()?,
            active: Arc::new(Mutex::new(None)),
        })
    }

    pub fn with_worker_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.worker_exe = exe.into();
        self
    }

    pub fn db(&self) -> &IndexDatabase {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Run id of the worker this process is supervising, if any
    pub fn active_run(&self) -> Option<i64> {
        self.active.lock().as_ref().map(|run| run.run_id)
    }

    /// Staleness of the index, computed off the async runtime
    pub async fn staleness(&self) -> Staleness {
        let root = self.project_root.clone();
        let config = self.config.clone();
        let db_path = self.db.db_path().to_path_buf();

        let check = tokio::task::spawn_blocking(move || {
            let files = discover_files(&root, &config, &config.enabled_languages());
            check_staleness(&db_path, &config.sidecar_path(&root), CACHE_SCHEMA_VERSION, &files)
        })
        .await;

        check.unwrap_or_else(|e| Staleness {
            stale: true,
            reason: format!("staleness check failed: {}", e),
        })
    }

    /// Start a worker unless one is running or, without `force`, the index is fresh
    pub async fn reindex(&self, force: bool) -> anyhow::Result<ReindexAck> {
        if self.active_run().is_some() {
            return Ok(ReindexAck::AlreadyIndexing);
        }

        if !force {
            let staleness = self.staleness().await;
            if !staleness.stale {
                return Ok(ReindexAck::Fresh {
                    reason: staleness.reason,
                });
            }
            info!("Index is stale: {}", staleness.reason);
        }

        let stale_after_ms = (self.config.watchdog.stale_after_secs * 1000) as i64;
        let Some(run_id) = self.db.begin_run(now_millis(), stale_after_ms)? else {
            return Ok(ReindexAck::AlreadyIndexing);
        };

        let child = match worker::spawn_worker(&self.worker_exe, &self.project_root, run_id) {
            Ok(child) => child,
            Err(e) => {
                self.db.mark_failed(run_id, &format!("{:#}", e))?;
                return Err(e);
            }
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.active.lock() = Some(ActiveRun {
            run_id,
            kill: Some(kill_tx),
        });

        info!("Started indexing worker for run {}", run_id);
        tokio::spawn(self.clone().supervise(run_id, child, kill_rx));

        Ok(ReindexAck::Started { run_id })
    }

    /// Kill the worker of `run_id` if this process owns it
    pub fn kill_run(&self, run_id: i64, reason: KillReason) -> bool {
        let mut active = self.active.lock();
        match active.as_mut() {
            Some(run) if run.run_id == run_id => match run.kill.take() {
                Some(tx) => tx.send(reason).is_ok(),
                None => false,
            },
            _ => false,
        }
    }

    /// Hard-kill any in-flight run and mark it canceled
    pub fn cancel(&self) -> bool {
        match self.active_run() {
            Some(run_id) => {
                info!("Canceling indexing run {}", run_id);
                self.kill_run(run_id, KillReason::Canceled)
            }
            None => false,
        }
    }

    /// Background watchdog that kills workers it judges hung
    pub fn spawn_watchdog(&self) -> tokio::task::JoinHandle<()> {
        let watchdog = Watchdog::new(self.db.clone(), &self.config.watchdog);
        let supervisor = self.clone();
        tokio::spawn(watchdog.run(move |run_id| {
            if !supervisor.kill_run(run_id, KillReason::Hung) {
                debug!("Hung run {} is not ours to kill", run_id);
            }
        }))
    }

    async fn supervise(self, run_id: i64, mut child: Child, kill_rx: oneshot::Receiver<KillReason>) {
        let outcome = tokio::select! {
            status = child.wait() => Ok(status),
            reason = kill_rx => {
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill worker for run {}: {}", run_id, e);
                }
                let _ = child.wait().await;
                Err(reason.unwrap_or(KillReason::Canceled))
            }
        };

        let recorded = match outcome {
            Ok(Ok(status)) => match classify_exit(status) {
                WorkerExit::Success => {
                    debug!("Worker for run {} exited cleanly", run_id);
                    Ok(false)
                }
                // the worker records its own failure, this only covers a crash before it could
                WorkerExit::Failed(code) => self
                    .db
                    .mark_failed(run_id, &format!("indexing worker exited with code {}", code)),
                WorkerExit::LimitExceeded(detail) => self
                    .db
                    .mark_failed(run_id, &IndexError::ResourceLimitExceeded(detail).to_string()),
                WorkerExit::Signaled(signal) => self
                    .db
                    .mark_failed(run_id, &format!("indexing worker terminated by {}", signal)),
            },
            Ok(Err(e)) => self
                .db
                .mark_failed(run_id, &format!("lost track of indexing worker: {}", e)),
            Err(KillReason::Hung) => Ok(false),
            Err(KillReason::Canceled) => self.db.mark_canceled(run_id),
        };

        match recorded {
            Ok(true) => info!("Recorded end of run {}", run_id),
            Ok(false) => {}
            Err(e) => error!("Could not record end of run {}: {}", run_id, e),
        }

        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|run| run.run_id == run_id) {
            *active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexStatus;
    use tempfile::tempdir;

    fn supervisor(root: &Path, exe: &str) -> Supervisor {
        let config = Config::default();
        let db = IndexDatabase::new(config.db_path(root)).unwrap();
        Supervisor::new(root, config, db).unwrap().with_worker_exe(exe)
    }

    #[tokio::test]
    async fn test_spawn_failure_marks_run_failed() {
        let dir = tempdir().unwrap();
        let sup = supervisor(dir.path(), "/nonexistent/repomap-worker");

        assert!(sup.reindex(true).await.is_err());
        let meta = sup.db().metadata().unwrap();
        assert_eq!(meta.status, IndexStatus::Failed);
        assert!(sup.active_run().is_none());
    }

    #[tokio::test]
    async fn test_reindex_is_noop_while_store_is_indexing() {
        let dir = tempdir().unwrap();
        let sup = supervisor(dir.path(), "/nonexistent/repomap-worker");
        sup.db().begin_run(now_millis(), 60_000).unwrap();

        assert_eq!(sup.reindex(true).await.unwrap(), ReindexAck::AlreadyIndexing);
    }

    #[cfg(unix)]
    fn slow_worker_script(dir: &Path) -> PathBuf {
        // `sleep index-worker ...` fails fast, so use a script that ignores its args
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("slow-worker.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    async fn wait_until_idle(sup: &Supervisor, max_wait: std::time::Duration) {
        let deadline = std::time::Instant::now() + max_wait;
        while sup.active_run().is_some() && std::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_worker_and_marks_canceled() {
        let dir = tempdir().unwrap();
        let script = slow_worker_script(dir.path());

        let sup = supervisor(dir.path(), script.to_str().unwrap());
        let ReindexAck::Started { run_id } = sup.reindex(true).await.unwrap() else {
            panic!("worker did not start");
        };
        assert_eq!(sup.active_run(), Some(run_id));
        assert_eq!(sup.reindex(true).await.unwrap(), ReindexAck::AlreadyIndexing);

        assert!(sup.cancel());
        wait_until_idle(&sup, std::time::Duration::from_secs(5)).await;
        assert!(sup.active_run().is_none());
        assert_eq!(sup.db().metadata().unwrap().status, IndexStatus::Canceled);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_watchdog_kills_silent_worker_as_hung() {
        let dir = tempdir().unwrap();
        let script = slow_worker_script(dir.path());

        let mut config = Config::default();
        config.watchdog.interval_secs = 1;
        config.watchdog.stale_after_secs = 1;
        let db = IndexDatabase::new(config.db_path(dir.path())).unwrap();
        let sup = Supervisor::new(dir.path(), config, db).unwrap().with_worker_exe(&script);

        let ReindexAck::Started { run_id } = sup.reindex(true).await.unwrap() else {
            panic!("worker did not start");
        };
        let watchdog = sup.spawn_watchdog();

        // the script never reports progress, so the second or third tick judges it hung
        wait_until_idle(&sup, std::time::Duration::from_secs(10)).await;
        watchdog.abort();

        assert!(sup.active_run().is_none(), "hung worker was not killed");
        let meta = sup.db().metadata().unwrap();
        assert_eq!(meta.run_id, run_id);
        assert_eq!(meta.status, IndexStatus::Failed);
        assert!(meta.error_message.unwrap().contains("stalled"));
    }
}
