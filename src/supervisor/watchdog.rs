// Liveness monitor for indexing runs

use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::WatchdogConfig;
use crate::error::{IndexError, Result};
use crate::index::db::IndexDatabase;
use crate::index::{now_millis, IndexStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing is indexing
    Idle,
    Healthy { run_id: i64 },
    /// The run was marked failed and should be terminated
    Hung { run_id: i64, stalled_secs: i64 },
}

/// Marks runs whose progress heartbeat went silent as failed
#[derive(Clone)]
pub struct Watchdog {
    db: IndexDatabase,
    interval: Duration,
    stale_after_ms: i64,
}

impl Watchdog {
    pub fn new(db: IndexDatabase, config: &WatchdogConfig) -> Self {
        Self {
            db,
            interval: Duration::from_secs(config.interval_secs),
            stale_after_ms: (config.stale_after_secs * 1000) as i64,
        }
    }

    /// One inspection at time `now_ms`.
    ///
    /// A hung run is marked failed before anyone kills it, so a late commit
    /// from it is rejected by the store even if the kill comes too late.
    pub fn check_once(&self, now_ms: i64) -> Result<Verdict> {
        let meta = self.db.metadata()?;
        if meta.status != IndexStatus::Indexing {
            return Ok(Verdict::Idle);
        }

        let last_seen = meta.progress_at.or(meta.started_at).unwrap_or(0);
        let stalled_ms = now_ms - last_seen;
        if stalled_ms <= self.stale_after_ms {
            return Ok(Verdict::Healthy { run_id: meta.run_id });
        }

        let stalled_secs = stalled_ms / 1000;
        let hung = IndexError::HungProcess {
            run_id: meta.run_id,
            stalled_secs,
        };
        if self.db.mark_failed(meta.run_id, &hung.to_string())? {
            warn!("{}", hung);
            Ok(Verdict::Hung {
                run_id: meta.run_id,
                stalled_secs,
            })
        } else {
            // finished between the read and the mark
            Ok(Verdict::Idle)
        }
    }

    /// Check on a fixed interval forever, calling `kill` for every hung run
    pub async fn run<F>(self, kill: F)
    where
        F: Fn(i64) + Send + 'static,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.check_once(now_millis()) {
                Ok(Verdict::Hung { run_id, .. }) => kill(run_id),
                Ok(verdict) => debug!("Watchdog: {:?}", verdict),
                Err(e) => error!("Watchdog check failed: {}", e),
            }
        }
    }
}
