// File watcher for incremental updates

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::index::Language;
use crate::indexer::walker::relative_path;

/// Watches the project tree and emits one debounced signal per burst of
/// source changes
pub struct FileWatcher {
    watch_path: PathBuf,
    config: Config,
    languages: Vec<Language>,
    debounce: Duration,
}

impl FileWatcher {
    pub fn new(watch_path: PathBuf, config: Config) -> Self {
        let languages = config.enabled_languages();
        let debounce = Duration::from_millis(config.server.debounce_ms);
        Self {
            watch_path,
            config,
            languages,
            debounce,
        }
    }

    /// Watch until `changes` is closed, sending `()` after each quiet period
    /// that follows relevant events.
    pub async fn watch(self, changes: mpsc::Sender<()>) -> Result<()> {
        info!("Starting file watcher for: {}", self.watch_path.display());

        let (tx, mut rx) = mpsc::channel::<Event>(256);

        // notify calls back on its own thread, outside the runtime
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.blocking_send(event);
                }
                Err(e) => error!("File watch error: {}", e),
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(&self.watch_path, RecursiveMode::Recursive)?;

        while let Some(event) = rx.recv().await {
            if !self.is_relevant(&event) {
                continue;
            }
            debug!("Source change: {:?}", event.paths);

            // swallow the rest of the burst
            loop {
                match tokio::time::timeout(self.debounce, rx.recv()).await {
                    Ok(Some(_)) => continue,
                    Ok(None) => return Ok(()),
                    Err(_) => break,
                }
            }

            if changes.send(()).await.is_err() {
                break;
            }
        }

        Ok(())
    }

    fn is_relevant(&self, event: &Event) -> bool {
        matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) && event.paths.iter().any(|p| self.should_index_file(p))
    }

    /// Supported, non-excluded source file. Removed files count too.
    fn should_index_file(&self, path: &Path) -> bool {
        let Some(language) = Language::from_path(path) else {
            return false;
        };
        if !self.languages.contains(&language) {
            return false;
        }
        match relative_path(&self.watch_path, path) {
            Some(rel) => self.config.should_index_file(&rel),
            None => false,
        }
    }
}
