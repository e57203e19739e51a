// Indexing pipeline: walk, extract, detect, persist

pub mod cache;
pub mod parser;
pub mod similarity;
pub mod walker;
pub mod watcher;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::index::db::{IndexDatabase, RunOutput};
use crate::index::{now_millis, FileCacheEntry, Progress, Symbol};
use cache::{file_mtime, CacheDecision, CacheManager, CacheSidecar, FileState, Staleness};
use parser::{ParserRegistry, CACHE_SCHEMA_VERSION};
use similarity::SimilarityDetector;
use walker::{discover_files, SourceFile};

/// How an indexing run ended, when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// The run lost ownership of the store (watchdog, cancel or a newer run)
    /// and its results were discarded.
    Superseded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files: usize,
    pub reparsed: usize,
    pub reused: usize,
    pub parse_failures: usize,
    pub symbols: u64,
    pub similar_pairs: usize,
}

/// The main indexer that coordinates parsing and storage
pub struct Indexer {
    project_root: PathBuf,
    config: Config,
    registry: ParserRegistry,
    db: IndexDatabase,
}

impl Indexer {
    pub fn new(project_root: impl AsRef<Path>, config: Config) -> Result<Self> {
        let project_root = project_root.as_ref().to_path_buf();
        let registry = ParserRegistry::new(&config.enabled_languages());
        let db = IndexDatabase::new(config.db_path(&project_root))?;

        Ok(Self {
            project_root,
            config,
            registry,
            db,
        })
    }

    pub fn db(&self) -> &IndexDatabase {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn stale_after_ms(&self) -> i64 {
        (self.config.watchdog.stale_after_secs * 1000) as i64
    }

    /// Claim the store for a new run, `None` if one is already indexing
    pub fn begin_run(&self) -> Result<Option<i64>> {
        self.db.begin_run(now_millis(), self.stale_after_ms())
    }

    /// Files that would be indexed right now
    pub fn discover(&self) -> Vec<SourceFile> {
        discover_files(&self.project_root, &self.config, &self.registry.languages())
    }

    pub fn check_staleness(&self) -> Staleness {
        cache::check_staleness(
            self.db.db_path(),
            &self.config.sidecar_path(&self.project_root),
            CACHE_SCHEMA_VERSION,
            &self.discover(),
        )
    }

    /// Drop the sidecar so the next run starts with a cold cache
    pub fn invalidate_cache(&self) -> Result<()> {
        let sidecar = self.config.sidecar_path(&self.project_root);
        match std::fs::remove_file(&sidecar) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Execute run `run_id` to completion.
    ///
    /// Unrecoverable errors mark the run failed before being returned. A
    /// commit rejected by the safety check is reported as `Superseded`.
    pub fn run(&self, run_id: i64, on_progress: &mut dyn FnMut(&Progress)) -> Result<RunOutcome> {
        match self.run_inner(run_id, on_progress) {
            Ok(summary) => Ok(summary),
            Err(IndexError::StaleWriteRace { .. }) => {
                info!("Run {} was superseded before commit, discarding results", run_id);
                Ok(RunOutcome::Superseded)
            }
            Err(e) => {
                warn!("Run {} failed: {}", run_id, e);
                if let Err(mark_err) = self.db.mark_failed(run_id, &e.to_string()) {
                    warn!("Could not record failure of run {}: {}", run_id, mark_err);
                }
                Err(e)
            }
        }
    }

    fn run_inner(&self, run_id: i64, on_progress: &mut dyn FnMut(&Progress)) -> Result<RunOutcome> {
        let started = Instant::now();
        // files are read after this point, so later edits must show as stale
        let scan_started_ms = now_millis();
        let files = self.discover();
        info!("Indexing {} files under {}", files.len(), self.project_root.display());

        let mut heartbeat = Heartbeat::new(
            &self.db,
            run_id,
            Duration::from_millis(self.config.indexing.progress_interval_ms),
        );
        let mut progress = Progress {
            files_total: files.len() as u64,
            ..Progress::default()
        };
        if !heartbeat.beat(&progress, true)? {
            return Ok(RunOutcome::Superseded);
        }

        let sidecar_path = self.config.sidecar_path(&self.project_root);
        let mut cache = CacheManager::load(&self.db, &sidecar_path, CACHE_SCHEMA_VERSION)?;

        let mut summary = RunSummary {
            files: files.len(),
            ..RunSummary::default()
        };
        let mut output = RunOutput::default();

        for file in &files {
            match self.process_file(file, &mut cache) {
                Ok((entry, symbols, reused)) => {
                    if reused {
                        summary.reused += 1;
                    } else {
                        summary.reparsed += 1;
                    }
                    progress.symbols_found += symbols.len() as u64;
                    output.symbols.extend(symbols);
                    output.files.push(entry);
                }
                Err(e) => {
                    warn!("{}", e);
                    summary.parse_failures += 1;
                }
            }

            progress.files_scanned += 1;
            on_progress(&progress);
            if !heartbeat.beat(&progress, false)? {
                return Ok(RunOutcome::Superseded);
            }
        }

        let detector = SimilarityDetector::new(&self.config.similarity);
        let similar = detector.detect_with(&output.symbols, &mut || heartbeat.beat(&progress, false))?;
        let Some(similar) = similar else {
            return Ok(RunOutcome::Superseded);
        };
        output.similar = similar;
        debug!("Found {} similar pairs", output.similar.len());

        summary.symbols = self.db.commit_run(run_id, &output, now_millis())?;
        summary.similar_pairs = output.similar.len();

        // after the commit, so a crash in between only costs a cold cache
        CacheSidecar {
            version: CACHE_SCHEMA_VERSION,
            file_count: files.len(),
            last_indexed: scan_started_ms,
        }
        .write_atomic(&sidecar_path)?;

        info!(
            "Indexed {} symbols from {} files in {:.2}s ({} reparsed, {} cached, {} failed)",
            summary.symbols,
            summary.files,
            started.elapsed().as_secs_f64(),
            summary.reparsed,
            summary.reused,
            summary.parse_failures
        );
        Ok(RunOutcome::Completed(summary))
    }

    /// Reuse or extract one file. Errors are per-file and never abort the run.
    fn process_file(
        &self,
        file: &SourceFile,
        cache: &mut CacheManager,
    ) -> Result<(FileCacheEntry, Vec<Symbol>, bool)> {
        let bytes = std::fs::read(&file.path)?;
        let state = FileState::from_bytes(&bytes, file_mtime(&file.path)?);

        if cache.decide(&file.rel_path, &state) == CacheDecision::Reuse {
            if let Some((entry, symbols)) = cache.take(&file.rel_path) {
                return Ok((entry, symbols, true));
            }
        }

        let parser = self
            .registry
            .get_parser_for_file(&file.rel_path)
            .ok_or_else(|| IndexError::UnsupportedLanguage(file.rel_path.clone()))?;
        let content = std::str::from_utf8(&bytes)
            .map_err(|e| IndexError::parse(&file.rel_path, format!("not valid UTF-8: {}", e)))?;
        let symbols = dedupe_symbols(parser.parse(content, &file.rel_path)?);

        let entry = FileCacheEntry {
            file_path: file.rel_path.clone(),
            language: file.language,
            content_hash: state.content_hash,
            mtime: state.mtime,
            cache_schema_version: cache.version(),
            symbol_count: symbols.len() as u32,
        };
        Ok((entry, symbols, false))
    }
}

/// Drop repeated store keys, keeping the first occurrence
fn dedupe_symbols(symbols: Vec<Symbol>) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    let before = symbols.len();
    let kept: Vec<Symbol> = symbols
        .into_iter()
        .filter(|s| seen.insert((s.name.clone(), s.kind, s.line_number, s.parent.clone())))
        .collect();
    if kept.len() < before {
        debug!("Dropped {} duplicate symbols", before - kept.len());
    }
    kept
}

/// Rate-limited progress persistence
struct Heartbeat<'a> {
    db: &'a IndexDatabase,
    run_id: i64,
    interval: Duration,
    last: Option<Instant>,
}

impl<'a> Heartbeat<'a> {
    fn new(db: &'a IndexDatabase, run_id: i64, interval: Duration) -> Self {
        Self {
            db,
            run_id,
            interval,
            last: None,
        }
    }

    /// Persist progress if the interval elapsed. Returns false once the run is no longer active.
    fn beat(&mut self, progress: &Progress, force: bool) -> Result<bool> {
        let due = force || self.last.map_or(true, |last| last.elapsed() >= self.interval);
        if !due {
            return Ok(true);
        }
        self.last = Some(Instant::now());
        let active = self.db.record_progress(self.run_id, progress, now_millis())?;
        if !active {
            info!("Run {} is no longer active, stopping", self.run_id);
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexStatus, Parser, SymbolKind};
    use crate::indexer::parser::PythonParser;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn run(indexer: &Indexer) -> RunOutcome {
        let run_id = indexer.begin_run().unwrap().unwrap();
        indexer.run(run_id, &mut |_| {}).unwrap()
    }

    fn completed(outcome: RunOutcome) -> RunSummary {
        match outcome {
            RunOutcome::Completed(summary) => summary,
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_full_run_and_cache_reuse() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "a.py", "class Foo:\n    \"\"\"Handles user auth\"\"\"\n");
        write(root, "b.py", "class FooHandler:\n    \"\"\"Handles user auth flow\"\"\"\n");

        let indexer = Indexer::new(root, Config::default()).unwrap();
        let first = completed(run(&indexer));
        assert_eq!(first.files, 2);
        assert_eq!(first.reparsed, 2);
        assert_eq!(first.symbols, 2);
        assert_eq!(first.similar_pairs, 1);

        let second = completed(run(&indexer));
        assert_eq!(second.reused, 2);
        assert_eq!(second.reparsed, 0);
        assert_eq!(second.symbols, 2);

        let meta = indexer.db().metadata().unwrap();
        assert_eq!(meta.status, IndexStatus::Completed);
        assert!(!indexer.check_staleness().stale);
    }

    #[test]
    fn test_parse_failure_is_per_file() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "good.py", "def ok():\n    pass\n");
        write(root, "bad.py", "def broken(:\n");

        let indexer = Indexer::new(root, Config::default()).unwrap();
        let summary = completed(run(&indexer));
        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.symbols, 1);

        // failed files get no cache entry and are retried next run
        let entries = indexer.db().file_entries().unwrap();
        assert!(entries.contains_key("good.py"));
        assert!(!entries.contains_key("bad.py"));
        assert_eq!(completed(run(&indexer)).parse_failures, 1);
    }

    #[test]
    fn test_superseded_run_discards_results() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "a.py", "def one():\n    pass\n");

        let indexer = Indexer::new(root, Config::default()).unwrap();
        let run_id = indexer.begin_run().unwrap().unwrap();
        indexer.db().mark_failed(run_id, "stalled").unwrap();

        let outcome = indexer.run(run_id, &mut |_| {}).unwrap();
        assert_eq!(outcome, RunOutcome::Superseded);
        assert_eq!(indexer.db().metadata().unwrap().status, IndexStatus::Failed);
        assert_eq!(indexer.db().symbol_row_count().unwrap(), 0);
    }

    #[test]
    fn test_detection_stops_once_heartbeat_is_rejected() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for i in 0..5 {
            write(root, &format!("m{}.py", i), "def compute_total():\n    pass\n");
        }

        let indexer = Indexer::new(root, Config::default()).unwrap();
        let run_id = indexer.begin_run().unwrap().unwrap();
        let symbols: Vec<Symbol> = indexer
            .discover()
            .iter()
            .flat_map(|f| {
                let content = fs::read_to_string(&f.path).unwrap();
                PythonParser::new().parse(&content, &f.rel_path).unwrap()
            })
            .collect();

        let detector = SimilarityDetector::new(&indexer.config().similarity);
        let progress = Progress::default();
        let mut heartbeat = Heartbeat::new(indexer.db(), run_id, Duration::ZERO);
        let pairs = detector
            .detect_with(&symbols, &mut || heartbeat.beat(&progress, false))
            .unwrap();
        assert_eq!(pairs.map(|p| p.len()), Some(10));

        // the watchdog took the run over
        indexer.db().mark_failed(run_id, "stalled").unwrap();
        let pairs = detector
            .detect_with(&symbols, &mut || heartbeat.beat(&progress, false))
            .unwrap();
        assert!(pairs.is_none());
    }

    #[test]
    fn test_same_line_methods_of_two_impls_are_both_kept() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "good.py", "def ok():\n    pass\n");
        write(
            root,
            "shapes.rs",
            "impl A { pub fn new() -> Self { A } } impl B { pub fn new() -> Self { B } }\n",
        );

        let indexer = Indexer::new(root, Config::default()).unwrap();
        let summary = completed(run(&indexer));
        assert_eq!(summary.parse_failures, 0);
        assert_eq!(summary.symbols, 3);

        let parents: Vec<String> = indexer
            .db()
            .find_symbols_by_file("shapes.rs")
            .unwrap()
            .into_iter()
            .map(|s| s.parent)
            .collect();
        assert_eq!(parents.len(), 2);
        assert!(parents.contains(&"A".to_string()) && parents.contains(&"B".to_string()));
        assert_eq!(indexer.db().find_symbols_by_file("good.py").unwrap().len(), 1);
    }

    #[test]
    fn test_dedupe_keeps_first_of_repeated_key() {
        let builder = |line: u32, sig: &str| Symbol {
            name: "f".to_string(),
            kind: SymbolKind::Function,
            signature: sig.to_string(),
            docstring: String::new(),
            file_path: "a.go".to_string(),
            line_number: line,
            end_line_number: line,
            parent: String::new(),
            language: crate::index::Language::Go,
        };
        let kept = dedupe_symbols(vec![builder(1, "first"), builder(1, "second"), builder(2, "third")]);
        let signatures: Vec<_> = kept.iter().map(|s| s.signature.as_str()).collect();
        assert_eq!(signatures, vec!["first", "third"]);
    }

    #[test]
    fn test_second_begin_is_noop_while_indexing() {
        let dir = tempdir().unwrap();
        let indexer = Indexer::new(dir.path(), Config::default()).unwrap();
        assert!(indexer.begin_run().unwrap().is_some());
        assert!(indexer.begin_run().unwrap().is_none());
    }
}
