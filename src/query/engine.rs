// Query execution engine

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::index::db::IndexDatabase;
use crate::index::{FileCacheEntry, IndexMetadata, SimilarityPair, Symbol, SymbolKind};
use crate::indexer::cache::{check_staleness, Staleness};
use crate::indexer::parser::CACHE_SCHEMA_VERSION;
use crate::indexer::walker::discover_files;
use crate::pattern::{glob_to_like, glob_to_regex};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_SIMILAR_LIMIT: usize = 50;

/// Source text of one symbol
#[derive(Debug, Clone)]
pub struct SymbolContent {
    pub symbol: Symbol,
    pub content: String,
    /// Other symbols with the same name, in (file, line) order
    pub other_matches: Vec<Symbol>,
}

/// Indexed files grouped by directory, `.` for the project root
pub type FileListing = BTreeMap<String, Vec<FileCacheEntry>>;

/// Snapshot of index health for `status`
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub project_root: PathBuf,
    pub database_exists: bool,
    /// `None` when the store does not exist yet
    pub metadata: Option<IndexMetadata>,
    pub staleness: Staleness,
    /// (kind, total, documented) for classes, functions and methods
    pub doc_coverage: Vec<(SymbolKind, u64, u64)>,
    /// Run owned by the serving process, if any
    pub active_run: Option<i64>,
}

/// Read side of the index.
///
/// Every query tolerates a missing store and answers as if the index were
/// empty. The store is opened lazily once its file exists.
pub struct QueryEngine {
    project_root: PathBuf,
    config: Config,
    db: Mutex<Option<IndexDatabase>>,
}

impl QueryEngine {
    pub fn new(project_root: impl AsRef<Path>, config: Config) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            config,
            db: Mutex::new(None),
        }
    }

    /// Engine over an already open store
    pub fn with_db(project_root: impl AsRef<Path>, config: Config, db: IndexDatabase) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            config,
            db: Mutex::new(Some(db)),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn store(&self) -> Result<Option<IndexDatabase>> {
        let mut guard = self.db.lock();
        if guard.is_none() {
            *guard = IndexDatabase::open_existing(self.config.db_path(&self.project_root))?;
        }
        Ok(guard.clone())
    }

    /// Symbols whose name matches a glob.
    ///
    /// SQL LIKE narrows the candidates case-insensitively; the exact glob is
    /// preferred when it matches anything.
    pub fn search_symbols(
        &self,
        pattern: &str,
        kind: Option<SymbolKind>,
        limit: Option<usize>,
    ) -> Result<Vec<Symbol>> {
        let Some(db) = self.store()? else {
            return Ok(Vec::new());
        };
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let candidates = db.search_symbols(&glob_to_like(pattern), kind, limit)?;

        let exact: Vec<Symbol> = match glob_to_regex(pattern) {
            Ok(re) => candidates
                .iter()
                .filter(|s| re.is_match(&s.name))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        };

        Ok(if exact.is_empty() { candidates } else { exact })
    }

    /// All symbols of one file, ordered by line
    pub fn get_file_symbols(&self, file_path: &str) -> Result<Vec<Symbol>> {
        let Some(db) = self.store()? else {
            return Ok(Vec::new());
        };
        db.find_symbols_by_file(&normalize_rel(file_path))
    }

    /// Source lines of a symbol found by exact name or `Parent.name`
    pub fn get_symbol_content(&self, name: &str, kind: Option<SymbolKind>) -> Result<SymbolContent> {
        let not_found = || IndexError::NotFound(format!("symbol '{}'", name));
        let Some(db) = self.store()? else {
            return Err(not_found());
        };

        let mut matches = db.find_symbols_by_name(name, None, kind)?;
        if matches.is_empty() {
            if let Some((parent, member)) = name.rsplit_once('.') {
                matches = db.find_symbols_by_name(member, Some(parent), kind)?;
            }
        }
        if matches.is_empty() {
            return Err(not_found());
        }

        let symbol = matches.remove(0);
        let path = self.project_root.join(&symbol.file_path);
        let source = std::fs::read_to_string(&path)
            .map_err(|_| IndexError::NotFound(format!("source file {}", symbol.file_path)))?;

        let start = symbol.line_number.saturating_sub(1) as usize;
        let count = (symbol.end_line_number.max(symbol.line_number) - symbol.line_number + 1) as usize;
        let content = source
            .lines()
            .skip(start)
            .take(count)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(SymbolContent {
            symbol,
            content,
            other_matches: matches,
        })
    }

    /// Indexed files, optionally filtered by a path glob
    pub fn list_files(&self, glob: Option<&str>) -> Result<FileListing> {
        let Some(db) = self.store()? else {
            return Ok(FileListing::new());
        };
        let filter = match glob {
            Some(g) => Some(glob_to_regex(g).map_err(|e| IndexError::InvalidPattern {
                pattern: g.to_string(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        let mut listing = FileListing::new();
        for entry in db.list_files()? {
            if let Some(re) = &filter {
                if !re.is_match(&entry.file_path) {
                    continue;
                }
            }
            let dir = match entry.file_path.rsplit_once('/') {
                Some((dir, _)) => dir.to_string(),
                None => ".".to_string(),
            };
            listing.entry(dir).or_default().push(entry);
        }
        Ok(listing)
    }

    /// Potential duplicates flagged by the last completed run
    pub fn list_similar(&self, kind: Option<SymbolKind>, limit: Option<usize>) -> Result<Vec<SimilarityPair>> {
        let Some(db) = self.store()? else {
            return Ok(Vec::new());
        };
        db.similar_pairs(kind, limit.unwrap_or(DEFAULT_SIMILAR_LIMIT))
    }

    /// Index health. Never fails on a missing store.
    pub fn status(&self, active_run: Option<i64>) -> Result<StatusReport> {
        let db = self.store()?;
        let files = discover_files(&self.project_root, &self.config, &self.config.enabled_languages());
        let staleness = check_staleness(
            &self.config.db_path(&self.project_root),
            &self.config.sidecar_path(&self.project_root),
            CACHE_SCHEMA_VERSION,
            &files,
        );

        let (metadata, doc_coverage) = match &db {
            Some(db) => {
                let coverage = db
                    .doc_coverage()?
                    .into_iter()
                    .filter(|(kind, _, _)| *kind != SymbolKind::Other)
                    .collect();
                (Some(db.metadata()?), coverage)
            }
            None => (None, Vec::new()),
        };

        Ok(StatusReport {
            project_root: self.project_root.clone(),
            database_exists: db.is_some(),
            metadata,
            staleness,
            doc_coverage,
            active_run,
        })
    }
}

/// Accept `./a.py` and `a\b.py` for `a.py` and `a/b.py`
fn normalize_rel(file_path: &str) -> String {
    let path = file_path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}
