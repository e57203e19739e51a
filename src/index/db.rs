use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::schema::{init_schema, SchemaInit};
use super::{
    FileCacheEntry, IndexMetadata, IndexStatus, Language, Progress, SimilarityPair, Symbol,
    SymbolKind,
};
use crate::error::{IndexError, Result};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Puts every pooled connection in write-ahead mode so readers see the last
/// committed snapshot while a writer transaction is open.
#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        Ok(())
    }
}

/// Everything one indexing run commits
#[derive(Debug, Default)]
pub struct RunOutput {
    pub symbols: Vec<Symbol>,
    pub files: Vec<FileCacheEntry>,
    pub similar: Vec<SimilarityPair>,
}

/// Database connection manager
#[derive(Clone)]
pub struct IndexDatabase {
    pool: ConnectionPool,
    db_path: PathBuf,
    schema: SchemaInit,
}

impl IndexDatabase {
    /// Create or open a database, rebuilding it on a schema version mismatch
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(Duration::from_secs(10))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)?;

        let schema = {
            let conn = pool.get()?;
            init_schema(&conn)?
        };

        if let SchemaInit::Rebuilt { from } = schema {
            warn!(
                "{}",
                IndexError::SchemaMismatch {
                    found: from,
                    expected: super::schema::DB_SCHEMA_VERSION,
                }
            );
        }

        Ok(Self {
            pool,
            db_path,
            schema,
        })
    }

    /// Open a database only if its file already exists
    pub fn open_existing(db_path: impl AsRef<Path>) -> Result<Option<Self>> {
        if !db_path.as_ref().exists() {
            return Ok(None);
        }
        Self::new(db_path).map(Some)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn schema_init(&self) -> SchemaInit {
        self.schema
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    // ---- metadata and run lifecycle ----

    pub fn metadata(&self) -> Result<IndexMetadata> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM index_meta")?;
        let meta: HashMap<String, String> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        let int = |key: &str| meta.get(key).and_then(|v| v.parse::<i64>().ok());

        Ok(IndexMetadata {
            status: meta
                .get("status")
                .map(|s| IndexStatus::from_str(s))
                .unwrap_or(IndexStatus::Idle),
            db_schema_version: int("db_schema_version").unwrap_or(0),
            last_indexed_timestamp: int("last_indexed"),
            symbol_count: int("symbol_count").unwrap_or(0).max(0) as u64,
            error_message: meta.get("error_message").filter(|m| !m.is_empty()).cloned(),
            run_id: int("run_id").unwrap_or(0),
            started_at: int("started_at"),
            progress_at: int("progress_at"),
            progress: Progress {
                files_scanned: int("files_scanned").unwrap_or(0).max(0) as u64,
                files_total: int("files_total").unwrap_or(0).max(0) as u64,
                symbols_found: int("symbols_found").unwrap_or(0).max(0) as u64,
            },
        })
    }

    /// Claim the store for a new indexing run.
    ///
    /// Returns `None` when another run is already indexing and its last
    /// heartbeat is younger than `stale_after_ms`.
    pub fn begin_run(&self, now_ms: i64, stale_after_ms: i64) -> Result<Option<i64>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let status = get_meta(&tx, "status")?
            .map(|s| IndexStatus::from_str(&s))
            .unwrap_or(IndexStatus::Idle);
        if status == IndexStatus::Indexing {
            let heartbeat = get_meta_i64(&tx, "progress_at")?.unwrap_or(0);
            if now_ms - heartbeat < stale_after_ms {
                debug!("Indexing already in progress, not starting another run");
                return Ok(None);
            }
            warn!("Previous run left a stale 'indexing' status, superseding it");
        }

        let run_id = get_meta_i64(&tx, "run_id")?.unwrap_or(0) + 1;
        set_meta(&tx, "status", IndexStatus::Indexing.as_str())?;
        set_meta(&tx, "run_id", &run_id.to_string())?;
        set_meta(&tx, "started_at", &now_ms.to_string())?;
        set_meta(&tx, "progress_at", &now_ms.to_string())?;
        set_meta(&tx, "files_scanned", "0")?;
        set_meta(&tx, "files_total", "0")?;
        set_meta(&tx, "symbols_found", "0")?;
        set_meta(&tx, "error_message", "")?;
        tx.commit()?;

        info!("Started indexing run {}", run_id);
        Ok(Some(run_id))
    }

    /// Persist a progress heartbeat. Returns false if the run is no longer active.
    pub fn record_progress(&self, run_id: i64, progress: &Progress, now_ms: i64) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !is_active_run(&tx, run_id)? {
            return Ok(false);
        }
        set_meta(&tx, "progress_at", &now_ms.to_string())?;
        set_meta(&tx, "files_scanned", &progress.files_scanned.to_string())?;
        set_meta(&tx, "files_total", &progress.files_total.to_string())?;
        set_meta(&tx, "symbols_found", &progress.symbols_found.to_string())?;
        tx.commit()?;
        Ok(true)
    }

    /// Mark `run_id` failed, if it is still the active run
    pub fn mark_failed(&self, run_id: i64, message: &str) -> Result<bool> {
        self.finish_run(run_id, IndexStatus::Failed, message)
    }

    /// Mark `run_id` canceled, if it is still the active run
    pub fn mark_canceled(&self, run_id: i64) -> Result<bool> {
        self.finish_run(run_id, IndexStatus::Canceled, "")
    }

    fn finish_run(&self, run_id: i64, status: IndexStatus, message: &str) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !is_active_run(&tx, run_id)? {
            debug!("Run {} already finished, not marking it {}", run_id, status);
            return Ok(false);
        }
        set_meta(&tx, "status", status.as_str())?;
        set_meta(&tx, "error_message", message)?;
        tx.commit()?;
        info!("Run {} marked {}", run_id, status);
        Ok(true)
    }

    /// Replace the whole index with one run's output in a single transaction.
    ///
    /// The run must still be the active `indexing` run when the transaction
    /// takes the write lock; otherwise nothing is written and
    /// `IndexError::StaleWriteRace` is returned.
    pub fn commit_run(&self, run_id: i64, output: &RunOutput, now_ms: i64) -> Result<u64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !is_active_run(&tx, run_id)? {
            return Err(IndexError::StaleWriteRace { run_id });
        }

        tx.execute("DELETE FROM symbols", [])?;
        tx.execute("DELETE FROM files", [])?;
        tx.execute("DELETE FROM similar_pairs", [])?;

        {
            let mut insert_symbol = tx.prepare(
                "INSERT INTO symbols (
                    name, kind, signature, docstring, file_path,
                    line_number, end_line_number, parent, language
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for symbol in &output.symbols {
                insert_symbol.execute(params![
                    symbol.name,
                    symbol.kind.as_str(),
                    symbol.signature,
                    symbol.docstring,
                    symbol.file_path,
                    symbol.line_number,
                    symbol.end_line_number,
                    symbol.parent,
                    symbol.language.as_str(),
                ])?;
            }

            let mut insert_file = tx.prepare(
                "INSERT INTO files (
                    path, language, content_hash, mtime, cache_schema_version, symbol_count
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in &output.files {
                insert_file.execute(params![
                    entry.file_path,
                    entry.language.as_str(),
                    entry.content_hash,
                    entry.mtime,
                    entry.cache_schema_version,
                    entry.symbol_count,
                ])?;
            }

            let mut insert_pair = tx.prepare(
                "INSERT INTO similar_pairs (
                    entity_kind, name_a, location_a, name_b, location_b,
                    reason, language_a, language_b, score
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for pair in &output.similar {
                insert_pair.execute(params![
                    pair.entity_kind.as_str(),
                    pair.name_a,
                    pair.location_a,
                    pair.name_b,
                    pair.location_b,
                    pair.reason,
                    pair.language_a.as_str(),
                    pair.language_b.as_str(),
                    pair.score,
                ])?;
            }
        }

        let symbol_count = output.symbols.len() as u64;
        set_meta(&tx, "status", IndexStatus::Completed.as_str())?;
        set_meta(&tx, "symbol_count", &symbol_count.to_string())?;
        set_meta(&tx, "last_indexed", &now_ms.to_string())?;
        set_meta(&tx, "progress_at", &now_ms.to_string())?;
        set_meta(&tx, "symbols_found", &symbol_count.to_string())?;
        set_meta(&tx, "error_message", "")?;
        tx.commit()?;

        info!(
            "Run {} committed: {} symbols, {} files, {} similar pairs",
            run_id,
            symbol_count,
            output.files.len(),
            output.similar.len()
        );
        Ok(symbol_count)
    }

    // ---- cache state ----

    /// All persisted file cache entries keyed by path
    pub fn file_entries(&self) -> Result<HashMap<String, FileCacheEntry>> {
        Ok(self
            .list_files()?
            .into_iter()
            .map(|entry| (entry.file_path.clone(), entry))
            .collect())
    }

    /// All persisted symbols grouped by file, each group ordered by line
    pub fn symbols_by_file(&self) -> Result<HashMap<String, Vec<Symbol>>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM symbols ORDER BY file_path, line_number, id",
            SYMBOL_COLUMNS
        ))?;
        let mut grouped: HashMap<String, Vec<Symbol>> = HashMap::new();
        for symbol in stmt.query_map([], row_to_symbol)? {
            let symbol = symbol?;
            grouped.entry(symbol.file_path.clone()).or_default().push(symbol);
        }
        Ok(grouped)
    }

    // ---- queries ----

    /// Symbols whose name matches a SQL LIKE pattern (escape character `\`)
    pub fn search_symbols(
        &self,
        like_pattern: &str,
        kind: Option<SymbolKind>,
        limit: usize,
    ) -> Result<Vec<Symbol>> {
        let conn = self.get_conn()?;
        let kind_str = kind.map(|k| k.as_str());
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM symbols
             WHERE name LIKE ?1 ESCAPE '\\' AND (?2 IS NULL OR kind = ?2)
             ORDER BY name, file_path, line_number
             LIMIT ?3",
            SYMBOL_COLUMNS
        ))?;
        let symbols = stmt
            .query_map(params![like_pattern, kind_str, limit as i64], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// Find symbols by file, ordered by line
    pub fn find_symbols_by_file(&self, file: &str) -> Result<Vec<Symbol>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM symbols WHERE file_path = ?1 ORDER BY line_number, id",
            SYMBOL_COLUMNS
        ))?;
        let symbols = stmt
            .query_map([file], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// Exact-name lookup, optionally narrowed by owning class and kind
    pub fn find_symbols_by_name(
        &self,
        name: &str,
        parent: Option<&str>,
        kind: Option<SymbolKind>,
    ) -> Result<Vec<Symbol>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM symbols
             WHERE name = ?1 AND (?2 IS NULL OR parent = ?2) AND (?3 IS NULL OR kind = ?3)
             ORDER BY file_path, line_number",
            SYMBOL_COLUMNS
        ))?;
        let symbols = stmt
            .query_map(params![name, parent, kind.map(|k| k.as_str())], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// Indexed files ordered by path
    pub fn list_files(&self) -> Result<Vec<FileCacheEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT path, language, content_hash, mtime, cache_schema_version, symbol_count
             FROM files ORDER BY path",
        )?;
        let files = stmt
            .query_map([], row_to_file_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Similarity pairs of the last completed run, best first
    pub fn similar_pairs(&self, kind: Option<SymbolKind>, limit: usize) -> Result<Vec<SimilarityPair>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT entity_kind, name_a, location_a, name_b, location_b,
                    reason, language_a, language_b, score
             FROM similar_pairs
             WHERE ?1 IS NULL OR entity_kind = ?1
             ORDER BY id
             LIMIT ?2",
        )?;
        let pairs = stmt
            .query_map(params![kind.map(|k| k.as_str()), limit as i64], row_to_pair)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    /// Number of symbol rows actually stored
    pub fn symbol_row_count(&self) -> Result<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Documented and total counts per kind
    pub fn doc_coverage(&self) -> Result<Vec<(SymbolKind, u64, u64)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT kind, COUNT(*), SUM(CASE WHEN docstring != '' THEN 1 ELSE 0 END)
             FROM symbols GROUP BY kind ORDER BY kind",
        )?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(0)?;
            let total: i64 = row.get(1)?;
            let documented: i64 = row.get(2)?;
            Ok((kind, total as u64, documented as u64))
        })?;

        let mut coverage = Vec::new();
        for row in rows {
            let (kind, total, documented) = row?;
            if let Some(kind) = SymbolKind::from_str(&kind) {
                coverage.push((kind, total, documented));
            }
        }
        Ok(coverage)
    }
}

const SYMBOL_COLUMNS: &str =
    "name, kind, signature, docstring, file_path, line_number, end_line_number, parent, language";

fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM index_meta WHERE key = ?1", [key], |row| row.get(0))
        .optional()
}

fn get_meta_i64(conn: &Connection, key: &str) -> rusqlite::Result<Option<i64>> {
    Ok(get_meta(conn, key)?.and_then(|v| v.parse().ok()))
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO index_meta (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value],
    )?;
    Ok(())
}

/// Safety check: `run_id` is the run the store is currently indexing for
fn is_active_run(conn: &Connection, run_id: i64) -> rusqlite::Result<bool> {
    let status = get_meta(conn, "status")?.map(|s| IndexStatus::from_str(&s));
    let current = get_meta_i64(conn, "run_id")?;
    Ok(status == Some(IndexStatus::Indexing) && current == Some(run_id))
}

fn bad_column(idx: usize, name: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(idx, name.to_string(), Type::Text)
}

fn parse_language(row: &Row, idx: usize) -> rusqlite::Result<Language> {
    let value: String = row.get(idx)?;
    Language::from_str(&value).map_err(|_| bad_column(idx, "language"))
}

fn parse_kind(row: &Row, idx: usize) -> rusqlite::Result<SymbolKind> {
    let value: String = row.get(idx)?;
    SymbolKind::from_str(&value).ok_or_else(|| bad_column(idx, "kind"))
}

/// Convert database row to Symbol
fn row_to_symbol(row: &Row) -> rusqlite::Result<Symbol> {
    Ok(Symbol {
        name: row.get(0)?,
        kind: parse_kind(row, 1)?,
        signature: row.get(2)?,
        docstring: row.get(3)?,
        file_path: row.get(4)?,
        line_number: row.get(5)?,
        end_line_number: row.get(6)?,
        parent: row.get(7)?,
        language: parse_language(row, 8)?,
    })
}

fn row_to_file_entry(row: &Row) -> rusqlite::Result<FileCacheEntry> {
    Ok(FileCacheEntry {
        file_path: row.get(0)?,
        language: parse_language(row, 1)?,
        content_hash: row.get(2)?,
        mtime: row.get(3)?,
        cache_schema_version: row.get(4)?,
        symbol_count: row.get(5)?,
    })
}

fn row_to_pair(row: &Row) -> rusqlite::Result<SimilarityPair> {
    Ok(SimilarityPair {
        entity_kind: parse_kind(row, 0)?,
        name_a: row.get(1)?,
        location_a: row.get(2)?,
        name_b: row.get(3)?,
        location_b: row.get(4)?,
        reason: row.get(5)?,
        language_a: parse_language(row, 6)?,
        language_b: parse_language(row, 7)?,
        score: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn symbol(name: &str, file: &str, line: u32) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind: SymbolKind::Function,
            signature: format!("{}()", name),
            docstring: String::new(),
            file_path: file.to_string(),
            line_number: line,
            end_line_number: line + 2,
            parent: String::new(),
            language: Language::Python,
        }
    }

    fn output(symbols: Vec<Symbol>) -> RunOutput {
        RunOutput {
            symbols,
            files: vec![FileCacheEntry {
                file_path: "a.py".to_string(),
                language: Language::Python,
                content_hash: "abc".to_string(),
                mtime: 1,
                cache_schema_version: 1,
                symbol_count: 2,
            }],
            similar: Vec::new(),
        }
    }

    #[test]
    fn test_create_database_uses_wal() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("test.db");

        let db = IndexDatabase::new(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(db.schema_init(), SchemaInit::Created);

        let conn = db.get_conn().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_fresh_metadata_is_idle() {
        let dir = tempdir().unwrap();
        let db = IndexDatabase::new(dir.path().join("test.db")).unwrap();

        let meta = db.metadata().unwrap();
        assert_eq!(meta.status, IndexStatus::Idle);
        assert_eq!(meta.symbol_count, 0);
        assert_eq!(meta.db_schema_version, super::super::schema::DB_SCHEMA_VERSION);
        assert!(meta.error_message.is_none());
    }

    #[test]
    fn test_begin_run_is_exclusive_until_stale() {
        let dir = tempdir().unwrap();
        let db = IndexDatabase::new(dir.path().join("test.db")).unwrap();

        let first = db.begin_run(1_000, 60_000).unwrap();
        assert_eq!(first, Some(1));
        assert_eq!(db.begin_run(2_000, 60_000).unwrap(), None);

        // heartbeat is older than the threshold, so the next run supersedes it
        let second = db.begin_run(100_000, 60_000).unwrap();
        assert_eq!(second, Some(2));
        assert!(!db.record_progress(1, &Progress::default(), 100_001).unwrap());
    }

    #[test]
    fn test_commit_replaces_everything() {
        let dir = tempdir().unwrap();
        let db = IndexDatabase::new(dir.path().join("test.db")).unwrap();

        let run = db.begin_run(1_000, 60_000).unwrap().unwrap();
        db.commit_run(run, &output(vec![symbol("a", "a.py", 1), symbol("b", "a.py", 5)]), 2_000)
            .unwrap();
        assert_eq!(db.symbol_row_count().unwrap(), 2);

        let run = db.begin_run(3_000, 60_000).unwrap().unwrap();
        db.commit_run(run, &output(vec![symbol("c", "a.py", 1)]), 4_000).unwrap();

        let meta = db.metadata().unwrap();
        assert_eq!(meta.status, IndexStatus::Completed);
        assert_eq!(meta.symbol_count, 1);
        assert_eq!(meta.last_indexed_timestamp, Some(4_000));
        assert_eq!(db.symbol_row_count().unwrap(), 1);
        assert_eq!(db.find_symbols_by_file("a.py").unwrap()[0].name, "c");
    }

    #[test]
    fn test_commit_rejected_after_failure() {
        let dir = tempdir().unwrap();
        let db = IndexDatabase::new(dir.path().join("test.db")).unwrap();

        let run = db.begin_run(1_000, 60_000).unwrap().unwrap();
        assert!(db.mark_failed(run, "stalled").unwrap());

        let err = db
            .commit_run(run, &output(vec![symbol("late", "a.py", 1)]), 2_000)
            .unwrap_err();
        assert!(matches!(err, IndexError::StaleWriteRace { run_id } if run_id == run));

        let meta = db.metadata().unwrap();
        assert_eq!(meta.status, IndexStatus::Failed);
        assert_eq!(meta.error_message.as_deref(), Some("stalled"));
        assert_eq!(db.symbol_row_count().unwrap(), 0);
    }

    #[test]
    fn test_mark_failed_only_touches_active_run() {
        let dir = tempdir().unwrap();
        let db = IndexDatabase::new(dir.path().join("test.db")).unwrap();

        let run = db.begin_run(1_000, 60_000).unwrap().unwrap();
        db.commit_run(run, &output(vec![symbol("a", "a.py", 1)]), 2_000).unwrap();

        assert!(!db.mark_failed(run, "too late").unwrap());
        assert_eq!(db.metadata().unwrap().status, IndexStatus::Completed);
    }

    #[test]
    fn test_search_like_escape_and_kind() {
        let dir = tempdir().unwrap();
        let db = IndexDatabase::new(dir.path().join("test.db")).unwrap();

        let mut class = symbol("get_user", "a.py", 10);
        class.kind = SymbolKind::Class;
        let run = db.begin_run(1_000, 60_000).unwrap().unwrap();
        db.commit_run(
            run,
            &output(vec![symbol("get_user", "a.py", 1), symbol("getXuser", "a.py", 5), class]),
            2_000,
        )
        .unwrap();

        let escaped = db.search_symbols("get\\_user", None, 10).unwrap();
        assert_eq!(escaped.len(), 2);
        assert!(escaped.iter().all(|s| s.name == "get_user"));

        let functions = db
            .search_symbols("get%", Some(SymbolKind::Function), 10)
            .unwrap();
        assert_eq!(functions.len(), 2);
    }
}
