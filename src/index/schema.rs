use rusqlite::{Connection, OptionalExtension, Result};
use tracing::{debug, info, warn};

/// SQLite schema version. A stored version that differs triggers a full rebuild.
pub const DB_SCHEMA_VERSION: i64 = 3;

/// What `init_schema` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaInit {
    Created,
    UpToDate,
    /// The stored version differed, so every table was dropped and recreated.
    Rebuilt { from: i64 },
}

/// Initialize the database schema, rebuilding on a version mismatch.
///
/// The store is a derived cache, so a mismatch is never migrated in place.
pub fn init_schema(conn: &Connection) -> Result<SchemaInit> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current: Option<i64> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .optional()?
        .flatten();

    debug!("Stored schema version: {:?}", current);

    match current {
        None => {
            info!("Creating repomap schema v{}", DB_SCHEMA_VERSION);
            create_schema(conn)?;
            Ok(SchemaInit::Created)
        }
        Some(version) if version == DB_SCHEMA_VERSION => Ok(SchemaInit::UpToDate),
        Some(version) => {
            warn!(
                "Schema mismatch (store v{}, expected v{}), rebuilding index store",
                version, DB_SCHEMA_VERSION
            );
            drop_schema(conn)?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                )",
                [],
            )?;
            create_schema(conn)?;
            Ok(SchemaInit::Rebuilt { from: version })
        }
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;

        CREATE TABLE IF NOT EXISTS symbols (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            signature TEXT NOT NULL DEFAULT '',
            docstring TEXT NOT NULL DEFAULT '',
            file_path TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            end_line_number INTEGER NOT NULL,
            parent TEXT NOT NULL DEFAULT '',
            language TEXT NOT NULL,
            UNIQUE (name, kind, file_path, line_number, parent)
        );

        CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
        CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path, line_number);
        CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);

        CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            language TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            mtime INTEGER NOT NULL,
            cache_schema_version INTEGER NOT NULL,
            symbol_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS similar_pairs (
            id INTEGER PRIMARY KEY,
            entity_kind TEXT NOT NULL,
            name_a TEXT NOT NULL,
            location_a TEXT NOT NULL,
            name_b TEXT NOT NULL,
            location_b TEXT NOT NULL,
            reason TEXT NOT NULL,
            language_a TEXT NOT NULL,
            language_b TEXT NOT NULL,
            score REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        INSERT OR IGNORE INTO index_meta (key, value) VALUES ('status', 'idle');
        INSERT OR IGNORE INTO index_meta (key, value) VALUES ('symbol_count', '0');
        INSERT OR IGNORE INTO index_meta (key, value) VALUES ('run_id', '0');

        COMMIT;",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('db_schema_version', ?1)",
        [DB_SCHEMA_VERSION.to_string()],
    )?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [DB_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// Drop all tables (for rebuilding)
pub fn drop_schema(conn: &Connection) -> Result<()> {
    info!("Dropping all schema tables");

    conn.execute_batch(
        "DROP TABLE IF EXISTS schema_version;
         DROP TABLE IF EXISTS index_meta;
         DROP TABLE IF EXISTS similar_pairs;
         DROP TABLE IF EXISTS files;
         DROP TABLE IF EXISTS symbols;
         -- tables from earlier layouts
         DROP TABLE IF EXISTS index_stats;
         DROP TABLE IF EXISTS relationships;",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(init_schema(&conn).unwrap(), SchemaInit::Created);

        let tables = table_names(&conn);
        for expected in ["symbols", "files", "similar_pairs", "index_meta", "schema_version"] {
            assert!(tables.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_idempotent_init() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(init_schema(&conn).unwrap(), SchemaInit::UpToDate);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_version_mismatch_rebuilds() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO symbols (name, kind, file_path, line_number, end_line_number, language)
             VALUES ('f', 'function', 'a.py', 1, 2, 'python')",
            [],
        )
        .unwrap();
        conn.execute("UPDATE schema_version SET version = 1", []).unwrap();

        assert_eq!(init_schema(&conn).unwrap(), SchemaInit::Rebuilt { from: 1 });

        let symbols: i64 = conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))
            .unwrap();
        assert_eq!(symbols, 0);

        let version: String = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'db_schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, DB_SCHEMA_VERSION.to_string());
    }

    #[test]
    fn test_same_line_symbols_with_distinct_parents() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let insert = "INSERT INTO symbols (name, kind, file_path, line_number, end_line_number, parent, language)
                      VALUES ('new', 'method', 'a.rs', 1, 1, ?1, 'rust')";
        conn.execute(insert, ["A"]).unwrap();
        conn.execute(insert, ["B"]).unwrap();
        assert!(conn.execute(insert, ["A"]).is_err());
    }

    #[test]
    fn test_drop_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        drop_schema(&conn).unwrap();
        assert!(table_names(&conn).is_empty());
    }
}
