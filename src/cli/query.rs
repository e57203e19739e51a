use anyhow::Result;
use std::path::Path;

use repomap::config::Config;
use repomap::index::SymbolKind;
use repomap::query::engine::QueryEngine;
use repomap::query::format;

/// Read-only queries against the index
pub enum Query {
    Search {
        pattern: String,
        kind: Option<SymbolKind>,
        limit: usize,
    },
    Symbols {
        file: String,
    },
    Show {
        name: String,
        kind: Option<SymbolKind>,
    },
    Files {
        pattern: Option<String>,
    },
    Similar {
        kind: Option<SymbolKind>,
        limit: usize,
    },
    Status,
}

pub fn parse_kind(raw: &str) -> Result<SymbolKind, String> {
    SymbolKind::from_str(raw)
        .ok_or_else(|| format!("unknown kind '{}', expected function, class, method or other", raw))
}

/// Run one query and print its compact text form. Returns false when the
/// query found nothing it was asked for by exact name.
pub fn run_query(project: &Path, query: Query) -> Result<bool> {
    let engine = QueryEngine::new(project, Config::from_project_dir(project));

    let text = match query {
        Query::Search { pattern, kind, limit } => {
            let symbols = engine.search_symbols(&pattern, kind, Some(limit))?;
            format::format_symbols(&symbols, &format!("No symbols found matching '{}'", pattern))
        }
        Query::Symbols { file } => {
            let symbols = engine.get_file_symbols(&file)?;
            format::format_symbols(&symbols, &format!("No symbols indexed for '{}'", file))
        }
        Query::Show { name, kind } => match engine.get_symbol_content(&name, kind) {
            Ok(found) => format::format_symbol_content(&found),
            Err(e) if e.is_not_found() => {
                eprintln!("{}", e);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        },
        Query::Files { pattern } => format::format_file_listing(&engine.list_files(pattern.as_deref())?),
        Query::Similar { kind, limit } => format::format_similar(&engine.list_similar(kind, Some(limit))?),
        Query::Status => format::format_status(&engine.status(None)?),
    };

    println!("{}", text);
    Ok(true)
}
