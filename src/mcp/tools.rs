// MCP tool handlers

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};

use crate::index::SymbolKind;
use crate::query::engine::QueryEngine;
use crate::query::format;
use crate::supervisor::{ReindexAck, Supervisor};

type Args = Map<String, Value>;

/// Successful tool result
fn text(body: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": body.into() }]
    })
}

/// Tool-level failure, reported to the client rather than as a protocol error
fn error_text(body: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": body.into() }],
        "isError": true
    })
}

fn str_arg<'a>(args: &'a Args, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn required_str<'a>(args: &'a Args, key: &str) -> Result<&'a str> {
    str_arg(args, key).ok_or_else(|| anyhow!("Missing {}", key))
}

fn limit_arg(args: &Args) -> Option<usize> {
    args.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize)
}

fn kind_arg(args: &Args) -> Result<Option<SymbolKind>> {
    match str_arg(args, "kind") {
        Some(raw) => SymbolKind::from_str(raw)
            .map(Some)
            .ok_or_else(|| anyhow!("Unknown kind '{}', expected function, class, method or other", raw)),
        None => Ok(None),
    }
}

/// search_symbols tool handler
pub fn search_symbols(engine: &QueryEngine, args: &Args) -> Result<Value> {
    let pattern = required_str(args, "pattern")?;
    let symbols = engine.search_symbols(pattern, kind_arg(args)?, limit_arg(args))?;
    Ok(text(format::format_symbols(
        &symbols,
        &format!("No symbols found matching '{}'", pattern),
    )))
}

/// get_file_symbols tool handler
pub fn get_file_symbols(engine: &QueryEngine, args: &Args) -> Result<Value> {
    let file = required_str(args, "file")?;
    let symbols = engine.get_file_symbols(file)?;
    Ok(text(format::format_symbols(
        &symbols,
        &format!("No symbols indexed for '{}'", file),
    )))
}

/// get_symbol_content tool handler
pub fn get_symbol_content(engine: &QueryEngine, args: &Args) -> Result<Value> {
    let name = required_str(args, "name")?;
    match engine.get_symbol_content(name, kind_arg(args)?) {
        Ok(found) => Ok(text(format::format_symbol_content(&found))),
        Err(e) if e.is_not_found() => Ok(error_text(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// list_files tool handler
pub fn list_files(engine: &QueryEngine, args: &Args) -> Result<Value> {
    let listing = engine.list_files(str_arg(args, "pattern"))?;
    Ok(text(format::format_file_listing(&listing)))
}

/// list_similar tool handler
pub fn list_similar(engine: &QueryEngine, args: &Args) -> Result<Value> {
    let pairs = engine.list_similar(kind_arg(args)?, limit_arg(args))?;
    Ok(text(format::format_similar(&pairs)))
}

/// repo_map_status tool handler
pub fn status(engine: &QueryEngine, supervisor: &Supervisor) -> Result<Value> {
    let report = engine.status(supervisor.active_run())?;
    Ok(text(format::format_status(&report)))
}

/// reindex_repo_map tool handler
pub async fn reindex(supervisor: &Supervisor, args: &Args) -> Result<Value> {
    let force = args.get("force").and_then(|v| v.as_bool()).unwrap_or(false);
    let body = match supervisor.reindex(force).await? {
        ReindexAck::Started { run_id } => format!("Indexing started in background (run {})", run_id),
        ReindexAck::AlreadyIndexing => "Indexing already in progress".to_string(),
        ReindexAck::Fresh { reason } => format!("Index is fresh ({})", reason),
    };
    Ok(text(body))
}
