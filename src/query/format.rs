// Compact text rendering of query results, shared by the MCP tools and the CLI

use std::fmt::Write;

use super::engine::{FileListing, StatusReport, SymbolContent};
use crate::index::{SimilarityPair, Symbol};

fn symbol_line(out: &mut String, symbol: &Symbol) {
    let _ = write!(
        out,
        "{} {} {}:{}-{}",
        symbol.kind,
        symbol.full_name(),
        symbol.file_path,
        symbol.line_number,
        symbol.end_line_number
    );
    if !symbol.signature.is_empty() {
        let _ = write!(out, " | {}", symbol.signature);
    }
    let doc = symbol.doc_summary();
    if !doc.is_empty() {
        let _ = write!(out, " | {}", doc);
    }
    out.push('\n');
}

pub fn format_symbols(symbols: &[Symbol], empty_message: &str) -> String {
    if symbols.is_empty() {
        return empty_message.to_string();
    }
    let mut out = format!("{} symbols:\n", symbols.len());
    for symbol in symbols {
        symbol_line(&mut out, symbol);
    }
    out.truncate(out.trim_end().len());
    out
}

pub fn format_symbol_content(found: &SymbolContent) -> String {
    let s = &found.symbol;
    let mut out = format!(
        "{} {} {}:{}-{}\n",
        s.kind,
        s.full_name(),
        s.file_path,
        s.line_number,
        s.end_line_number
    );
    out.push_str(&found.content);

    if !found.other_matches.is_empty() {
        let _ = write!(out, "\n\n{} other matches:\n", found.other_matches.len());
        for other in &found.other_matches {
            let _ = writeln!(out, "{} {} {}", other.kind, other.full_name(), other.location());
        }
        out.truncate(out.trim_end().len());
    }
    out
}

pub fn format_file_listing(listing: &FileListing) -> String {
    if listing.is_empty() {
        return "No indexed files".to_string();
    }
    let total: usize = listing.values().map(Vec::len).sum();
    let mut out = format!("{} files in {} directories:\n", total, listing.len());
    for (dir, files) in listing {
        let _ = writeln!(out, "{}/", dir);
        for file in files {
            let name = file.file_path.rsplit('/').next().unwrap_or(&file.file_path);
            let _ = writeln!(out, "  {} ({}, {} symbols)", name, file.language, file.symbol_count);
        }
    }
    out.truncate(out.trim_end().len());
    out
}

pub fn format_similar(pairs: &[SimilarityPair]) -> String {
    if pairs.is_empty() {
        return "No similar symbols found".to_string();
    }
    let mut out = format!("{} similar pairs:\n", pairs.len());
    for pair in pairs {
        let _ = writeln!(
            out,
            "{} {} ({}) ~ {} ({}) [{}] {:.2}: {}",
            pair.entity_kind,
            pair.name_a,
            pair.location_a,
            pair.name_b,
            pair.location_b,
            pair.language_a,
            pair.score,
            pair.reason
        );
    }
    out.truncate(out.trim_end().len());
    out
}

pub fn format_status(report: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "project: {}", report.project_root.display());

    match &report.metadata {
        Some(meta) => {
            let _ = writeln!(out, "status: {}", meta.status);
            let _ = writeln!(out, "symbols: {}", meta.symbol_count);
            if let Some(ts) = meta.last_indexed_timestamp {
                let when = chrono::DateTime::from_timestamp_millis(ts)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| ts.to_string());
                let _ = writeln!(out, "last indexed: {}", when);
            }
            if let Some(err) = &meta.error_message {
                let _ = writeln!(out, "error: {}", err);
            }
            if meta.status == crate::index::IndexStatus::Indexing {
                let p = &meta.progress;
                let _ = writeln!(
                    out,
                    "progress: run {} {}/{} files, {} symbols",
                    meta.run_id, p.files_scanned, p.files_total, p.symbols_found
                );
            }
        }
        None => {
            let _ = writeln!(out, "status: not yet indexed");
        }
    }

    if let Some(run_id) = report.active_run {
        let _ = writeln!(out, "worker: run {} in progress", run_id);
    }

    let _ = writeln!(
        out,
        "stale: {} ({})",
        if report.staleness.stale { "yes" } else { "no" },
        report.staleness.reason
    );

    if !report.doc_coverage.is_empty() {
        let parts: Vec<String> = report
            .doc_coverage
            .iter()
            .map(|(kind, total, documented)| {
                let pct = if *total == 0 {
                    0.0
                } else {
                    *documented as f64 * 100.0 / *total as f64
                };
                format!("{} {}/{} ({:.0}%)", kind, documented, total, pct)
            })
            .collect();
        let _ = writeln!(out, "documented: {}", parts.join(", "));
    }

    out.truncate(out.trim_end().len());
    out
}
