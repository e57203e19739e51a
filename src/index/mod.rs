// Index storage and the records it holds

pub mod db;
pub mod schema;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{IndexError, Result};

/// Source languages with a registered parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Rust,
    Go,
    Java,
    Cpp,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Python,
        Language::Rust,
        Language::Go,
        Language::Java,
        Language::Cpp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::Rust => &["rs"],
            Language::Go => &["go"],
            Language::Java => &["java"],
            Language::Cpp => &["cpp", "cc", "cxx", "hpp", "hh", "hxx", "h"],
        }
    }

    /// Language detection by file extension. Unknown extensions yield `None`.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext))
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "python" => Ok(Language::Python),
            "rust" => Ok(Language::Rust),
            "go" => Ok(Language::Go),
            "java" => Ok(Language::Java),
            "cpp" | "c++" => Ok(Language::Cpp),
            other => Err(IndexError::UnsupportedLanguage(other.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbol kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Method,
    /// Any other named declaration: constants, type aliases, modules.
    Other,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "function" => Some(SymbolKind::Function),
            "class" => Some(SymbolKind::Class),
            "method" => Some(SymbolKind::Method),
            "other" => Some(SymbolKind::Other),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted declaration.
///
/// `(name, kind, file_path, line_number)` identifies a symbol within one run.
/// Lines are 1-indexed and `end_line_number >= line_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub signature: String,
    pub docstring: String,
    pub file_path: String,
    pub line_number: u32,
    pub end_line_number: u32,
    pub parent: String,
    pub language: Language,
}

impl Symbol {
    /// `Parent.name` for owned symbols, `name` otherwise.
    pub fn full_name(&self) -> String {
        if self.parent.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.parent, self.name)
        }
    }

    pub fn location(&self) -> String {
        format!("{}:{}", self.file_path, self.line_number)
    }

    /// First line of the docstring, for compact rendering.
    pub fn doc_summary(&self) -> &str {
        self.docstring.lines().next().unwrap_or("").trim()
    }
}

/// Per-file cache key, persisted in the same transaction as the file's symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCacheEntry {
    pub file_path: String,
    pub language: Language,
    pub content_hash: String,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime: i64,
    pub cache_schema_version: i64,
    pub symbol_count: u32,
}

/// A flagged potential duplicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityPair {
    pub entity_kind: SymbolKind,
    pub name_a: String,
    pub location_a: String,
    pub name_b: String,
    pub location_b: String,
    pub reason: String,
    pub language_a: Language,
    pub language_b: Language,
    pub score: f64,
}

/// Index lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Idle,
    Indexing,
    Completed,
    Failed,
    Canceled,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Idle => "idle",
            IndexStatus::Indexing => "indexing",
            IndexStatus::Completed => "completed",
            IndexStatus::Failed => "failed",
            IndexStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "indexing" => IndexStatus::Indexing,
            "completed" => IndexStatus::Completed,
            "failed" => IndexStatus::Failed,
            "canceled" => IndexStatus::Canceled,
            _ => IndexStatus::Idle,
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of the active run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub files_scanned: u64,
    pub files_total: u64,
    pub symbols_found: u64,
}

/// Process-wide index health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub status: IndexStatus,
    pub db_schema_version: i64,
    /// Milliseconds since the Unix epoch of the last completed run.
    pub last_indexed_timestamp: Option<i64>,
    pub symbol_count: u64,
    pub error_message: Option<String>,
    pub run_id: i64,
    pub started_at: Option<i64>,
    /// Milliseconds since the Unix epoch of the last progress heartbeat.
    pub progress_at: Option<i64>,
    pub progress: Progress,
}

/// Language parser capability
pub trait Parser: Send + Sync {
    fn language(&self) -> Language;

    fn can_parse(&self, file_path: &str) -> bool {
        Language::from_path(file_path) == Some(self.language())
    }

    /// Extract symbols from one file. `file_path` is repository-relative.
    fn parse(&self, content: &str, file_path: &str) -> Result<Vec<Symbol>>;
}

/// Current time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path("src/a.py"), Some(Language::Python));
        assert_eq!(Language::from_path("lib.rs"), Some(Language::Rust));
        assert_eq!(Language::from_path("cmd/main.go"), Some(Language::Go));
        assert_eq!(Language::from_path("A.java"), Some(Language::Java));
        assert_eq!(Language::from_path("include/shapes.hpp"), Some(Language::Cpp));
        assert_eq!(Language::from_path("src/shapes.cc"), Some(Language::Cpp));
        assert_eq!(Language::from_path("README.md"), None);
        assert_eq!(Language::from_path("Makefile"), None);
    }

    #[test]
    fn test_full_name() {
        let mut symbol = Symbol {
            name: "save".to_string(),
            kind: SymbolKind::Method,
            signature: "save(self)".to_string(),
            docstring: "Persist the user.\nMore detail.".to_string(),
            file_path: "models/user.py".to_string(),
            line_number: 10,
            end_line_number: 14,
            parent: "User".to_string(),
            language: Language::Python,
        };
        assert_eq!(symbol.full_name(), "User.save");
        assert_eq!(symbol.location(), "models/user.py:10");
        assert_eq!(symbol.doc_summary(), "Persist the user.");

        symbol.parent.clear();
        assert_eq!(symbol.full_name(), "save");
    }

    #[test]
    fn test_status_round_trip_unknown_is_idle() {
        assert_eq!(IndexStatus::from_str("indexing"), IndexStatus::Indexing);
        assert_eq!(IndexStatus::from_str("garbage"), IndexStatus::Idle);
    }
}
