// Source file discovery

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::index::Language;

/// A source file selected for indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Repository-relative, forward-slash separated
    pub rel_path: String,
    pub language: Language,
}

/// Forward-slash path of `path` relative to `root`
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Walk `root` and collect every indexable file, sorted by relative path.
///
/// Excluded directories are pruned rather than filtered so large trees like
/// `node_modules` are never descended into.
pub fn discover_files(root: &Path, config: &Config, languages: &[Language]) -> Vec<SourceFile> {
    let keep_dir = |entry: &DirEntry| -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        match relative_path(root, entry.path()) {
            Some(rel) => !config.is_excluded(&format!("{}/", rel)) && !config.is_excluded(&rel),
            None => true,
        }
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep_dir)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(language) = Language::from_path(entry.path()) else {
            continue;
        };
        if !languages.contains(&language) {
            continue;
        }
        let Some(rel_path) = relative_path(root, entry.path()) else {
            continue;
        };
        if !config.should_index_file(&rel_path) {
            continue;
        }

        match entry.metadata() {
            Ok(meta) if meta.len() > config.indexing.max_file_size => {
                debug!("Skipping {} ({} bytes, over size limit)", rel_path, meta.len());
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Cannot stat {}: {}", rel_path, e);
                continue;
            }
        }

        files.push(SourceFile {
            path: entry.into_path(),
            rel_path,
            language,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discovers_supported_files_only() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "a.py", "x = 1\n");
        touch(root, "src/lib.rs", "fn a() {}\n");
        touch(root, "README.md", "# hi\n");
        touch(root, "node_modules/pkg/index.py", "y = 2\n");
        touch(root, "pkg/__pycache__/a.py", "");
        touch(root, ".claude/cached.py", "");

        let files = discover_files(root, &Config::default(), &Language::ALL);
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["a.py", "src/lib.rs"]);
        assert_eq!(files[1].language, Language::Rust);
    }

    #[test]
    fn test_language_filter_and_size_limit() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "a.py", "x = 1\n");
        touch(root, "b.go", "package b\n");
        touch(root, "big.py", &"#".repeat(64));

        let mut config = Config::default();
        config.indexing.max_file_size = 32;

        let files = discover_files(root, &config, &[Language::Python]);
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["a.py"]);
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_path(root, Path::new("/repo/src/a.py")).as_deref(),
            Some("src/a.py")
        );
        assert_eq!(relative_path(root, Path::new("/repo")), None);
        assert_eq!(relative_path(root, Path::new("/other/a.py")), None);
    }
}
