// Configuration management for repomap

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::index::Language;
use crate::pattern::glob_to_regex;

/// Per-project configuration file, looked up in the project root
pub const CONFIG_FILE: &str = ".repomap.toml";

/// Directories never worth indexing
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    "venv",
    ".venv",
    "target",
    "build",
    "dist",
    ".next",
    ".cache",
    "vendor",
    ".tox",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    "site-packages",
    "eggs",
    ".eggs",
];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub languages: LanguagesConfig,
    pub indexing: IndexingConfig,
    pub similarity: SimilarityConfig,
    pub watchdog: WatchdogConfig,
    pub limits: LimitsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory under the project root holding the store and sidecar
    pub dir: String,
    pub db_file: String,
    pub sidecar_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguagesConfig {
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// `name/` matches a directory anywhere in the tree, anything else is a path glob
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    /// Files larger than this many bytes are skipped
    pub max_file_size: u64,
    pub progress_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub name_weight: f64,
    pub doc_weight: f64,
    pub threshold: f64,
    pub min_name_len: usize,
    pub min_doc_tokens: usize,
    /// Upper bound on pairs persisted per run, best scores kept
    pub max_pairs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub interval_secs: u64,
    pub stale_after_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Address-space cap for the indexing worker, 0 disables it
    pub memory_mb: u64,
    /// CPU-time cap for the indexing worker, 0 disables it
    pub cpu_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub staleness_check_secs: u64,
    pub watch: bool,
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: ".claude".to_string(),
            db_file: "repo-map.db".to_string(),
            sidecar_file: "repo-map-cache.json".to_string(),
        }
    }
}

impl Default for LanguagesConfig {
    fn default() -> Self {
        Self {
            enabled: Language::ALL.iter().map(|l| l.as_str().to_string()).collect(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude: DEFAULT_EXCLUDED_DIRS
                .iter()
                .map(|dir| format!("{}/", dir))
                .collect(),
            include: vec![],
            max_file_size: 1024 * 1024,
            progress_interval_ms: 500,
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            name_weight: 0.35,
            doc_weight: 0.65,
            threshold: 0.7,
            min_name_len: 3,
            min_doc_tokens: 3,
            max_pairs: 1000,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            stale_after_secs: 120,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            memory_mb: 2048,
            cpu_secs: 600,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            staleness_check_secs: 60,
            watch: true,
            debounce_ms: 2000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from project directory
    /// Looks for .repomap.toml in the project root
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(CONFIG_FILE);

        if !config_path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE, project_dir.as_ref().display());
            return Self::default();
        }

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Ignoring invalid {}: {:#}", config_path.display(), e);
                Self::default()
            }
        }
    }

    pub fn storage_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.storage.dir)
    }

    pub fn db_path(&self, project_root: &Path) -> PathBuf {
        self.storage_dir(project_root).join(&self.storage.db_file)
    }

    pub fn sidecar_path(&self, project_root: &Path) -> PathBuf {
        self.storage_dir(project_root).join(&self.storage.sidecar_file)
    }

    /// Check if a repository-relative path should be indexed based on include/exclude patterns
    pub fn should_index_file(&self, rel_path: &str) -> bool {
        if self.is_excluded(rel_path) {
            return false;
        }

        if self.indexing.include.is_empty() {
            return true;
        }
        self.indexing
            .include
            .iter()
            .any(|pattern| matches_pattern(rel_path, pattern))
    }

    /// True when the path or one of its directories is excluded
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        let storage = self.storage.dir.trim_matches('/');
        if !storage.is_empty()
            && (rel_path == storage || rel_path.starts_with(&format!("{}/", storage)))
        {
            return true;
        }
        self.indexing
            .exclude
            .iter()
            .any(|pattern| matches_pattern(rel_path, pattern))
    }

    /// Enabled languages, filtered by what's actually supported
    pub fn enabled_languages(&self) -> Vec<Language> {
        self.languages
            .enabled
            .iter()
            .filter_map(|lang| Language::from_str(lang).ok())
            .collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.dir.is_empty() || self.storage.db_file.is_empty() {
            return Err(anyhow::anyhow!("Storage dir and db file cannot be empty"));
        }

        for lang in &self.languages.enabled {
            Language::from_str(lang)?;
        }

        for pattern in self.indexing.exclude.iter().chain(&self.indexing.include) {
            if !pattern.ends_with('/') {
                glob_to_regex(pattern).with_context(|| format!("invalid pattern {:?}", pattern))?;
            }
        }

        if self.indexing.progress_interval_ms == 0 {
            return Err(anyhow::anyhow!("Progress interval must be greater than 0"));
        }

        let s = &self.similarity;
        if s.name_weight < 0.0 || s.doc_weight < 0.0 || s.name_weight + s.doc_weight <= 0.0 {
            return Err(anyhow::anyhow!("Similarity weights must be non-negative and not both zero"));
        }
        if !(0.0..=1.0).contains(&s.threshold) {
            return Err(anyhow::anyhow!("Similarity threshold must be within 0..=1"));
        }
        if s.max_pairs == 0 {
            return Err(anyhow::anyhow!("Similarity max_pairs must be greater than 0"));
        }

        if self.watchdog.interval_secs == 0 {
            return Err(anyhow::anyhow!("Watchdog interval must be greater than 0"));
        }
        if self.watchdog.stale_after_secs * 1000 <= self.indexing.progress_interval_ms {
            return Err(anyhow::anyhow!(
                "Watchdog staleness threshold must exceed the progress interval"
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }

        Ok(())
    }
}

/// `name/` matches any directory component, other patterns are globs over the
/// whole path, or over the file name when they contain no `/`.
fn matches_pattern(rel_path: &str, pattern: &str) -> bool {
    if let Some(dir) = pattern.strip_suffix('/') {
        let mut components: Vec<&str> = rel_path.split('/').collect();
        components.pop();
        return components.contains(&dir) || rel_path == dir;
    }

    let Ok(re) = glob_to_regex(pattern) else {
        return false;
    };
    if re.is_match(rel_path) {
        return true;
    }
    !pattern.contains('/')
        && rel_path
            .rsplit('/')
            .next()
            .is_some_and(|name| re.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.dir, ".claude");
        assert_eq!(config.enabled_languages(), Language::ALL.to_vec());
        assert!(config.indexing.exclude.contains(&"target/".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths() {
        let config = Config::default();
        let root = Path::new("/repo");
        assert_eq!(config.db_path(root), Path::new("/repo/.claude/repo-map.db"));
        assert_eq!(
            config.sidecar_path(root),
            Path::new("/repo/.claude/repo-map-cache.json")
        );
    }

    #[test]
    fn test_should_index_file() {
        let config = Config::default();

        assert!(config.should_index_file("src/main.rs"));
        assert!(config.should_index_file("lib/utils.py"));

        assert!(!config.should_index_file("target/debug/build.rs"));
        assert!(!config.should_index_file("web/node_modules/pkg/index.py"));
        assert!(!config.should_index_file("a/__pycache__/x.py"));
        assert!(!config.should_index_file(".claude/repo-map.db"));
        // a file merely named like an excluded dir is kept
        assert!(config.should_index_file("src/build.py"));
    }

    #[test]
    fn test_include_and_glob_patterns() {
        let mut config = Config::default();
        config.indexing.include = vec!["src/**".to_string()];
        config.indexing.exclude.push("*_pb2.py".to_string());

        assert!(config.should_index_file("src/a/b.py"));
        assert!(!config.should_index_file("scripts/run.py"));
        assert!(!config.should_index_file("src/proto/user_pb2.py"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [similarity]
            threshold = 0.8

            [languages]
            enabled = ["python"]
            "#,
        )
        .unwrap();

        assert_eq!(config.similarity.threshold, 0.8);
        assert_eq!(config.similarity.name_weight, 0.35);
        assert_eq!(config.enabled_languages(), vec![Language::Python]);
        assert_eq!(config.watchdog.stale_after_secs, 120);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.languages.enabled = vec!["cobol".to_string()];
        assert!(config.validate().is_err());
        config.languages.enabled = vec!["python".to_string()];

        config.similarity.threshold = 1.5;
        assert!(config.validate().is_err());
        config.similarity.threshold = 0.7;

        config.similarity.max_pairs = 0;
        assert!(config.validate().is_err());
        config.similarity.max_pairs = 1000;

        config.watchdog.stale_after_secs = 0;
        assert!(config.validate().is_err());
        config.watchdog.stale_after_secs = 120;

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[similarity]\nthreshold = 7.0\n").unwrap();

        let config = Config::from_project_dir(dir.path());
        assert_eq!(config.similarity.threshold, 0.7);
    }
}
