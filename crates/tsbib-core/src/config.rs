use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TsbibError};

/// Root application configuration, loaded from `~/.config/tsbib/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub fetch: FetchConfig,
    pub dedup: DedupConfig,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub library_path: String,
}

/// Retry, backoff and concurrency knobs for the fetch stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
    pub deadline_secs: u64,
    pub concurrency: usize,
    pub user_agent: String,
}

/// Fixed similarity policy for duplicate detection.
///
/// `title_weight + author_weight + year_weight` should sum to 1.0 so the
/// thresholds read as fractions of a perfect match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub title_weight: f64,
    pub author_weight: f64,
    pub year_weight: f64,
    /// Minimum normalized Levenshtein similarity for a near title match.
    pub title_similarity: f64,
    /// Scores at or above this merge.
    pub merge_threshold: f64,
    /// Scores below this are clearly distinct works. Scores between the two
    /// thresholds are ambiguous and also become new records.
    pub new_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Html,
    ArxivAtom,
    CrossrefJson,
    InternetArchiveJson,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceFormat::Html => "html",
            SourceFormat::ArxivAtom => "arxiv_atom",
            SourceFormat::CrossrefJson => "crossref_json",
            SourceFormat::InternetArchiveJson => "internet_archive_json",
        };
        write!(f, "{s}")
    }
}

/// One configured source endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    pub format: SourceFormat,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Candidates scoring below this topic relevance are skipped.
    #[serde(default)]
    pub min_relevance: f64,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_min_interval_ms() -> u64 {
    1000
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("tsbib");
        Self {
            library_path: data_dir.to_string_lossy().to_string(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
            jitter_ms: 250,
            deadline_secs: 120,
            concurrency: 4,
            user_agent: format!("tsbib/{} (bibliography harvester)", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_weight: 0.5,
            author_weight: 0.3,
            year_weight: 0.2,
            title_similarity: 0.9,
            merge_threshold: 0.85,
            new_threshold: 0.6,
        }
    }
}

impl SourceConfig {
    pub fn defaults() -> Vec<Self> {
        let query = "time series analysis";
        vec![
            Self {
                name: "arxiv".to_string(),
                url: "http://export.arxiv.org/api/query".to_string(),
                format: SourceFormat::ArxivAtom,
                min_interval_ms: 3000,
                min_relevance: 0.1,
                params: BTreeMap::from([
                    ("search_query".to_string(), format!("all:\"{query}\"")),
                    ("start".to_string(), "0".to_string()),
                    ("max_results".to_string(), "100".to_string()),
                    ("sortBy".to_string(), "relevance".to_string()),
                ]),
            },
            Self {
                name: "crossref".to_string(),
                url: "https://api.crossref.org/works".to_string(),
                format: SourceFormat::CrossrefJson,
                min_interval_ms: 100,
                min_relevance: 0.1,
                params: BTreeMap::from([
                    ("query".to_string(), query.to_string()),
                    ("filter".to_string(), "has-license:true".to_string()),
                    ("rows".to_string(), "100".to_string()),
                ]),
            },
            Self {
                name: "internet_archive".to_string(),
                url: "https://archive.org/advancedsearch.php".to_string(),
                format: SourceFormat::InternetArchiveJson,
                min_interval_ms: 1000,
                min_relevance: 0.3,
                params: BTreeMap::from([
                    ("q".to_string(), format!("({query}) AND mediatype:texts")),
                    (
                        "fl[]".to_string(),
                        "identifier,title,creator,year,description".to_string(),
                    ),
                    ("rows".to_string(), "50".to_string()),
                    ("output".to_string(), "json".to_string()),
                ]),
            },
        ]
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/tsbib/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TSBIB_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tsbib")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::with_default_sources());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_default_sources() -> Self {
        Self {
            sources: SourceConfig::defaults(),
            ..Self::default()
        }
    }

    /// Save config to the standard path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.dedup;
        if d.new_threshold > d.merge_threshold {
            return Err(TsbibError::ConfigError(format!(
                "dedup.new_threshold ({}) exceeds dedup.merge_threshold ({})",
                d.new_threshold, d.merge_threshold
            )));
        }
        if self.fetch.max_attempts == 0 {
            return Err(TsbibError::ConfigError(
                "fetch.max_attempts must be at least 1".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(TsbibError::ConfigError(format!(
                    "duplicate source name: {}",
                    source.name
                )));
            }
        }
        Ok(())
    }

    pub fn set_library_path(&mut self, path: PathBuf) {
        self.core.library_path = path.to_string_lossy().to_string();
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.core.library_path).join("tsbib.db")
    }
}
