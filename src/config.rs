//! TOML configuration.
//!
//! Every command takes `--config` (default `./config/hr.toml`). Relative
//! paths inside the file are resolved against the working directory.
//!
//! ```toml
//! [db]
//! path = "./data/hr.sqlite"
//!
//! [manual]
//! root = "./manual"
//!
//! [records]
//! data_dir = "./data"
//!
//! [retrieval]
//! final_limit = 3
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use hr_assistant_core::chunk::ChunkOptions;
use hr_assistant_core::search::{GroupBy, SearchMode, SearchParams};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub manual: ManualConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub records: RecordsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where the HR manual lives and which files belong to it.
#[derive(Debug, Deserialize, Clone)]
pub struct ManualConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
    /// Markdown heading levels that start a new section.
    #[serde(default = "default_split_levels")]
    pub split_levels: Vec<usize>,
}

fn default_max_tokens() -> usize {
    250
}
fn default_overlap() -> usize {
    50
}
fn default_split_levels() -> Vec<usize> {
    vec![1, 2]
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
            split_levels: default_split_levels(),
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions {
            max_tokens: self.max_tokens,
            overlap_tokens: self.overlap_tokens,
            split_levels: self.split_levels.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_keyword: i64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_vector: i64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
    #[serde(default)]
    pub group_by: GroupBy,
    #[serde(default = "default_mode")]
    pub default_mode: SearchMode,
}

fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_candidate_k() -> i64 {
    40
}
fn default_final_limit() -> i64 {
    3
}
fn default_mode() -> SearchMode {
    SearchMode::Hybrid
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid_alpha: default_hybrid_alpha(),
            candidate_k_keyword: default_candidate_k(),
            candidate_k_vector: default_candidate_k(),
            final_limit: default_final_limit(),
            group_by: GroupBy::default(),
            default_mode: default_mode(),
        }
    }
}

impl RetrievalConfig {
    /// Search parameters with an optional per-call result limit.
    pub fn params(&self, limit: Option<i64>) -> SearchParams {
        SearchParams {
            hybrid_alpha: self.hybrid_alpha,
            candidate_k_keyword: self.candidate_k_keyword,
            candidate_k_vector: self.candidate_k_vector,
            final_limit: limit.unwrap_or(self.final_limit),
            group_by: self.group_by,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Disabled,
    OpenAI,
    Ollama,
    Local,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Disabled => "disabled",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Local => "local",
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// API base URL. For `openai` the `OPENAI_API_BASE` environment variable
    /// wins over this value; for `ollama` it defaults to `http://localhost:11434`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Disabled,
            model: None,
            dims: None,
            base_url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Disabled
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != ProviderKind::Disabled
    }
}

/// Location of the JSON record files.
#[derive(Debug, Deserialize, Clone)]
pub struct RecordsConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_employees_file")]
    pub employees_file: String,
    #[serde(default = "default_vacation_requests_file")]
    pub vacation_requests_file: String,
    #[serde(default = "default_sick_leaves_file")]
    pub sick_leaves_file: String,
    #[serde(default = "default_payroll_file")]
    pub payroll_file: String,
}

fn default_employees_file() -> String {
    "empleados.json".to_string()
}
fn default_vacation_requests_file() -> String {
    "solicitudes_vacaciones.json".to_string()
}
fn default_sick_leaves_file() -> String {
    "bajas_medicas.json".to_string()
}
fn default_payroll_file() -> String {
    "nominas.json".to_string()
}

impl RecordsConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            employees_file: default_employees_file(),
            vacation_requests_file: default_vacation_requests_file(),
            sick_leaves_file: default_sick_leaves_file(),
            payroll_file: default_payroll_file(),
        }
    }

    pub fn employees_path(&self) -> PathBuf {
        self.data_dir.join(&self.employees_file)
    }
    pub fn vacation_requests_path(&self) -> PathBuf {
        self.data_dir.join(&self.vacation_requests_file)
    }
    pub fn sick_leaves_path(&self) -> PathBuf {
        self.data_dir.join(&self.sick_leaves_file)
    }
    pub fn payroll_path(&self) -> PathBuf {
        self.data_dir.join(&self.payroll_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}
fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let chunking = &config.chunking;
    if chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if chunking.overlap_tokens >= chunking.max_tokens {
        bail!("chunking.overlap_tokens must be smaller than chunking.max_tokens");
    }
    if chunking.split_levels.is_empty() {
        bail!("chunking.split_levels must name at least one heading level");
    }
    if let Some(level) = chunking.split_levels.iter().find(|l| !(1..=6).contains(*l)) {
        bail!("chunking.split_levels entries must be in 1..=6, got {level}");
    }

    let retrieval = &config.retrieval;
    if retrieval.final_limit < 1 {
        bail!("retrieval.final_limit must be >= 1");
    }
    if retrieval.candidate_k_keyword < 1 || retrieval.candidate_k_vector < 1 {
        bail!("retrieval.candidate_k_* must be >= 1");
    }
    if !(0.0..=1.0).contains(&retrieval.hybrid_alpha) {
        bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }

    let embedding = &config.embedding;
    match embedding.provider {
        ProviderKind::Disabled | ProviderKind::Local => {}
        ProviderKind::OpenAI | ProviderKind::Ollama => {
            if embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
            if matches!(embedding.dims, None | Some(0)) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
        }
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    Ok(())
}
