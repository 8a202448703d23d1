//! TOML configuration parsing and validation.
//!
//! The [`Config`] is loaded once at startup and handed by reference to every
//! component. It is never mutated after [`load_config`] returns.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::taxonomy::Taxonomy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub taxonomy: Taxonomy,
    #[serde(default)]
    pub moc: MocConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("input")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl PathsConfig {
    pub fn checkpoint_db(&self) -> PathBuf {
        self.data_dir.join("checkpoints.sqlite")
    }

    pub fn index_file(&self) -> PathBuf {
        self.data_dir.join("notes_index.json")
    }

    pub fn stats_file(&self) -> PathBuf {
        self.data_dir.join("notes_stats.json")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            max_content_length: default_max_content_length(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            request_delay_ms: default_request_delay_ms(),
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_content_length() -> usize {
    4000
}
fn default_max_tokens() -> u32 {
    500
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    2000
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_concurrency() -> usize {
    1
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_summary_max_chars() -> usize {
    300
}

impl OracleConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MocConfig {
    #[serde(default = "default_moc_dir_name")]
    pub dir_name: String,
    #[serde(default = "default_min_notes_for_tag_moc")]
    pub min_notes_for_tag_moc: usize,
    #[serde(default = "default_top_tags")]
    pub top_tags: usize,
}

impl Default for MocConfig {
    fn default() -> Self {
        Self {
            dir_name: default_moc_dir_name(),
            min_notes_for_tag_moc: default_min_notes_for_tag_moc(),
            top_tags: default_top_tags(),
        }
    }
}

fn default_moc_dir_name() -> String {
    "_MOC".to_string()
}
fn default_min_notes_for_tag_moc() -> usize {
    5
}
fn default_top_tags() -> usize {
    15
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let oracle = &config.oracle;

    if oracle.max_content_length == 0 {
        anyhow::bail!("oracle.max_content_length must be > 0");
    }
    if oracle.max_concurrency == 0 {
        anyhow::bail!("oracle.max_concurrency must be >= 1");
    }
    if oracle.summary_max_chars == 0 {
        anyhow::bail!("oracle.summary_max_chars must be > 0");
    }

    match oracle.provider.as_str() {
        "disabled" | "anthropic" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown oracle provider: '{}'. Must be disabled, anthropic, or ollama.",
            other
        ),
    }

    if oracle.is_enabled() && oracle.model.is_none() {
        anyhow::bail!(
            "oracle.model must be specified when provider is '{}'",
            oracle.provider
        );
    }

    if config.moc.dir_name.is_empty() || config.moc.dir_name.contains(['/', '\\']) {
        anyhow::bail!("moc.dir_name must be a single directory name");
    }

    Ok(())
}
