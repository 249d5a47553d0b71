use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::filename::FilenameParser;

/// Default filename pattern: `<sender digits>_<receiver digits>.<image extension>`
pub const DEFAULT_FILENAME_PATTERN: &str = r"(\d+)_(\d+)\.(jpg|jpeg|png|gif|tiff|tif|bmp|webp)";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub filename: FilenameConfig,
    pub conserver: ConserverConfig,
}

/// Watch directory, state file and pipeline behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Directory that receives inbound fax images
    pub watch_directory: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default)]
    pub delete_after_send: bool,
    #[serde(default = "default_process_existing")]
    pub process_existing: bool,
    /// Quiet period a new file must see before it is offered to the pipeline
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Filename parsing and format filtering
#[derive(Debug, Clone, Deserialize)]
pub struct FilenameConfig {
    #[serde(default = "default_filename_pattern")]
    pub pattern: String,
    #[serde(default = "default_supported_formats")]
    pub supported_formats: Vec<String>,
}

impl Default for FilenameConfig {
    fn default() -> Self {
        Self {
            pattern: default_filename_pattern(),
            supported_formats: default_supported_formats(),
        }
    }
}

/// Remote conserver endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ConserverConfig {
    pub url: String,
    /// Name of the environment variable holding the API token
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,
    #[serde(default = "default_header_name")]
    pub header_name: String,
    /// Destination queues forwarded as the `ingress_lists` query parameter
    #[serde(default)]
    pub ingress_lists: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".fax_adapter_state.json")
}

fn default_process_existing() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_filename_pattern() -> String {
    DEFAULT_FILENAME_PATTERN.to_string()
}

fn default_supported_formats() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "tiff", "tif", "bmp", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_api_token_env() -> String {
    "CONSERVER_API_TOKEN".to_string()
}

fn default_header_name() -> String {
    "x-conserver-api-token".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in FAXVCON_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("FAXVCON_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))
    }

    /// Parse, normalize and validate a TOML document
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Trim list entries the way an operator would expect them to be read
    fn normalize(&mut self) {
        self.filename.supported_formats = self
            .filename
            .supported_formats
            .iter()
            .map(|f| f.trim().trim_start_matches('.').to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();

        let mut lists: Vec<String> = Vec::new();
        for item in &self.conserver.ingress_lists {
            let item = item.trim();
            if !item.is_empty() && !lists.iter().any(|l| l == item) {
                lists.push(item.to_string());
            }
        }
        self.conserver.ingress_lists = lists;
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let watch_dir = &self.adapter.watch_directory;
        if !watch_dir.exists() {
            anyhow::bail!(
                "watch_directory does not exist: {}. Set adapter.watch_directory in config.toml.",
                watch_dir.display()
            );
        }

        if !watch_dir.is_dir() {
            anyhow::bail!(
                "watch_directory must be a directory, not a file: {}",
                watch_dir.display()
            );
        }

        let url = url::Url::parse(&self.conserver.url)
            .with_context(|| format!("conserver.url is not a valid URL: {}", self.conserver.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("conserver.url must use http or https, got: {}", url.scheme());
        }

        reqwest::header::HeaderName::from_bytes(self.conserver.header_name.as_bytes())
            .with_context(|| {
                format!(
                    "conserver.header_name is not a valid header: {}",
                    self.conserver.header_name
                )
            })?;

        FilenameParser::new(&self.filename.pattern).context("filename.pattern is invalid")?;

        if self.filename.supported_formats.is_empty() {
            anyhow::bail!("filename.supported_formats must list at least one extension");
        }

        if self.adapter.poll_interval_ms == 0 {
            anyhow::bail!("adapter.poll_interval_ms must be greater than 0");
        }

        if self.adapter.queue_capacity == 0 {
            anyhow::bail!("adapter.queue_capacity must be greater than 0");
        }

        if self.conserver.timeout_secs == 0 {
            anyhow::bail!("conserver.timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Get the watched directory
    pub fn watch_directory(&self) -> &Path {
        &self.adapter.watch_directory
    }

    /// Get the state file path
    pub fn state_file(&self) -> &Path {
        &self.adapter.state_file
    }

    /// Settle window for the watcher debounce
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.adapter.poll_interval_ms)
    }

    /// Request timeout for the conserver client
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.conserver.timeout_secs)
    }

    /// API token read from the configured environment variable, if set and non-blank
    pub fn api_token(&self) -> Option<String> {
        std::env::var(&self.conserver.api_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}
