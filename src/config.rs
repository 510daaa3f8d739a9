//! Runtime configuration for the licita server.
//!
//! Configuration is resolved once at start-up, in layers:
//! defaults → `licita.toml` → environment → CLI flags.
//! The resolved [`Config`] is then shared behind an `Arc`; nothing else in
//! the crate reads process environment.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8090
//! dev_mode = false
//!
//! [storage]
//! data_dir = "./data"
//!
//! [services]
//! ocr_url = "http://localhost:8082"
//! ollama_url = "http://localhost:11434"
//! ollama_model = "llama3.1:8b"
//! docx_url = "http://localhost:8081"
//!
//! [timeouts]
//! extraction_secs = 900
//! structuring_secs = 600
//!
//! [retry]
//! max_attempts = 3
//! delay_secs = 5
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "licita.toml";

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a local front-end dev server
    #[serde(default)]
    pub dev_mode: bool,
    /// How long the stream adapter waits on the channel before re-checking
    /// the pipeline task
    #[serde(default = "default_poll_interval_ms")]
    pub stream_poll_interval_ms: u64,
    /// Largest accepted upload, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_upload_mb() -> usize {
    200
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
            stream_poll_interval_ms: default_poll_interval_ms(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

/// Where workspaces and the database live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/workspaces`
    #[serde(default)]
    pub workspaces_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/db/licita.db`
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            workspaces_dir: None,
            db_path: None,
        }
    }
}

impl StorageConfig {
    pub fn workspaces_dir(&self) -> PathBuf {
        self.workspaces_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("workspaces"))
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("db").join("licita.db"))
    }
}

/// Base URLs of the external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_ocr_url")]
    pub ocr_url: String,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    #[serde(default = "default_docx_url")]
    pub docx_url: String,
}

fn default_ocr_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_docx_url() -> String {
    "http://localhost:8081".to_string()
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            ocr_url: default_ocr_url(),
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            docx_url: default_docx_url(),
        }
    }
}

/// Per-call timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_extraction_secs")]
    pub extraction_secs: u64,
    #[serde(default = "default_identity_extraction_secs")]
    pub identity_extraction_secs: u64,
    #[serde(default = "default_structuring_secs")]
    pub structuring_secs: u64,
    #[serde(default = "default_identity_structuring_secs")]
    pub identity_structuring_secs: u64,
    #[serde(default = "default_document_llm_secs")]
    pub document_llm_secs: u64,
    #[serde(default = "default_render_secs")]
    pub render_secs: u64,
    #[serde(default = "default_chat_secs")]
    pub chat_secs: u64,
}

fn default_extraction_secs() -> u64 {
    900
}

fn default_identity_extraction_secs() -> u64 {
    600
}

fn default_structuring_secs() -> u64 {
    600
}

fn default_identity_structuring_secs() -> u64 {
    180
}

fn default_document_llm_secs() -> u64 {
    180
}

fn default_render_secs() -> u64 {
    30
}

fn default_chat_secs() -> u64 {
    120
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            extraction_secs: default_extraction_secs(),
            identity_extraction_secs: default_identity_extraction_secs(),
            structuring_secs: default_structuring_secs(),
            identity_structuring_secs: default_identity_structuring_secs(),
            document_llm_secs: default_document_llm_secs(),
            render_secs: default_render_secs(),
            chat_secs: default_chat_secs(),
        }
    }
}

/// Retry settings for the text-extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_secs() -> u64 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` still wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Directory for daily-rolling log files (stdout only when unset)
    #[serde(default)]
    pub file_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file_dir: None,
        }
    }
}

/// The complete licita.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse licita.toml")
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize licita.toml")
    }

    /// Apply `LICITA_*` overrides using the given lookup.
    ///
    /// `main` passes `std::env::var`; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("LICITA_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("LICITA_PORT is not a valid port: {}", port))?;
        }
        if let Some(dir) = lookup("LICITA_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("LICITA_OCR_URL") {
            self.services.ocr_url = url;
        }
        if let Some(url) = lookup("LICITA_OLLAMA_URL") {
            self.services.ollama_url = url;
        }
        if let Some(model) = lookup("LICITA_OLLAMA_MODEL") {
            self.services.ollama_model = model;
        }
        if let Some(url) = lookup("LICITA_DOCX_URL") {
            self.services.docx_url = url;
        }
        if let Some(level) = lookup("LICITA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LICITA_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    /// Apply CLI flag overrides (highest precedence).
    pub fn apply_cli(&mut self, port: Option<u16>, data_dir: Option<PathBuf>) {
        if let Some(port) = port {
            self.server.port = port;
        }
        if let Some(dir) = data_dir {
            self.storage.data_dir = dir;
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry.delay_secs)
    }

    pub fn stream_poll_interval(&self) -> Duration {
        Duration::from_millis(self.server.stream_poll_interval_ms)
    }
}
