//! Configuration management for Turtle services.
//!
//! All Turtle binaries share a single configuration file at
//! `~/.turtle/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Explicit config file values
//! 2. Environment variables
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `FINNHUB_API_KEY` → data.finnhub_api_key
//! - `TURTLE_DB_PATH` → database.path
//! - `TURTLE_LOG_LEVEL` → observability.log_level
//! - `TURTLE_UNIVERSE_FILE` → analysis.universe_file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".turtle"),
        |dirs| dirs.home_dir().join(".turtle"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: "json" for structured JSON, "pretty" for human-readable
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Database Configuration
// ============================================================================

/// SQLite database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    /// Default: `~/.turtle/turtle.db`
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    config_dir().join("turtle.db")
}

// ============================================================================
// Market Data Configuration
// ============================================================================

/// Market data provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Finnhub API key. Without it the Finnhub adapter is not registered
    /// and all requests go to the keyless fallback provider.
    #[serde(default)]
    pub finnhub_api_key: Option<String>,

    /// Finnhub rate limit (requests per minute). Free tier allows 60;
    /// the default leaves headroom for interactive quote lookups.
    #[serde(default = "default_finnhub_rpm")]
    pub finnhub_rate_limit_rpm: u32,

    /// Yahoo chart API rate limit (requests per minute, unofficial).
    #[serde(default = "default_yahoo_rpm")]
    pub yahoo_rate_limit_rpm: u32,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum retries per provider call on recoverable errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            finnhub_api_key: None,
            finnhub_rate_limit_rpm: default_finnhub_rpm(),
            yahoo_rate_limit_rpm: default_yahoo_rpm(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_finnhub_rpm() -> u32 {
    55
}

fn default_yahoo_rpm() -> u32 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

// ============================================================================
// Analysis Configuration
// ============================================================================

/// Daily market analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Nominal trailing window of the analysis, in trading days.
    #[serde(default = "default_required_days")]
    pub required_days: usize,

    /// Minimum bars a series must cover to be analyzed (≈67% of the
    /// nominal window). Below the floor the symbol is skipped for the day.
    #[serde(default = "default_min_required_days")]
    pub min_required_days: usize,

    /// Optional JSON file with the cached symbol universe (one array of
    /// uppercase tickers). When absent, a built-in list is used.
    #[serde(default)]
    pub universe_file: Option<PathBuf>,

    /// Days after which the cached universe file is considered stale.
    #[serde(default = "default_universe_refresh_days")]
    pub universe_refresh_days: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            required_days: default_required_days(),
            min_required_days: default_min_required_days(),
            universe_file: None,
            universe_refresh_days: default_universe_refresh_days(),
        }
    }
}

fn default_required_days() -> usize {
    252
}

fn default_min_required_days() -> usize {
    170
}

fn default_universe_refresh_days() -> i64 {
    30
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Unified configuration for Turtle services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Market data provider configuration
    #[serde(default)]
    pub data: DataConfig,

    /// Daily analysis configuration
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Load configuration from the default path, applying environment
    /// overrides for values the file does not set.
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Fill unset values from environment variables.
    fn apply_env(&mut self) {
        if self.data.finnhub_api_key.is_none() {
            if let Ok(key) = std::env::var("FINNHUB_API_KEY") {
                if !key.is_empty() {
                    self.data.finnhub_api_key = Some(key);
                }
            }
        }

        if let Ok(path) = std::env::var("TURTLE_DB_PATH") {
            if !path.is_empty() {
                self.database.path = PathBuf::from(path);
            }
        }

        if let Ok(level) = std::env::var("TURTLE_LOG_LEVEL") {
            if !level.is_empty() {
                self.observability.log_level = level;
            }
        }

        if self.analysis.universe_file.is_none() {
            if let Ok(path) = std::env::var("TURTLE_UNIVERSE_FILE") {
                if !path.is_empty() {
                    self.analysis.universe_file = Some(PathBuf::from(path));
                }
            }
        }
    }

    /// Persist the configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;

        let path = config_path();
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}

// ============================================================================
// Tests
// ============================================================================
