//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional file, then `DRAWING_MONITOR__*` environment variables. The merged
//! result is validated before anyone sees it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::info;
use url::Url;

use crate::application::monitor::MonitorSettings;

/// Prefix of environment overrides, e.g. `DRAWING_MONITOR__MONITOR__TICK_INTERVAL_MS`
pub const ENV_PREFIX: &str = "DRAWING_MONITOR";

/// Separator between nested keys in environment overrides
pub const ENV_SEPARATOR: &str = "__";

const APP_DIR_NAME: &str = "drawing-progress-monitor";
const KNOWN_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

/// Stream endpoint and session timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Endpoint URL with a `{job_id}` placeholder
    pub stream_url_template: String,

    /// Elapsed-time refresh period in milliseconds
    pub tick_interval_ms: u64,

    /// Upper bound for establishing the stream connection
    pub connect_timeout_seconds: u64,

    pub user_agent: String,

    /// Largest SSE record accepted before the stream is treated as broken
    pub max_record_bytes: usize,
}

impl MonitorConfig {
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub const fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            tick_interval: self.tick_interval(),
        }
    }
}

/// Log file rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// One file per day, `monitor.log.YYYY-MM-DD`
    Daily,
    /// A single `monitor.log`
    Never,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs in the file output
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Log directory; the platform data directory when unset
    pub log_dir: Option<PathBuf>,

    pub rotation: LogRotation,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stream_url_template: defaults::STREAM_URL_TEMPLATE.to_string(),
            tick_interval_ms: defaults::TICK_INTERVAL_MS,
            connect_timeout_seconds: defaults::CONNECT_TIMEOUT_SECONDS,
            user_agent: defaults::user_agent(),
            max_record_bytes: defaults::MAX_RECORD_BYTES,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            rotation: LogRotation::Daily,
            max_files: defaults::MAX_LOG_FILES,
            auto_cleanup_logs: true,
            module_filters: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Self::environment())
    }

    /// Same as [`AppConfig::load`] with an explicit environment source
    pub fn load_with_env(
        path: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder.add_source(environment).build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides as read from the process
    pub fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor.validate()?;
        self.logging.validate()
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let template = &self.stream_url_template;
        if !template.contains(defaults::JOB_ID_PLACEHOLDER) {
            return Err(ConfigError::invalid(format!(
                "stream_url_template must contain {}",
                defaults::JOB_ID_PLACEHOLDER
            )));
        }
        let probe = template.replace(defaults::JOB_ID_PLACEHOLDER, "job");
        let url = Url::parse(&probe).map_err(|e| {
            ConfigError::invalid(format!("stream_url_template is not a valid URL: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(format!(
                "stream_url_template must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if !(defaults::MIN_TICK_INTERVAL_MS..=defaults::MAX_TICK_INTERVAL_MS)
            .contains(&self.tick_interval_ms)
        {
            return Err(ConfigError::invalid(format!(
                "tick_interval_ms must be between {} and {}",
                defaults::MIN_TICK_INTERVAL_MS,
                defaults::MAX_TICK_INTERVAL_MS
            )));
        }
        if self.connect_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "connect_timeout_seconds must be greater than 0",
            ));
        }
        if self.max_record_bytes == 0 {
            return Err(ConfigError::invalid("max_record_bytes must be greater than 0"));
        }
        Ok(())
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_known_level(&self.level) {
            return Err(ConfigError::invalid(format!(
                "unknown log level '{}'",
                self.level
            )));
        }
        if let Some((module, level)) = self
            .module_filters
            .iter()
            .find(|(_, level)| !is_known_level(level))
        {
            return Err(ConfigError::invalid(format!(
                "unknown log level '{level}' for module '{module}'"
            )));
        }
        if !self.console_output && !self.file_output {
            return Err(ConfigError::invalid("no logging output configured"));
        }
        Ok(())
    }
}

fn is_known_level(level: &str) -> bool {
    KNOWN_LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
}

/// Resolves and writes the user configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR_NAME);
        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(APP_DIR_NAME);
        Ok(data_dir)
    }

    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write the default file on first run, then load the layered configuration
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("🎉 First run detected - writing default configuration");
            self.save_config(&AppConfig::default()).await?;
        }
        self.load_config()
    }

    pub fn load_config(&self) -> Result<AppConfig> {
        let config = AppConfig::load(Some(&self.config_path))
            .with_context(|| format!("Failed to load {}", self.config_path.display()))?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        config.validate().context("Refusing to save invalid configuration")?;

        if let Some(dir) = self.config_path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)
                    .await
                    .context("Failed to create config directory")?;
                info!("✅ Created configuration directory: {:?}", dir);
            }
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;
        info!("💾 Configuration saved to: {:?}", self.config_path);
        Ok(())
    }
}

/// Default values
pub mod defaults {
    /// Placeholder replaced by the job id in the endpoint template
    pub const JOB_ID_PLACEHOLDER: &str = "{job_id}";

    pub const STREAM_URL_TEMPLATE: &str = "http://localhost:8000/api/progress/{job_id}";

    pub const TICK_INTERVAL_MS: u64 = 100;
    pub const MIN_TICK_INTERVAL_MS: u64 = 10;
    pub const MAX_TICK_INTERVAL_MS: u64 = 10_000;

    pub const CONNECT_TIMEOUT_SECONDS: u64 = 10;

    pub const MAX_RECORD_BYTES: usize = crate::infrastructure::sse_codec::DEFAULT_MAX_RECORD_BYTES;

    pub const LOG_LEVEL: &str = "info";
    pub const MAX_LOG_FILES: u32 = 7;

    pub fn user_agent() -> String {
        format!("drawing-progress-monitor/{}", env!("CARGO_PKG_VERSION"))
    }
}
