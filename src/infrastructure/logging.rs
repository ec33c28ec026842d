//! Logging system configuration and initialization
//!
//! - Console output and an optional non-blocking file output
//! - Level from configuration, overridable with `RUST_LOG`
//! - Optional JSON formatting for the file output
//! - Startup cleanup of old log files

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use tracing::{info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

pub use crate::infrastructure::config::{LogRotation, LoggingConfig};
use crate::infrastructure::config::ConfigManager;

/// Base name of the log files
pub const LOG_FILE_NAME: &str = "monitor.log";

// Keeps the file writer alive for the whole process
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Dependency targets that only show up at TRACE
const QUIET_TARGETS: [(&str, &str); 5] = [
    ("reqwest", "info"),
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("h2", "warn"),
    ("tokio", "info"),
];

/// Directory the log files go to
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.log_dir {
        return dir.clone();
    }
    ConfigManager::get_app_data_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| std::env::temp_dir().join("drawing-progress-monitor").join("logs"))
}

/// Build the filter for `config`, `RUST_LOG` wins when set
///
/// ```bash
/// # Show detailed HTTP logs
/// RUST_LOG="debug,reqwest=debug,hyper=debug" progress-watch job-1
/// ```
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = config.level.to_ascii_lowercase();
    let mut filter = EnvFilter::try_new(&level)
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    if level != "trace" {
        for (target, target_level) in QUIET_TARGETS {
            filter = filter.add_directive(format!("{target}={target_level}").parse()?);
        }
    }
    filter = filter.add_directive(format!("drawing_progress_monitor={level}").parse()?);

    let mut modules: Vec<_> = config.module_filters.iter().collect();
    modules.sort();
    for (module, module_level) in modules {
        filter = filter.add_directive(
            format!("{module}={module_level}")
                .parse()
                .with_context(|| format!("Invalid filter for module '{module}'"))?,
        );
    }
    Ok(filter)
}

/// Non-blocking writer over the log file in `log_dir`
///
/// Records are flushed to disk when the guard is dropped.
pub fn open_log_writer(config: &LoggingConfig, log_dir: &Path) -> (NonBlocking, WorkerGuard) {
    let appender = match config.rotation {
        LogRotation::Daily => rolling::daily(log_dir, LOG_FILE_NAME),
        LogRotation::Never => rolling::never(log_dir, LOG_FILE_NAME),
    };
    non_blocking(appender)
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with custom configuration
///
/// Fails if a global subscriber is already installed.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(config)?;

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    });

    let log_dir = get_log_directory(config);
    let file_layer = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        if config.auto_cleanup_logs {
            cleanup_old_logs(&log_dir, config.max_files)?;
        }

        let (writer, guard) = open_log_writer(config, &log_dir);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard storage is poisoned"))?
            .push(guard);

        let layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    if console_layer.is_none() && file_layer.is_none() {
        return Err(anyhow!("No logging output configured"));
    }

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    info!(
        level = %config.level,
        json = config.json_format,
        console = config.console_output,
        file = config.file_output,
        "📝 Logging system initialized"
    );
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
    }
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Drawing Progress Monitor ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
}

/// Remove the oldest `.log*` files so that at most `max_files` remain
///
/// Returns how many files were removed.
pub fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_NAME));
        if !path.is_file() || !is_log {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            log_files.push((path, modified));
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let keep = max_files as usize;
    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    if removed > 0 {
        info!("🧹 Removed {} old log files (keeping {})", removed, keep);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_log_directory_prefers_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            log_dir: Some(dir.path().to_path_buf()),
            ..LoggingConfig::default()
        };
        assert_eq!(get_log_directory(&config), dir.path());

        let default_dir = get_log_directory(&LoggingConfig::default());
        assert!(default_dir.ends_with("logs"));
    }

    #[test]
    fn test_env_filter_accepts_module_filters() {
        let mut config = LoggingConfig {
            level: "debug".to_string(),
            ..LoggingConfig::default()
        };
        config
            .module_filters
            .insert("drawing_progress_monitor::infrastructure".to_string(), "trace".to_string());
        assert!(build_env_filter(&config).is_ok());
    }

    #[test]
    fn test_cleanup_keeps_newest_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = SystemTime::now() - Duration::from_secs(3600);
        for day in 1..=4_u64 {
            let path = dir.path().join(format!("{LOG_FILE_NAME}.2026-01-0{day}"));
            let file = std::fs::File::create(&path).unwrap();
            file.set_modified(base + Duration::from_secs(day * 60)).unwrap();
        }
        std::fs::write(dir.path().join("unrelated.txt"), "keep").unwrap();

        let removed = cleanup_old_logs(dir.path(), 2).unwrap();
        assert_eq!(removed, 2);

        let mut remaining: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            vec![
                format!("{LOG_FILE_NAME}.2026-01-03"),
                format!("{LOG_FILE_NAME}.2026-01-04"),
                "unrelated.txt".to_string(),
            ]
        );
    }

    #[test]
    fn test_log_writer_flushes_on_guard_drop() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            rotation: LogRotation::Never,
            ..LoggingConfig::default()
        };

        let (mut writer, guard) = open_log_writer(&config, dir.path());
        writer.write_all(b"session started\n").unwrap();
        drop(writer);
        drop(guard);

        let written = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        assert_eq!(written, "session started\n");
    }

    #[test]
    fn test_cleanup_on_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(&dir.path().join("none"), 3).unwrap(), 0);
    }
}
