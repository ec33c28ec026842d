//! `progress-watch` command line
//!
//! Follows one job from the terminal: prints a line whenever the pipeline
//! state changes and exits with a status reflecting how the job ended.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use crate::application::monitor::{MonitorCallbacks, ProgressMonitor};
use crate::application::session::SessionOutcome;
use crate::domain::pipeline::drawing_analysis_pipeline;
use crate::domain::stage_aggregator::StageStatus;
use crate::domain::view_model::{ConnectionState, ProgressViewModel};
use crate::infrastructure::config::{AppConfig, ConfigManager};
use crate::infrastructure::http_transport::HttpProgressTransport;
use crate::infrastructure::logging::{init_logging_with_config, log_system_info};

#[derive(Debug, Parser)]
#[command(name = "progress-watch")]
#[command(about = "Follow a drawing-analysis job over its progress stream", long_about = None)]
#[command(version)]
pub struct WatchArgs {
    /// Job id returned when the drawing was submitted
    #[arg(required_unless_present = "init_config")]
    pub job_id: Option<String>,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Stream endpoint template containing {job_id}
    #[arg(long)]
    pub url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print every state change as a JSON snapshot
    #[arg(long)]
    pub json: bool,

    /// Write the default configuration file and exit
    #[arg(long, conflicts_with = "job_id")]
    pub init_config: bool,
}

/// Exit status for a finished session
pub fn exit_code(outcome: Option<&SessionOutcome>) -> ExitCode {
    match outcome {
        Some(SessionOutcome::Completed(_)) => ExitCode::SUCCESS,
        Some(SessionOutcome::TimedOut) => ExitCode::from(2),
        Some(SessionOutcome::Disposed) => ExitCode::from(130),
        Some(SessionOutcome::Failed(_)) | None => ExitCode::FAILURE,
    }
}

/// Everything but the elapsed time; a change here is worth printing
fn change_key(snapshot: &ProgressViewModel) -> (u64, ConnectionState, Vec<StageStatus>) {
    (
        snapshot.event_count,
        snapshot.connection_state,
        snapshot.stages.iter().map(|stage| stage.status).collect(),
    )
}

const fn status_mark(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "·",
        StageStatus::Running => "▶",
        StageStatus::Completed => "✓",
        StageStatus::Error => "✗",
    }
}

/// One-line rendering of a snapshot
pub fn render_snapshot(snapshot: &ProgressViewModel) -> String {
    let stages = snapshot
        .stages
        .iter()
        .map(|stage| {
            let join = if stage.parallel { "∥" } else { " " };
            format!("{join}{} {}", status_mark(stage.status), stage.id)
        })
        .collect::<String>();

    let mut line = format!(
        "[{:>7.1}s] {}/{} stages |{} | current: {} | {:?}",
        snapshot.elapsed().as_secs_f64(),
        snapshot.completed_stage_count,
        snapshot.stages.len(),
        stages,
        snapshot.current_stage_id.as_deref().unwrap_or("-"),
        snapshot.connection_state,
    );
    if let Some(message) = &snapshot.error_message {
        line.push_str(&format!(" | {message}"));
    }
    line
}

fn load_config(args: &WatchArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(Some(path))
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            let manager = ConfigManager::new()?;
            if manager.config_path().exists() {
                manager.load_config()?
            } else {
                AppConfig::load(None)?
            }
        }
    };

    if let Some(url) = &args.url {
        config.monitor.stream_url_template.clone_from(url);
    }
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    config.validate().context("Invalid command line override")?;
    Ok(config)
}

/// Run the command and map the outcome to an exit status
pub async fn run(args: WatchArgs) -> Result<ExitCode> {
    if args.init_config {
        let manager = match &args.config {
            Some(path) => ConfigManager::with_path(path),
            None => ConfigManager::new()?,
        };
        manager.initialize_on_first_run().await?;
        println!("{}", manager.config_path().display());
        return Ok(ExitCode::SUCCESS);
    }

    let job_id = args.job_id.clone().context("job id is required")?;
    let config = load_config(&args)?;
    init_logging_with_config(&config.logging)?;
    log_system_info();

    let transport = Arc::new(HttpProgressTransport::from_config(&config.monitor)?);
    let callbacks = MonitorCallbacks::new(
        |data| info!(fields = data.len(), "Job finished"),
        |message| warn!(%message, "Job did not finish"),
    );
    let mut monitor = ProgressMonitor::start(
        job_id,
        Arc::new(drawing_analysis_pipeline()),
        transport,
        callbacks,
        config.monitor.settings(),
    );

    watch_until_finished(&monitor, args.json).await?;
    let outcome = monitor.wait().await;

    if let Some(SessionOutcome::Completed(data)) = &outcome {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    Ok(exit_code(outcome.as_ref()))
}

/// Print state changes until the session stops publishing
async fn watch_until_finished(monitor: &ProgressMonitor, json: bool) -> Result<()> {
    let mut snapshots = monitor.subscribe();
    let mut last_key = None;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        let key = change_key(&snapshot);
        if last_key.as_ref() != Some(&key) {
            if json {
                println!("{}", serde_json::to_string(&snapshot)?);
            } else {
                println!("{}", render_snapshot(&snapshot));
            }
            last_key = Some(key);
        }

        tokio::select! {
            result = &mut ctrl_c, if !interrupted => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("🛑 Interrupted, disposing monitor");
                interrupted = true;
                monitor.dispose();
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
        }
    }
}
