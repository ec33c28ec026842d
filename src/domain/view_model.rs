//! Read-only projection rendered by the dashboard
//!
//! A snapshot is rebuilt from scratch on every append and every tick. There is
//! no incremental state to fall out of sync with the event log.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::domain::event_log::EventLog;
use crate::domain::pipeline::PipelineDefinition;
use crate::domain::stage_aggregator::{
    derive_stage_details, derive_stage_status, select_current_stage, StageDetails, StageStatus,
};

/// Lifecycle of the stream connection behind a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Done sentinel received
    Completed,
    /// Timeout sentinel received
    TimedOut,
    /// Transport failure
    Error,
    /// Disposed by the caller before a terminal signal
    Closed,
}

impl ConnectionState {
    /// No further events will be processed
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Error | Self::Closed)
    }

    pub const fn is_failure(self) -> bool {
        matches!(self, Self::TimedOut | Self::Error)
    }
}

/// One row of the stage list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StageView {
    pub id: String,
    pub label: String,
    pub parallel: bool,
    pub status: StageStatus,
    pub details: Option<StageDetails>,
}

/// Snapshot of a monitored job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProgressViewModel {
    pub job_id: String,
    pub stages: Vec<StageView>,
    pub current_stage_id: Option<String>,
    pub is_complete: bool,
    pub has_failed: bool,
    #[ts(type = "number")]
    pub elapsed_ms: u64,
    pub connection_state: ConnectionState,
    #[ts(type = "number")]
    pub event_count: u64,
    #[ts(type = "number")]
    pub completed_stage_count: u64,
    /// Terminal connection-level message, if the session ended in failure
    pub error_message: Option<String>,
}

/// Everything a snapshot is computed from
#[derive(Debug, Clone, Copy)]
pub struct ProjectionInput<'a> {
    pub job_id: &'a str,
    pub pipeline: &'a PipelineDefinition,
    pub events: &'a EventLog,
    pub elapsed: Duration,
    pub connection_state: ConnectionState,
    pub error_message: Option<&'a str>,
}

impl ProgressViewModel {
    /// Recompute the full snapshot
    pub fn project(input: ProjectionInput<'_>) -> Self {
        let events = input.events.as_slice();

        let stages: Vec<StageView> = input
            .pipeline
            .stages()
            .iter()
            .map(|stage| StageView {
                id: stage.id.clone(),
                label: stage.label.clone(),
                parallel: stage.parallel,
                status: derive_stage_status(stage, events),
                details: derive_stage_details(stage, events),
            })
            .collect();

        let terminal_completed = stages
            .iter()
            .any(|view| view.id == input.pipeline.terminal_stage_id() && view.status == StageStatus::Completed);
        let any_stage_failed = stages.iter().any(|view| view.status == StageStatus::Error);
        let completed_stage_count = stages
            .iter()
            .filter(|view| view.status == StageStatus::Completed)
            .count();

        let is_complete = terminal_completed || input.connection_state == ConnectionState::Completed;
        // A finished job highlights no stage, whichever signal finished it
        let current_stage_id = if is_complete {
            None
        } else {
            select_current_stage(input.pipeline, events).map(|stage| stage.id.clone())
        };

        Self {
            job_id: input.job_id.to_string(),
            current_stage_id,
            is_complete,
            has_failed: any_stage_failed || input.connection_state.is_failure(),
            elapsed_ms: u64::try_from(input.elapsed.as_millis()).unwrap_or(u64::MAX),
            connection_state: input.connection_state,
            event_count: input.events.len() as u64,
            completed_stage_count: completed_stage_count as u64,
            error_message: input.error_message.map(str::to_string),
            stages,
        }
    }

    /// Empty snapshot shown before the stream connects
    pub fn initial(job_id: &str, pipeline: &PipelineDefinition) -> Self {
        Self::project(ProjectionInput {
            job_id,
            pipeline,
            events: &EventLog::new(),
            elapsed: Duration::ZERO,
            connection_state: ConnectionState::Connecting,
            error_message: None,
        })
    }

    pub fn stage(&self, id: &str) -> Option<&StageView> {
        self.stages.iter().find(|view| view.id == id)
    }

    pub fn stage_status(&self, id: &str) -> Option<StageStatus> {
        self.stage(id).map(|view| view.status)
    }

    pub const fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Share of stages completed, 0.0 to 100.0
    #[allow(clippy::cast_precision_loss)]
    pub fn completion_percentage(&self) -> f64 {
        if self.stages.is_empty() {
            return 0.0;
        }
        self.completed_stage_count as f64 / self.stages.len() as f64 * 100.0
    }
}
