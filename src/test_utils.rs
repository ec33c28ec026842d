//! Test utilities
//!
//! Builders for progress records and pipelines, plus callbacks that record
//! what they were called with, so tests across the crate read the same way.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::application::monitor::MonitorCallbacks;
use crate::domain::events::{EventData, ProgressEvent, StepStatus};
use crate::domain::pipeline::{PipelineDefinition, Stage};

/// Progress record for `step` with an empty message
pub fn event(step: &str, status: StepStatus) -> ProgressEvent {
    ProgressEvent::new(step, status)
}

/// Progress record carrying `data`, which must be a JSON object
///
/// Non-object values are wrapped as `{"value": data}`.
pub fn event_with_data(step: &str, status: StepStatus, data: Value) -> ProgressEvent {
    ProgressEvent::new(step, status).with_data(object(data))
}

/// Turn a `json!` literal into event data
pub fn object(value: Value) -> EventData {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = EventData::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// `prepare → {left ∥ right} → finish`
pub fn parallel_pipeline() -> PipelineDefinition {
    PipelineDefinition::new(vec![
        Stage::new("prepare", "Prepare"),
        Stage::new("left", "Left branch"),
        Stage::new("right", "Right branch").parallel(),
        Stage::new("finish", "Finish"),
    ])
    .unwrap_or_else(|e| unreachable!("static test pipeline is valid: {e}"))
}

/// What a [`RecordingCallbacks`] saw
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CallbackLog {
    pub completions: Vec<EventData>,
    pub errors: Vec<String>,
}

impl CallbackLog {
    pub fn total(&self) -> usize {
        self.completions.len() + self.errors.len()
    }
}

/// Callbacks that record every invocation
#[derive(Debug, Default, Clone)]
pub struct RecordingCallbacks {
    log: Arc<Mutex<CallbackLog>>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor callbacks writing into this recorder
    pub fn callbacks(&self) -> MonitorCallbacks {
        let on_complete = Arc::clone(&self.log);
        let on_error = Arc::clone(&self.log);
        MonitorCallbacks::new(
            move |data| {
                on_complete
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .completions
                    .push(data);
            },
            move |message| {
                on_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .errors
                    .push(message);
            },
        )
    }

    pub fn log(&self) -> CallbackLog {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
