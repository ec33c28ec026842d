//! Stage status derivation
//!
//! Maps the static pipeline definition onto the event log. Everything here is a
//! pure function of `(stage, events)`; nothing is cached between calls, so the
//! same history always yields the same answer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::domain::events::{EventData, ProgressEvent, StepStatus};
use crate::domain::pipeline::{PipelineDefinition, Stage};

/// Derived status of a macro stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl StageStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Latest detail reported for a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StageDetails {
    pub message: String,
    #[ts(type = "Record<string, unknown> | null")]
    pub data: Option<EventData>,
}

fn attributable<'a>(
    stage: &'a Stage,
    events: &'a [ProgressEvent],
) -> impl DoubleEndedIterator<Item = &'a ProgressEvent> + 'a {
    events.iter().filter(move |event| stage.owns_step(&event.step_id))
}

/// Derive a stage's status from the full event history
///
/// First match wins:
/// 1. any attributable `error` event
/// 2. every leaf step has at least one `completed` event
/// 3. any leaf step is `started`/`running`
/// 4. any leaf step has any event at all
/// 5. otherwise pending
///
/// A single failing leaf poisons the whole stage, and a stage with parallel
/// leaves is only complete once every leaf reported completion on its own.
pub fn derive_stage_status(stage: &Stage, events: &[ProgressEvent]) -> StageStatus {
    let mut completed_leaves: HashSet<&str> = HashSet::new();
    let mut any_active = false;
    let mut any_event = false;

    for event in attributable(stage, events) {
        any_event = true;
        match event.status {
            StepStatus::Error => return StageStatus::Error,
            StepStatus::Completed => {
                completed_leaves.insert(event.step_id.as_str());
            }
            StepStatus::Started | StepStatus::Running => any_active = true,
        }
    }

    let all_leaves_completed = stage
        .leaf_steps()
        .iter()
        .all(|leaf| completed_leaves.contains(leaf.as_str()));

    if all_leaves_completed {
        StageStatus::Completed
    } else if any_active || any_event {
        StageStatus::Running
    } else {
        StageStatus::Pending
    }
}

/// Message and data of the most recently received attributable event
pub fn derive_stage_details(stage: &Stage, events: &[ProgressEvent]) -> Option<StageDetails> {
    attributable(stage, events).next_back().map(|event| StageDetails {
        message: event.message.clone(),
        data: event.data.clone(),
    })
}

/// Pick the one stage to highlight as in progress
///
/// Once the terminal stage has completed there is no current stage, even if an
/// earlier stage is still reporting a non-terminal status.
pub fn select_current_stage<'a>(
    pipeline: &'a PipelineDefinition,
    events: &[ProgressEvent],
) -> Option<&'a Stage> {
    if derive_stage_status(pipeline.terminal_stage(), events) == StageStatus::Completed {
        return None;
    }

    pipeline
        .stages()
        .iter()
        .find(|stage| derive_stage_status(stage, events) == StageStatus::Running)
}
