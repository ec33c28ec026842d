//! Domain module - pipeline definition, progress records and derived state
//!
//! Everything in here is synchronous and free of I/O. The stage aggregator and
//! the view model are pure functions of the event log.

pub mod errors;
pub mod event_log;
pub mod events;
pub mod pipeline;
pub mod stage_aggregator;
pub mod transport;
pub mod view_model;

// Re-export commonly used items for convenience
pub use errors::{EventParseError, PipelineError, TransportError};
pub use event_log::EventLog;
pub use events::{EventData, ProgressEvent, StepStatus, StreamMessage};
pub use pipeline::{drawing_analysis_pipeline, PipelineDefinition, Stage};
pub use stage_aggregator::{
    derive_stage_details, derive_stage_status, select_current_stage, StageDetails, StageStatus,
};
pub use transport::{MessageStream, ProgressTransport};
pub use view_model::{ConnectionState, ProgressViewModel, ProjectionInput, StageView};
