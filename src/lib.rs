//! Drawing Progress Monitor
//!
//! Follows a drawing-analysis job over the backend's progress stream and keeps
//! a continuously recomputed view of the pipeline for the dashboard: which
//! stage is running, which are done or failed, and how long it has taken.
//!
//! ```no_run
//! use std::sync::Arc;
//! use drawing_progress_monitor::prelude::*;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! let transport = Arc::new(HttpProgressTransport::from_config(&config.monitor)?);
//! let mut monitor = ProgressMonitor::start(
//!     "job-42",
//!     Arc::new(drawing_analysis_pipeline()),
//!     transport,
//!     MonitorCallbacks::new(|data| println!("done: {data:?}"), |msg| eprintln!("{msg}")),
//!     config.monitor.settings(),
//! );
//! let outcome = monitor.wait().await;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Items most callers need
pub mod prelude {
    pub use crate::application::{
        MonitorCallbacks, MonitorSettings, ProgressMonitor, SessionOutcome,
    };
    pub use crate::domain::{
        drawing_analysis_pipeline, ConnectionState, PipelineDefinition, ProgressEvent,
        ProgressTransport, ProgressViewModel, Stage, StageStatus, StepStatus,
    };
    pub use crate::infrastructure::{AppConfig, ChannelTransport, HttpProgressTransport};
}
