//! Application layer - session orchestration
//!
//! Ties the stream client, the event log and the ticker together into a job
//! session and exposes it through `ProgressMonitor`.

pub mod monitor;
pub mod session;
pub mod stream_client;
pub mod ticker;

pub use monitor::{MonitorCallbacks, MonitorSettings, ProgressMonitor, DEFAULT_TICK_INTERVAL};
pub use session::{JobSession, SessionOutcome, CONNECTION_ERROR_MESSAGE, TIMEOUT_MESSAGE};
pub use stream_client::{ClientEvent, StreamClient};
pub use ticker::ElapsedTicker;
