//! Progress monitor - the public entry point
//!
//! `ProgressMonitor::start` creates a brand-new job session and spawns it. The
//! caller reads snapshots (`snapshot`, `subscribe`) and tears the session down
//! with `dispose`, which is idempotent and also runs on drop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use crate::application::session::{JobSession, SessionOutcome};
use crate::domain::events::EventData;
use crate::domain::pipeline::PipelineDefinition;
use crate::domain::transport::ProgressTransport;
use crate::domain::view_model::ProgressViewModel;

/// Default ticker period
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

type CompleteFn = Box<dyn FnOnce(EventData) + Send + 'static>;
type ErrorFn = Box<dyn FnOnce(String) + Send + 'static>;

/// Terminal callbacks supplied by the caller
///
/// At most one of the two is ever invoked, and only once; the struct is
/// consumed by whichever fires.
pub struct MonitorCallbacks {
    on_complete: CompleteFn,
    on_error: ErrorFn,
}

impl MonitorCallbacks {
    pub fn new<C, E>(on_complete: C, on_error: E) -> Self
    where
        C: FnOnce(EventData) + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        Self {
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        }
    }

    /// Callbacks that ignore both outcomes
    pub fn noop() -> Self {
        Self::new(|_| {}, |_| {})
    }

    pub(crate) fn complete(self, data: EventData) {
        (self.on_complete)(data);
    }

    pub(crate) fn fail(self, message: String) {
        (self.on_error)(message);
    }
}

impl fmt::Debug for MonitorCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorCallbacks").finish_non_exhaustive()
    }
}

/// Runtime knobs of a monitor session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub tick_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Live progress monitor for one job
pub struct ProgressMonitor {
    job_id: String,
    session_id: Uuid,
    cancel: CancellationToken,
    snapshots: watch::Receiver<ProgressViewModel>,
    task: Option<JoinHandle<SessionOutcome>>,
    outcome: Option<SessionOutcome>,
}

impl ProgressMonitor {
    /// Start monitoring `job_id`
    ///
    /// Spawns the session on the current tokio runtime. Every call creates a new
    /// session with its own connection, even for a job id seen before.
    pub fn start(
        job_id: impl Into<String>,
        pipeline: Arc<PipelineDefinition>,
        transport: Arc<dyn ProgressTransport>,
        callbacks: MonitorCallbacks,
        settings: MonitorSettings,
    ) -> Self {
        let job_id = job_id.into();
        let (publisher, snapshots) =
            watch::channel(ProgressViewModel::initial(&job_id, &pipeline));

        let session = JobSession::new(
            job_id.clone(),
            pipeline,
            transport,
            callbacks,
            settings.tick_interval,
            publisher,
        );
        let session_id = session.session_id();
        let cancel = CancellationToken::new();

        let span = info_span!("progress_session", job_id = %job_id, session_id = %session_id);
        let task = tokio::spawn(session.run(cancel.clone()).instrument(span));

        Self {
            job_id,
            session_id,
            cancel,
            snapshots,
            task: Some(task),
            outcome: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> ProgressViewModel {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every republished snapshot
    pub fn subscribe(&self) -> watch::Receiver<ProgressViewModel> {
        self.snapshots.clone()
    }

    /// Tear the session down. Safe to call any number of times, in any phase.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the session task has fully released its resources
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the session to end and return how it ended
    ///
    /// Does not dispose; pair with `dispose` to stop a running session.
    pub async fn wait(&mut self) -> Option<SessionOutcome> {
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(outcome) => self.outcome = Some(outcome),
                Err(e) => error!(job_id = %self.job_id, error = %e, "Progress session task aborted"),
            }
        }
        self.outcome.clone()
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for ProgressMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressMonitor")
            .field("job_id", &self.job_id)
            .field("session_id", &self.session_id)
            .field("disposed", &self.cancel.is_cancelled())
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}
