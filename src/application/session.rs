//! Job session - the root object of one monitor lifetime
//!
//! A session owns the stream client, the event log and the ticker for exactly
//! one job. It runs as a single task: the receive branch, the tick branch and
//! cancellation are arms of one `select!`, so the event log has a single owner
//! and needs no locking.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::monitor::MonitorCallbacks;
use crate::application::stream_client::{ClientEvent, StreamClient};
use crate::application::ticker::ElapsedTicker;
use crate::domain::event_log::EventLog;
use crate::domain::events::EventData;
use crate::domain::pipeline::PipelineDefinition;
use crate::domain::transport::ProgressTransport;
use crate::domain::view_model::{ConnectionState, ProgressViewModel, ProjectionInput};

/// Message handed to `on_error` when the backend gives up on the job
pub const TIMEOUT_MESSAGE: &str = "progress tracking timed out";
/// Message handed to `on_error` on any transport failure
pub const CONNECTION_ERROR_MESSAGE: &str = "progress connection error";

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Done sentinel; carries the data passed to `on_complete`
    Completed(EventData),
    TimedOut,
    Failed(String),
    /// Torn down by the caller before a terminal signal
    Disposed,
}

enum Wake {
    Disposed,
    Tick,
    Message(ClientEvent),
}

pub struct JobSession {
    job_id: String,
    session_id: Uuid,
    pipeline: Arc<PipelineDefinition>,
    started_at: DateTime<Utc>,
    events: EventLog,
    client: StreamClient,
    ticker: ElapsedTicker,
    callbacks: Option<MonitorCallbacks>,
    error_message: Option<String>,
    publisher: watch::Sender<ProgressViewModel>,
}

impl JobSession {
    pub fn new(
        job_id: String,
        pipeline: Arc<PipelineDefinition>,
        transport: Arc<dyn ProgressTransport>,
        callbacks: MonitorCallbacks,
        tick_interval: Duration,
        publisher: watch::Sender<ProgressViewModel>,
    ) -> Self {
        Self {
            client: StreamClient::new(job_id.clone(), transport),
            job_id,
            session_id: Uuid::new_v4(),
            pipeline,
            started_at: Utc::now(),
            events: EventLog::new(),
            ticker: ElapsedTicker::start(tick_interval),
            callbacks: Some(callbacks),
            error_message: None,
            publisher,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub const fn events(&self) -> &EventLog {
        &self.events
    }

    pub const fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Recompute the snapshot from the current inputs
    pub fn project(&self) -> ProgressViewModel {
        ProgressViewModel::project(ProjectionInput {
            job_id: &self.job_id,
            pipeline: &self.pipeline,
            events: &self.events,
            elapsed: self.ticker.elapsed(),
            connection_state: self.client.state(),
            error_message: self.error_message.as_deref(),
        })
    }

    fn publish(&self) {
        // Replaces the whole snapshot; readers never see a partial update
        self.publisher.send_replace(self.project());
    }

    /// Drive the session until a terminal signal or cancellation
    pub async fn run(mut self, cancel: CancellationToken) -> SessionOutcome {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            endpoint = %self.client.endpoint(),
            "🔌 Opening progress stream"
        );
        self.publish();

        let opened = {
            // Elapsed time keeps moving while the connection is being made
            let open = self.client.open();
            tokio::pin!(open);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break None,
                    result = &mut open => break Some(result),
                    _ = self.ticker.tick() => {
                        self.publisher.send_replace(ProgressViewModel::project(ProjectionInput {
                            job_id: &self.job_id,
                            pipeline: &self.pipeline,
                            events: &self.events,
                            elapsed: self.ticker.elapsed(),
                            connection_state: ConnectionState::Connecting,
                            error_message: None,
                        }));
                    }
                }
            }
        };

        let outcome = match opened {
            None => SessionOutcome::Disposed,
            Some(Err(e)) => {
                error!(job_id = %self.job_id, error = %e, "❌ Failed to open progress stream");
                SessionOutcome::Failed(self.fail(CONNECTION_ERROR_MESSAGE))
            }
            Some(Ok(())) => {
                info!(job_id = %self.job_id, "✅ Progress stream connected");
                self.publish();
                self.receive_loop(&cancel).await
            }
        };

        self.teardown();
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            events = self.events.len(),
            dropped = self.client.dropped_messages(),
            elapsed_ms = u64::try_from(self.ticker.elapsed().as_millis()).unwrap_or(u64::MAX),
            outcome = ?outcome,
            "Progress session ended"
        );
        outcome
    }

    async fn receive_loop(&mut self, cancel: &CancellationToken) -> SessionOutcome {
        loop {
            let wake = tokio::select! {
                biased;
                () = cancel.cancelled() => Wake::Disposed,
                message = self.client.next_message() => Wake::Message(message),
                _ = self.ticker.tick() => Wake::Tick,
            };

            match wake {
                Wake::Disposed => return SessionOutcome::Disposed,
                Wake::Tick => self.publish(),
                Wake::Message(ClientEvent::Progress(event)) => {
                    debug!(
                        job_id = %self.job_id,
                        step = %event.step_id,
                        status = %event.status,
                        message = %event.message,
                        "Progress event"
                    );
                    self.events.append(event);
                    self.publish();
                }
                Wake::Message(ClientEvent::Done) => {
                    let data = self.events.last_known_data();
                    info!(job_id = %self.job_id, events = self.events.len(), "🎉 Pipeline finished");
                    if let Some(callbacks) = self.callbacks.take() {
                        callbacks.complete(data.clone());
                    }
                    return SessionOutcome::Completed(data);
                }
                Wake::Message(ClientEvent::Timeout) => {
                    warn!(job_id = %self.job_id, "⏱️ Backend stopped tracking the job");
                    self.fail(TIMEOUT_MESSAGE);
                    return SessionOutcome::TimedOut;
                }
                Wake::Message(ClientEvent::Failed(e)) => {
                    error!(job_id = %self.job_id, error = %e, "❌ Progress stream failed");
                    return SessionOutcome::Failed(self.fail(CONNECTION_ERROR_MESSAGE));
                }
            }
        }
    }

    /// Record the terminal error and report it to the caller once
    fn fail(&mut self, message: &str) -> String {
        self.error_message = Some(message.to_string());
        if let Some(callbacks) = self.callbacks.take() {
            callbacks.fail(message.to_string());
        }
        message.to_string()
    }

    /// Release everything the session holds
    ///
    /// Message processing has already stopped when this runs; the ticker is
    /// cleared before the transport handle is dropped. Both steps are no-ops
    /// when repeated.
    fn teardown(&mut self) {
        let ticker_stopped = self.ticker.cancel();
        let handle_released = self.client.close();
        // Callbacks are never invoked after teardown
        self.callbacks = None;
        debug!(
            job_id = %self.job_id,
            ticker_stopped,
            handle_released,
            state = ?self.client.state(),
            "Session resources released"
        );
        self.publish();
    }
}

impl std::fmt::Debug for JobSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSession")
            .field("job_id", &self.job_id)
            .field("session_id", &self.session_id)
            .field("started_at", &self.started_at)
            .field("events", &self.events.len())
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
