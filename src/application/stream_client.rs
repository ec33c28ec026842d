//! Stream client - one subscription for one job
//!
//! Owns the transport handle from `open` until `close`. Malformed records are
//! dropped here; sentinels and transport failures close the handle before they
//! are handed to the session.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::domain::errors::TransportError;
use crate::domain::events::{ProgressEvent, StreamMessage};
use crate::domain::transport::{MessageStream, ProgressTransport};
use crate::domain::view_model::ConnectionState;

/// What the session has to react to next
#[derive(Debug)]
pub enum ClientEvent {
    Progress(ProgressEvent),
    Done,
    Timeout,
    Failed(TransportError),
}

pub struct StreamClient {
    job_id: String,
    transport: Arc<dyn ProgressTransport>,
    stream: Option<MessageStream>,
    state: ConnectionState,
    dropped_messages: u64,
}

impl StreamClient {
    pub fn new(job_id: impl Into<String>, transport: Arc<dyn ProgressTransport>) -> Self {
        Self {
            job_id: job_id.into(),
            transport,
            stream: None,
            state: ConnectionState::Connecting,
            dropped_messages: 0,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Records dropped because they could not be parsed
    pub const fn dropped_messages(&self) -> u64 {
        self.dropped_messages
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint(&self.job_id)
    }

    /// Connect to the stream endpoint for this job
    pub async fn open(&mut self) -> Result<(), TransportError> {
        if self.state.is_terminal() {
            // A closed subscription is never reused
            return Err(TransportError::Unavailable(self.job_id.clone()));
        }

        match self.transport.open(&self.job_id).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Error;
                Err(e)
            }
        }
    }

    /// Wait for the next record the session has to act on
    ///
    /// Never completes while the client is closed.
    pub async fn next_message(&mut self) -> ClientEvent {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return std::future::pending().await;
            };

            let raw = match stream.next().await {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    self.close_with(ConnectionState::Error);
                    return ClientEvent::Failed(e);
                }
                None => {
                    self.close_with(ConnectionState::Error);
                    return ClientEvent::Failed(TransportError::Closed);
                }
            };

            match StreamMessage::parse(&raw) {
                Ok(StreamMessage::Progress(event)) => return ClientEvent::Progress(event),
                Ok(StreamMessage::Done) => {
                    self.close_with(ConnectionState::Completed);
                    return ClientEvent::Done;
                }
                Ok(StreamMessage::Timeout) => {
                    self.close_with(ConnectionState::TimedOut);
                    return ClientEvent::Timeout;
                }
                Err(e) => {
                    self.dropped_messages += 1;
                    warn!(job_id = %self.job_id, error = %e, "Dropping malformed progress record");
                    debug!(job_id = %self.job_id, raw = %raw, "Malformed record payload");
                }
            }
        }
    }

    /// Release the transport handle. Safe to call any number of times.
    ///
    /// Returns `true` only when this call released an open handle.
    pub fn close(&mut self) -> bool {
        self.close_with(ConnectionState::Closed)
    }

    fn close_with(&mut self, state: ConnectionState) -> bool {
        if !self.state.is_terminal() {
            self.state = state;
        }
        self.stream.take().is_some()
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("job_id", &self.job_id)
            .field("state", &self.state)
            .field("open", &self.stream.is_some())
            .field("dropped_messages", &self.dropped_messages)
            .finish_non_exhaustive()
    }
}
