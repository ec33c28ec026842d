//! In-process transport backed by tokio channels
//!
//! Lets an embedding process push progress records for a job without going
//! through HTTP. Tests use it as the fake transport: it counts open handles so
//! a leaked subscription is visible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::domain::errors::TransportError;
use crate::domain::events::ProgressEvent;
use crate::domain::transport::{MessageStream, ProgressTransport};

/// Producer side of one job's stream
#[derive(Debug, Clone)]
pub struct ChannelFeed {
    job_id: String,
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelFeed {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Push a raw record; `false` once the subscriber is gone
    pub fn send_raw(&self, raw: impl Into<String>) -> bool {
        self.sender.send(raw.into()).is_ok()
    }

    pub fn send_event(&self, event: &ProgressEvent) -> bool {
        serde_json::to_string(event).is_ok_and(|raw| self.send_raw(raw))
    }

    pub fn send_done(&self) -> bool {
        self.send_raw(json!({ "status": "done" }).to_string())
    }

    pub fn send_timeout(&self) -> bool {
        self.send_raw(json!({ "status": "timeout" }).to_string())
    }

    /// Whether the subscriber dropped its end
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Decrements the open-handle counter when the stream is dropped
#[derive(Debug)]
struct HandleGuard(Arc<AtomicUsize>);

impl HandleGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Transport whose streams are fed through [`ChannelFeed`]s
#[derive(Debug, Default)]
pub struct ChannelTransport {
    pending: Mutex<HashMap<String, mpsc::UnboundedReceiver<String>>>,
    open_handles: Arc<AtomicUsize>,
    opened_total: AtomicUsize,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare a stream for `job_id` and return its producer side
    ///
    /// Registering the same job again replaces a stream nobody opened yet.
    pub fn register(&self, job_id: impl Into<String>) -> ChannelFeed {
        let job_id = job_id.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.clone(), receiver);
        ChannelFeed { job_id, sender }
    }

    /// Subscriptions currently holding a stream
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Subscriptions ever opened
    pub fn opened_total(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressTransport for ChannelTransport {
    async fn open(&self, job_id: &str) -> Result<MessageStream, TransportError> {
        let receiver = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id)
            .ok_or_else(|| TransportError::Unavailable(job_id.to_string()))?;

        self.opened_total.fetch_add(1, Ordering::SeqCst);
        let guard = HandleGuard::acquire(&self.open_handles);
        debug!(job_id, "Channel stream opened");

        let stream = UnboundedReceiverStream::new(receiver).map(move |raw| {
            let _held = &guard;
            Ok(raw)
        });
        Ok(stream.boxed())
    }

    fn endpoint(&self, job_id: &str) -> String {
        format!("channel://{job_id}")
    }
}
