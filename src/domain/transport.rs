//! Seam between the monitor and whatever delivers stream records

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::errors::TransportError;

/// Raw record payloads of one open subscription, in arrival order
///
/// Dropping the stream releases the underlying connection.
pub type MessageStream = BoxStream<'static, Result<String, TransportError>>;

/// Source of one-directional progress streams
#[async_trait]
pub trait ProgressTransport: Send + Sync {
    /// Establish a new subscription for `job_id`
    ///
    /// Every call opens a fresh connection; a stream is never shared between
    /// sessions.
    async fn open(&self, job_id: &str) -> Result<MessageStream, TransportError>;

    /// Human-readable endpoint for logs
    fn endpoint(&self, job_id: &str) -> String;
}
