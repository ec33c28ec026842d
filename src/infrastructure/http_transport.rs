//! HTTP Server-Sent-Events transport
//!
//! Opens `GET <endpoint>` with `Accept: text/event-stream` and turns the body
//! into record payloads through [`SseDecoder`]. No overall request timeout is
//! set because the stream is long-lived; only connecting is bounded.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info};
use url::Url;

use crate::domain::errors::TransportError;
use crate::domain::transport::{MessageStream, ProgressTransport};
use crate::infrastructure::config::MonitorConfig;
use crate::infrastructure::sse_codec::SseDecoder;

pub use crate::infrastructure::config::defaults::JOB_ID_PLACEHOLDER;

/// Build the stream URL for `job_id` from a template such as
/// `http://localhost:8000/api/progress/{job_id}`
///
/// The job id is percent-encoded as a single path segment.
pub fn stream_url(template: &str, job_id: &str) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError::InvalidEndpoint {
        url: template.to_string(),
        reason,
    };

    if !template.contains(JOB_ID_PLACEHOLDER) {
        return Err(invalid(format!("template must contain {JOB_ID_PLACEHOLDER}")));
    }
    if job_id.trim().is_empty() {
        return Err(invalid("job id is empty".to_string()));
    }

    // Let the url crate do the segment encoding, then splice it in
    let mut scratch = Url::parse("http://localhost/").map_err(|e| invalid(e.to_string()))?;
    scratch
        .path_segments_mut()
        .map_err(|()| invalid("cannot encode job id".to_string()))?
        .push(job_id);
    let encoded = scratch.path().trim_start_matches('/').to_string();

    let url = Url::parse(&template.replace(JOB_ID_PLACEHOLDER, &encoded))
        .map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

/// Transport reading progress from the backend's SSE endpoint
#[derive(Debug, Clone)]
pub struct HttpProgressTransport {
    client: Client,
    url_template: String,
    max_record_bytes: usize,
}

impl HttpProgressTransport {
    pub fn from_config(config: &MonitorConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .tcp_keepalive(Duration::from_secs(30))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(TransportError::ClientBuild)?;

        info!(
            template = %config.stream_url_template,
            connect_timeout_s = config.connect_timeout_seconds,
            "🌐 HTTP progress transport ready"
        );
        Ok(Self::with_client(client, config.stream_url_template.clone())
            .with_max_record_bytes(config.max_record_bytes))
    }

    pub fn with_client(client: Client, url_template: impl Into<String>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            max_record_bytes: crate::infrastructure::sse_codec::DEFAULT_MAX_RECORD_BYTES,
        }
    }

    #[must_use]
    pub const fn with_max_record_bytes(mut self, max_record_bytes: usize) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }

    pub fn url_template(&self) -> &str {
        &self.url_template
    }
}

#[async_trait]
impl ProgressTransport for HttpProgressTransport {
    async fn open(&self, job_id: &str) -> Result<MessageStream, TransportError> {
        let url = stream_url(&self.url_template, job_id)?;
        debug!(%url, "Connecting to progress stream");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(TransportError::Connect)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let frames = FramedRead::new(
            StreamReader::new(body),
            SseDecoder::with_max_record_bytes(self.max_record_bytes),
        );
        Ok(frames.boxed())
    }

    fn endpoint(&self, job_id: &str) -> String {
        stream_url(&self.url_template, job_id)
            .map_or_else(|_| self.url_template.clone(), |url| url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url_substitutes_job_id() {
        let url = stream_url("http://localhost:8000/api/progress/{job_id}", "job-42").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/progress/job-42");

        let nested = stream_url("https://api.example.com/jobs/{job_id}/events?v=2", "a1").unwrap();
        assert_eq!(nested.as_str(), "https://api.example.com/jobs/a1/events?v=2");
    }

    #[test]
    fn test_stream_url_encodes_job_id_as_one_segment() {
        let url = stream_url("http://localhost/api/progress/{job_id}", "a b/c").unwrap();
        assert_eq!(url.path(), "/api/progress/a%20b%2Fc");
    }

    #[test]
    fn test_stream_url_rejects_bad_templates() {
        assert!(matches!(
            stream_url("http://localhost/api/progress", "job"),
            Err(TransportError::InvalidEndpoint { .. })
        ));
        assert!(stream_url("ftp://localhost/{job_id}", "job").is_err());
        assert!(stream_url("not a url/{job_id}", "job").is_err());
        assert!(stream_url("http://localhost/{job_id}", "  ").is_err());
    }

    #[test]
    fn test_endpoint_for_logs() {
        let transport =
            HttpProgressTransport::with_client(Client::new(), "http://localhost:8000/progress/{job_id}");
        assert_eq!(transport.endpoint("j1"), "http://localhost:8000/progress/j1");
        assert_eq!(transport.url_template(), "http://localhost:8000/progress/{job_id}");
    }
}
