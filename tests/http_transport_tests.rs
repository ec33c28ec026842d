//! HTTP SSE transport against a local TCP server
//!
//! The server writes a raw HTTP/1.1 response by hand, so these tests cover the
//! same bytes a real backend would put on the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use drawing_progress_monitor::application::{
    MonitorSettings, ProgressMonitor, SessionOutcome, CONNECTION_ERROR_MESSAGE,
};
use drawing_progress_monitor::domain::{
    drawing_analysis_pipeline, ProgressTransport, StageStatus, TransportError,
};
use drawing_progress_monitor::infrastructure::HttpProgressTransport;
use drawing_progress_monitor::test_utils::{object, RecordingCallbacks};

const SSE_HEAD: &str = "HTTP/1.1 200 OK\r\n\
                        Content-Type: text/event-stream\r\n\
                        Cache-Control: no-cache\r\n\
                        Connection: close\r\n\r\n";

const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\n\
                         Content-Length: 0\r\n\
                         Connection: close\r\n\r\n";

/// Accept one connection, answer with `head` and `chunks`, return the request head
async fn serve_once(head: &'static str, chunks: Vec<String>) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0_u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        socket.write_all(head.as_bytes()).await.unwrap();
        for chunk in chunks {
            socket.write_all(chunk.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });

    (addr, server)
}

fn transport_for(addr: SocketAddr) -> HttpProgressTransport {
    // Local server only; keep proxy settings of the environment out of it
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    HttpProgressTransport::with_client(
        client,
        format!("http://{addr}/api/progress/{{job_id}}"),
    )
}

fn record(value: &serde_json::Value) -> String {
    format!("data: {value}\n\n")
}

#[tokio::test]
async fn stream_yields_sse_payloads_and_sends_sse_headers() {
    let chunks = vec![
        ": connected\n\n".to_string(),
        "event: progress\nid: 1\ndata: {\"step\":\"yolo\",".to_string(),
        "\"status\":\"started\"}\n\n".to_string(),
        "data: {\"status\":\"done\"}\r\n\r\n".to_string(),
    ];
    let (addr, server) = serve_once(SSE_HEAD, chunks).await;
    let transport = transport_for(addr);

    let stream = transport.open("job-1").await.unwrap();
    let records: Vec<String> = stream.map(Result::unwrap).collect().await;
    assert_eq!(
        records,
        vec![
            r#"{"step":"yolo","status":"started"}"#.to_string(),
            r#"{"status":"done"}"#.to_string(),
        ]
    );

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/progress/job-1 HTTP/1.1"));
    assert!(request.to_ascii_lowercase().contains("accept: text/event-stream"));
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let (addr, server) = serve_once(NOT_FOUND, Vec::new()).await;
    let transport = transport_for(addr);

    let err = transport.open("missing").await.err().unwrap();
    assert!(matches!(err, TransportError::HttpStatus { status: 404 }));
    assert!(err.is_connect_failure());
    server.await.unwrap();
}

#[tokio::test]
async fn monitor_follows_a_job_over_http() {
    let chunks = vec![
        record(&json!({"timestamp": "t1", "step": "upload", "status": "completed", "message": "stored"})),
        record(&json!({"timestamp": "t2", "step": "yolo", "status": "running", "message": "detecting"})),
        record(&json!({
            "timestamp": "t3", "step": "yolo", "status": "completed",
            "message": "42 symbols", "data": {"symbols": 42}
        })),
        record(&json!({"status": "done"})),
    ];
    let (addr, _server) = serve_once(SSE_HEAD, chunks).await;
    let recorder = RecordingCallbacks::new();

    let mut monitor = ProgressMonitor::start(
        "job-http",
        Arc::new(drawing_analysis_pipeline()),
        Arc::new(transport_for(addr)),
        recorder.callbacks(),
        MonitorSettings::default(),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(10), monitor.wait())
        .await
        .unwrap();
    let expected = object(json!({"symbols": 42}));
    assert_eq!(outcome, Some(SessionOutcome::Completed(expected.clone())));
    assert_eq!(recorder.log().completions, vec![expected]);

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.event_count, 3);
    assert_eq!(snapshot.stage_status("upload"), Some(StageStatus::Completed));
    assert_eq!(snapshot.stage_status("yolo"), Some(StageStatus::Completed));
    assert_eq!(snapshot.stage("yolo").unwrap().details.as_ref().unwrap().message, "42 symbols");
}

#[tokio::test]
async fn server_closing_without_sentinel_fails_the_session() {
    let chunks = vec![record(&json!({"step": "upload", "status": "running", "message": ""}))];
    let (addr, _server) = serve_once(SSE_HEAD, chunks).await;
    let recorder = RecordingCallbacks::new();

    let mut monitor = ProgressMonitor::start(
        "job-cut",
        Arc::new(drawing_analysis_pipeline()),
        Arc::new(transport_for(addr)),
        recorder.callbacks(),
        MonitorSettings::default(),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(10), monitor.wait())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Some(SessionOutcome::Failed(CONNECTION_ERROR_MESSAGE.to_string()))
    );
    assert_eq!(recorder.log().errors, vec![CONNECTION_ERROR_MESSAGE.to_string()]);
    assert_eq!(monitor.snapshot().event_count, 1);
}

#[tokio::test]
async fn unreachable_backend_fails_the_session() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let recorder = RecordingCallbacks::new();

    let mut monitor = ProgressMonitor::start(
        "job-down",
        Arc::new(drawing_analysis_pipeline()),
        Arc::new(transport_for(addr)),
        recorder.callbacks(),
        MonitorSettings::default(),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(10), monitor.wait())
        .await
        .unwrap();
    assert!(matches!(outcome, Some(SessionOutcome::Failed(_))));
    assert_eq!(recorder.log().errors.len(), 1);
}
