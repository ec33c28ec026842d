//! Progress notifications received from the pipeline event stream
//!
//! Every record on the stream is either a step notification or one of the two
//! sentinels (`done`, `timeout`). Both share the `status` field on the wire, so
//! the split into [`StreamMessage`] variants happens here at the parse boundary
//! and nothing downstream ever compares status strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::errors::EventParseError;

/// Opaque key-value payload attached to a step notification
pub type EventData = Map<String, Value>;

const DONE_SENTINEL: &str = "done";
const TIMEOUT_SENTINEL: &str = "timeout";

/// Status reported by a leaf step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Running,
    Completed,
    Error,
}

impl StepStatus {
    /// `started` or `running`
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Started | Self::Running)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = EventParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(EventParseError::UnknownStatus(other.to_string())),
        }
    }
}

/// One immutable step notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Timestamp as sent by the backend. Informational only; arrival order wins.
    pub timestamp: String,
    #[serde(rename = "step")]
    pub step_id: String,
    pub status: StepStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
}

impl ProgressEvent {
    pub fn new(step_id: impl Into<String>, status: StepStatus) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            step_id: step_id.into(),
            status,
            message: String::new(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }
}

/// A decoded stream record
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Progress(ProgressEvent),
    /// The pipeline finished; no further records follow
    Done,
    /// The backend gave up tracking the job
    Timeout,
}

/// Wire shape shared by progress records and sentinels
#[derive(Debug, Deserialize)]
struct WireRecord {
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    step: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl StreamMessage {
    /// Decode one JSON record from the stream
    pub fn parse(raw: &str) -> Result<Self, EventParseError> {
        let record: WireRecord = serde_json::from_str(raw.trim())
            .map_err(|e| EventParseError::InvalidJson(e.to_string()))?;

        let status = record.status.ok_or(EventParseError::MissingStatus)?;
        match status.as_str() {
            DONE_SENTINEL => return Ok(Self::Done),
            TIMEOUT_SENTINEL => return Ok(Self::Timeout),
            _ => {}
        }

        let step_status = status.parse::<StepStatus>()?;
        let step_id = match record.step {
            Some(step) if !step.trim().is_empty() => step,
            _ => return Err(EventParseError::MissingStep { status }),
        };

        let data = match record.data {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => return Err(EventParseError::DataNotObject),
        };

        let timestamp = match record.timestamp {
            Some(Value::String(ts)) => ts,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Ok(Self::Progress(ProgressEvent {
            timestamp,
            step_id,
            status: step_status,
            message: record.message.unwrap_or_default(),
            data,
        }))
    }

    pub const fn is_sentinel(&self) -> bool {
        matches!(self, Self::Done | Self::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_progress_record() {
        let raw = json!({
            "timestamp": "2026-10-19T09:00:00Z",
            "step": "ocr",
            "status": "running",
            "message": "Reading dimensions",
            "data": { "pages": 3 }
        })
        .to_string();

        let StreamMessage::Progress(event) = StreamMessage::parse(&raw).unwrap() else {
            panic!("expected a progress record");
        };
        assert_eq!(event.step_id, "ocr");
        assert_eq!(event.status, StepStatus::Running);
        assert_eq!(event.message, "Reading dimensions");
        assert_eq!(event.data.unwrap()["pages"], json!(3));
    }

    #[test]
    fn test_parse_sentinels() {
        assert_eq!(StreamMessage::parse(r#"{"status":"done"}"#), Ok(StreamMessage::Done));
        assert_eq!(
            StreamMessage::parse(r#"{"status":"timeout","message":"gave up"}"#),
            Ok(StreamMessage::Timeout)
        );
        assert!(StreamMessage::Done.is_sentinel());
    }

    #[test]
    fn test_sentinel_wins_even_with_step() {
        let raw = r#"{"step":"complete","status":"done"}"#;
        assert_eq!(StreamMessage::parse(raw), Ok(StreamMessage::Done));
    }

    #[test]
    fn test_malformed_records_are_rejected() {
        assert!(matches!(
            StreamMessage::parse("not json"),
            Err(EventParseError::InvalidJson(_))
        ));
        assert!(matches!(
            StreamMessage::parse("[1,2,3]"),
            Err(EventParseError::InvalidJson(_))
        ));
        assert_eq!(
            StreamMessage::parse(r#"{"step":"ocr"}"#),
            Err(EventParseError::MissingStatus)
        );
        assert_eq!(
            StreamMessage::parse(r#"{"step":"ocr","status":"paused"}"#),
            Err(EventParseError::UnknownStatus("paused".into()))
        );
        assert_eq!(
            StreamMessage::parse(r#"{"status":"completed"}"#),
            Err(EventParseError::MissingStep { status: "completed".into() })
        );
        assert_eq!(
            StreamMessage::parse(r#"{"step":"ocr","status":"completed","data":[1]}"#),
            Err(EventParseError::DataNotObject)
        );
    }

    #[test]
    fn test_optional_fields_default() {
        let StreamMessage::Progress(event) =
            StreamMessage::parse(r#"{"step":"yolo","status":"started","timestamp":1760864400,"data":null}"#)
                .unwrap()
        else {
            panic!("expected a progress record");
        };
        assert_eq!(event.timestamp, "1760864400");
        assert!(event.message.is_empty());
        assert!(event.data.is_none());
    }

    #[test]
    fn test_wire_field_name_round_trip() {
        let event = ProgressEvent::new("edgnet", StepStatus::Completed).with_message("ok");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["step"], json!("edgnet"));
        assert_eq!(value["status"], json!("completed"));
        assert!(value.get("data").is_none());
    }
}
