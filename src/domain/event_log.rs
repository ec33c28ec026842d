//! Append-only, arrival-ordered buffer of step notifications

use crate::domain::events::{EventData, ProgressEvent};

/// Every notification received for one job, in arrival order
///
/// Records are never mutated or removed after `append`. The position of a record
/// in the log is its arrival index, which is the only ordering the aggregator
/// trusts (backend timestamps may be skewed or duplicated).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    events: Vec<ProgressEvent>,
}

impl EventLog {
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append a record and return its arrival index
    pub fn append(&mut self, event: ProgressEvent) -> usize {
        self.events.push(event);
        self.events.len() - 1
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn as_slice(&self) -> &[ProgressEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProgressEvent> {
        self.events.iter()
    }

    pub fn last(&self) -> Option<&ProgressEvent> {
        self.events.last()
    }

    /// `data` of the most recent record, or an empty object
    pub fn last_known_data(&self) -> EventData {
        self.events
            .last()
            .and_then(|event| event.data.clone())
            .unwrap_or_default()
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a ProgressEvent;
    type IntoIter = std::slice::Iter<'a, ProgressEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::StepStatus;
    use serde_json::json;

    #[test]
    fn test_append_preserves_arrival_order() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        // Backend timestamps go backwards; arrival order must still be kept
        let first = log.append(ProgressEvent::new("ocr", StepStatus::Started).with_timestamp("10"));
        let second = log.append(ProgressEvent::new("ocr", StepStatus::Completed).with_timestamp("05"));

        assert_eq!((first, second), (0, 1));
        assert_eq!(log.len(), 2);
        assert_eq!(log.as_slice()[1].status, StepStatus::Completed);
        assert_eq!(log.last().map(|e| e.timestamp.as_str()), Some("05"));
    }

    #[test]
    fn test_last_known_data() {
        let mut log = EventLog::new();
        assert!(log.last_known_data().is_empty());

        let mut data = EventData::new();
        data.insert("boxes".into(), json!(12));
        log.append(ProgressEvent::new("yolo", StepStatus::Completed).with_data(data));
        assert_eq!(log.last_known_data()["boxes"], json!(12));

        // Most recent record has no payload: empty, not the older payload
        log.append(ProgressEvent::new("ocr", StepStatus::Started));
        assert!(log.last_known_data().is_empty());
    }
}
