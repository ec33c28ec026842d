//! Server-Sent Events frame decoder
//!
//! Splits a `text/event-stream` body into records and yields the joined `data:`
//! payload of each record. Comment lines and the `event`, `id` and `retry`
//! fields carry nothing the monitor needs and are skipped.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::domain::errors::TransportError;

/// Upper bound for a single record, guards against a server that never sends a blank line
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub struct SseDecoder {
    data: Vec<String>,
    pending_bytes: usize,
    max_record_bytes: usize,
}

impl SseDecoder {
    pub const fn new() -> Self {
        Self::with_max_record_bytes(DEFAULT_MAX_RECORD_BYTES)
    }

    pub const fn with_max_record_bytes(max_record_bytes: usize) -> Self {
        Self {
            data: Vec::new(),
            pending_bytes: 0,
            max_record_bytes,
        }
    }

    /// Finish the current record; `None` if it carried no data lines
    fn dispatch(&mut self) -> Option<String> {
        self.pending_bytes = 0;
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        Some(payload)
    }

    fn field(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if name == "data" {
            self.data.push(value.to_string());
        }
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SseDecoder {
    type Item = String;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                if self.pending_bytes + src.len() > self.max_record_bytes {
                    return Err(TransportError::RecordTooLarge {
                        limit: self.max_record_bytes,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(newline + 1);
            self.pending_bytes += line.len();
            if self.pending_bytes > self.max_record_bytes {
                return Err(TransportError::RecordTooLarge {
                    limit: self.max_record_bytes,
                });
            }

            let mut line = &line[..newline];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line);

            if line.is_empty() {
                if let Some(payload) = self.dispatch() {
                    return Ok(Some(payload));
                }
            } else {
                self.field(&line);
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload) = self.decode(src)? {
            return Ok(Some(payload));
        }
        // Unterminated trailing line, then an unterminated record
        if src.has_remaining() {
            let rest = src.split_to(src.len());
            let line = String::from_utf8_lossy(&rest);
            self.field(line.trim_end_matches('\r'));
        }
        Ok(self.dispatch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> Vec<String> {
        let mut decoder = SseDecoder::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(payload) = decoder.decode(&mut buf).unwrap() {
            out.push(payload);
        }
        if let Some(payload) = decoder.decode_eof(&mut buf).unwrap() {
            out.push(payload);
        }
        out
    }

    #[test]
    fn test_single_record() {
        let out = decode_all("data: {\"status\":\"done\"}\n\n");
        assert_eq!(out, vec![r#"{"status":"done"}"#.to_string()]);
    }

    #[test]
    fn test_multiline_data_and_ignored_fields() {
        let input = ": keepalive 1\n\
                     retry: 3000\n\
                     id: 7\n\
                     event: progress\n\
                     data: {\"step\":\"ocr\",\n\
                     data: \"status\":\"running\"}\n\
                     \n";
        let out = decode_all(input);
        assert_eq!(out, vec!["{\"step\":\"ocr\",\n\"status\":\"running\"}".to_string()]);
    }

    #[test]
    fn test_crlf_and_comment_only_records() {
        let out = decode_all(": ping\r\n\r\ndata:a\r\n\r\ndata: b\r\n\r\n");
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_partial_frames_across_reads() {
        let mut decoder = SseDecoder::new();
        let mut buf = BytesMut::from("data: {\"step\":");
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\"yolo\"}\n");
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\ndata: next\n\n");
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some("{\"step\":\"yolo\"}".to_string()));
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some("next".to_string()));
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_unterminated_record_flushed_at_eof() {
        let out = decode_all("data: tail");
        assert_eq!(out, vec!["tail".to_string()]);
    }

    #[test]
    fn test_oversized_record_is_rejected() {
        let mut decoder = SseDecoder::with_max_record_bytes(16);
        let mut buf = BytesMut::from("data: 0123456789abcdefghij");
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(TransportError::RecordTooLarge { limit: 16 })
        ));
    }
}
