//! Line framing for the agent's stdout.
//!
//! The subprocess writes one JSON object per line, but reads hand us chunks
//! of arbitrary size. [`EventFramer`] buffers bytes until a newline arrives
//! and only then parses, so a record split across two reads comes out whole.

use serde_json::Value;

/// One unit of output from the framer.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A complete line that parsed as JSON.
    Record(Value),
    /// A complete line that did not parse. The stream continues.
    ParseError { line: String, message: String },
}

/// Accumulates raw bytes and yields complete JSON lines in arrival order.
#[derive(Debug, Default)]
pub struct EventFramer {
    buffer: Vec<u8>,
}

impl EventFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed.
    ///
    /// The trailing fragment after the last newline is kept for the next call.
    /// Buffering is byte-level, so a multi-byte UTF-8 character split across
    /// chunks is reassembled before decoding.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|b| *b == b'\n')
            .filter_map(Self::parse_line)
            .collect()
    }

    /// Flushes whatever is left once the stream has ended.
    ///
    /// A final line without a trailing newline is still a record.
    pub fn finish(&mut self) -> Vec<Frame> {
        let rest = std::mem::take(&mut self.buffer);
        Self::parse_line(&rest).into_iter().collect()
    }

    /// Number of bytes held back waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn parse_line(raw: &[u8]) -> Option<Frame> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        Some(match serde_json::from_str::<Value>(line) {
            Ok(value) => Frame::Record(value),
            Err(e) => {
                tracing::warn!("[Framer] Skipping malformed line: {}", e);
                Frame::ParseError {
                    line: line.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(frames: &[Frame]) -> Vec<Value> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Record(v) => Some(v.clone()),
                Frame::ParseError { .. } => None,
            })
            .collect()
    }

    #[test]
    fn record_split_across_reads_is_reassembled() {
        let mut framer = EventFramer::new();

        let first = framer.push(br#"{"type":"a"}
{"ty"#);
        let second = framer.push(br#"pe":"b"}
"#);

        assert_eq!(first, vec![Frame::Record(json!({"type": "a"}))]);
        assert_eq!(second, vec![Frame::Record(json!({"type": "b"}))]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn empty_lines_are_dropped() {
        let mut framer = EventFramer::new();
        let frames = framer.push(b"\n\r\n{\"type\":\"a\"}\r\n\n");
        assert_eq!(records(&frames), vec![json!({"type": "a"})]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn malformed_line_does_not_stop_the_stream() {
        let mut framer = EventFramer::new();
        let frames = framer.push(b"{\"type\":\"a\"}\nnot json\n{\"type\":\"b\"}\n");

        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[1], Frame::ParseError { line, .. } if line == "not json"));
        assert_eq!(records(&frames), vec![json!({"type": "a"}), json!({"type": "b"})]);
    }

    #[test]
    fn split_utf8_character_survives() {
        let mut framer = EventFramer::new();
        let bytes = "{\"text\":\"caf\u{e9}\"}\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(framer.push(&bytes[..split]).is_empty());
        let frames = framer.push(&bytes[split..]);
        assert_eq!(records(&frames), vec![json!({"text": "caf\u{e9}"})]);
    }

    #[test]
    fn finish_flushes_unterminated_tail() {
        let mut framer = EventFramer::new();
        assert!(framer.push(b"{\"type\":\"tail\"}").is_empty());
        assert_eq!(records(&framer.finish()), vec![json!({"type": "tail"})]);
        assert!(framer.finish().is_empty());
    }

    #[test]
    fn byte_at_a_time_preserves_order() {
        let mut framer = EventFramer::new();
        let input = b"{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n";
        let mut out = Vec::new();
        for b in input {
            out.extend(framer.push(std::slice::from_ref(b)));
        }
        assert_eq!(
            records(&out),
            vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]
        );
    }
}
