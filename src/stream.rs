//! SSE parsing and streamed answer assembly.
//!
//! The streaming query endpoint replies with `text/event-stream`. Each frame
//! carries a JSON payload of the shape `{ "type": "answer"|"docs", "content" }`;
//! the stream is terminated by an `end` event or an `error` event carrying a
//! `{ "detail": [{ "msg" }] }` payload. Answer chunks accumulate in arrival
//! order; docs batches append in arrival order. There is no reconnect or
//! resume — a closed stream stays closed.
//!
//! [`SseParser`] is a plain incremental frame parser: feed it whatever byte
//! chunks the transport produces and it yields complete frames. Frame
//! boundaries are blank lines; `event:` and `data:` fields are honored,
//! comment lines (leading `:`) and `id:`/`retry:` fields are ignored, and
//! CRLF line endings are tolerated.

use serde_json::Value;

use crate::models::SourceDoc;

/// One complete server-sent event frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name; `"message"` when the frame carried no `event:` field.
    pub event: String,
    /// Data payload; multi-line `data:` fields joined with `\n`.
    pub data: String,
}

/// Incremental `text/event-stream` parser.
#[derive(Default)]
pub struct SseParser {
    buf: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every frame completed by it.
    ///
    /// Bytes that do not yet form a complete frame (including partial UTF-8
    /// sequences split across chunks) stay buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        // SSE line endings are LF, CR, or CRLF; dropping CRs up front makes
        // every boundary a plain LF.
        self.buf.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut frames = Vec::new();
        while let Some(pos) = find_frame_boundary(&self.buf) {
            let raw: Vec<u8> = self.buf.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&raw[..pos]);
            if let Some(frame) = parse_frame(&text) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn find_frame_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut event = String::new();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => event = value.to_string(),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if event.is_empty() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event: if event.is_empty() {
            "message".to_string()
        } else {
            event
        },
        data: data_lines.join("\n"),
    })
}

/// One decoded event from the answer stream.
#[derive(Debug, Clone)]
pub enum AnswerEvent {
    /// A fragment of the answer text, to be appended in arrival order.
    Answer(String),
    /// A batch of retrieved source documents.
    Docs(Vec<SourceDoc>),
    /// Normal termination.
    End,
    /// Abnormal termination with a best-effort message.
    Error(String),
}

/// Decode a frame into an [`AnswerEvent`].
///
/// Termination can be spelled two ways by backends of this shape — an
/// `event: end` frame, or a `{"type": "end"}` data payload — and both are
/// accepted. Frames that decode to nothing meaningful yield `None`.
pub fn decode_event(frame: &SseFrame) -> Option<AnswerEvent> {
    match frame.event.as_str() {
        "end" => return Some(AnswerEvent::End),
        "error" => return Some(AnswerEvent::Error(error_detail(&frame.data))),
        _ => {}
    }

    let value: Value = serde_json::from_str(&frame.data).ok()?;
    match value.get("type").and_then(|t| t.as_str()) {
        Some("answer") => {
            let content = value
                .get("content")
                .and_then(|c| c.as_str())
                .unwrap_or_default();
            Some(AnswerEvent::Answer(content.to_string()))
        }
        Some("docs") => {
            let docs = value
                .get("content")
                .cloned()
                .and_then(|c| serde_json::from_value::<Vec<SourceDoc>>(c).ok())
                .unwrap_or_default();
            Some(AnswerEvent::Docs(docs))
        }
        Some("end") => Some(AnswerEvent::End),
        Some("error") => Some(AnswerEvent::Error(error_detail(&frame.data))),
        _ => None,
    }
}

/// Pull a human message out of an error payload: `detail[0].msg`, then
/// `detail` as a string, then the raw payload.
fn error_detail(data: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(data) {
        if let Some(msg) = value.pointer("/detail/0/msg").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("detail").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }
    if data.trim().is_empty() {
        "stream error".to_string()
    } else {
        data.trim().to_string()
    }
}

/// Assembles a streamed answer from decoded events.
#[derive(Debug, Default)]
pub struct AnswerAccumulator {
    pub answer: String,
    pub docs: Vec<SourceDoc>,
    pub error: Option<String>,
    closed: bool,
}

impl AnswerAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns `false` once the stream is closed; events
    /// arriving after close are dropped.
    pub fn push(&mut self, event: AnswerEvent) -> bool {
        if self.closed {
            return false;
        }
        match event {
            AnswerEvent::Answer(chunk) => self.answer.push_str(&chunk),
            AnswerEvent::Docs(mut batch) => self.docs.append(&mut batch),
            AnswerEvent::End => self.closed = true,
            AnswerEvent::Error(msg) => {
                self.error = Some(msg);
                self.closed = true;
            }
        }
        !self.closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut SseParser, input: &str) -> Vec<SseFrame> {
        parser.feed(input.as_bytes())
    }

    #[test]
    fn parses_frames_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"type\":\"ans").is_empty());
        let frames = parser.feed(b"wer\",\"content\":\"hi\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, r#"{"type":"answer","content":"hi"}"#);
    }

    #[test]
    fn parses_event_names_and_crlf() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b"event: end\r\ndata: {}\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "end");
    }

    #[test]
    fn ignores_comments_and_retry() {
        let mut parser = SseParser::new();
        let frames = feed_all(&mut parser, ": keepalive\nretry: 500\ndata: x\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn joins_multi_line_data() {
        let mut parser = SseParser::new();
        let frames = feed_all(&mut parser, "data: a\ndata: b\n\n");
        assert_eq!(frames[0].data, "a\nb");
    }

    #[test]
    fn does_not_split_multibyte_chars() {
        let mut parser = SseParser::new();
        let full = "data: {\"type\":\"answer\",\"content\":\"héllo\"}\n\n".as_bytes();
        // Split inside the two-byte 'é'
        let cut = full.iter().position(|&b| b == 0xc3).unwrap() + 1;
        assert!(parser.feed(&full[..cut]).is_empty());
        let frames = parser.feed(&full[cut..]);
        let ev = decode_event(&frames[0]).unwrap();
        match ev {
            AnswerEvent::Answer(s) => assert_eq!(s, "héllo"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn accumulates_answer_chunks_in_order() {
        let mut acc = AnswerAccumulator::new();
        assert!(acc.push(AnswerEvent::Answer("To deploy, ".into())));
        assert!(acc.push(AnswerEvent::Answer("run dqa.".into())));
        assert!(acc.push(AnswerEvent::Docs(vec![SourceDoc {
            page_content: "deploy guide".into(),
            metadata: serde_json::json!({}),
        }])));
        assert!(!acc.push(AnswerEvent::End));
        assert_eq!(acc.answer, "To deploy, run dqa.");
        assert_eq!(acc.docs.len(), 1);
        assert!(acc.error.is_none());
        assert!(acc.is_closed());
    }

    #[test]
    fn events_after_close_are_dropped() {
        let mut acc = AnswerAccumulator::new();
        acc.push(AnswerEvent::End);
        assert!(!acc.push(AnswerEvent::Answer("late".into())));
        assert_eq!(acc.answer, "");
    }

    #[test]
    fn error_event_carries_detail_msg() {
        let frame = SseFrame {
            event: "error".into(),
            data: r#"{"detail":[{"msg":"collection not found"}]}"#.into(),
        };
        match decode_event(&frame).unwrap() {
            AnswerEvent::Error(msg) => assert_eq!(msg, "collection not found"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn end_in_data_position_also_terminates() {
        let frame = SseFrame {
            event: "message".into(),
            data: r#"{"type":"end"}"#.into(),
        };
        assert!(matches!(decode_event(&frame), Some(AnswerEvent::End)));
    }

    #[test]
    fn unknown_payloads_are_skipped() {
        let frame = SseFrame {
            event: "message".into(),
            data: r#"{"type":"heartbeat"}"#.into(),
        };
        assert!(decode_event(&frame).is_none());
        let garbage = SseFrame {
            event: "message".into(),
            data: "not json".into(),
        };
        assert!(decode_event(&garbage).is_none());
    }
}
