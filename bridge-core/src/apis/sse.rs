//! Generic Server-Sent-Events line parsing, shared by the OpenAI backend
//! adapter (parsing what the backend sends) and the Anthropic stream writer
//! (producing what the client receives).

use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// A single parsed SSE field line: either a `data: ...` or an `event: ...`
/// line. A full SSE event is usually one or two of these in sequence,
/// terminated by a blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub data: Option<String>,
    pub event: Option<String>,
}

impl SseEvent {
    pub fn is_done(&self) -> bool {
        self.data.as_deref() == Some("[DONE]")
    }

    /// Ping/keepalive payloads some backends interleave into the stream.
    pub fn should_skip(&self) -> bool {
        matches!(self.data.as_deref(), Some(d) if d.trim() == r#"{"type": "ping"}"# || d.trim().is_empty())
    }
}

impl FromStr for SseEvent {
    type Err = SseParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = line.strip_prefix("data: ") {
            Ok(SseEvent {
                data: Some(rest.to_string()),
                event: None,
            })
        } else if let Some(rest) = line.strip_prefix("event: ") {
            Ok(SseEvent {
                data: None,
                event: Some(rest.to_string()),
            })
        } else {
            Err(SseParseError {
                message: format!("line does not start with 'data: ' or 'event: ': {line}"),
            })
        }
    }
}

#[derive(Debug)]
pub struct SseParseError {
    pub message: String,
}

impl fmt::Display for SseParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SSE parse error: {}", self.message)
    }
}

impl Error for SseParseError {}

/// Parses a complete, already-buffered SSE payload into events, stopping
/// at (and including) the `[DONE]` marker if present. Used by tests and by
/// any non-streaming adapter that has the whole body in hand.
pub struct SseStreamIter<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    lines: I,
    done_seen: bool,
}

impl<I> SseStreamIter<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            done_seen: false,
        }
    }
}

impl TryFrom<&[u8]> for SseStreamIter<std::vec::IntoIter<String>> {
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let s = std::str::from_utf8(bytes)?;
        let lines: Vec<String> = s.lines().map(|l| l.to_string()).collect();
        Ok(SseStreamIter::new(lines.into_iter()))
    }
}

impl<I> Iterator for SseStreamIter<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = SseEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done_seen {
            return None;
        }
        for line in &mut self.lines {
            let line_str = line.as_ref();
            if line_str.is_empty() {
                continue;
            }
            if let Ok(event) = line_str.parse::<SseEvent>() {
                if event.is_done() {
                    self.done_seen = true;
                    return Some(event);
                }
                if event.should_skip() {
                    continue;
                }
                return Some(event);
            }
        }
        None
    }
}

/// Incremental line-buffer for SSE bytes that arrive as arbitrary chunks
/// from the network (chunk boundaries need not align with line boundaries).
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes and returns the complete lines it produced,
    /// retaining any trailing partial line for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut complete = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            complete.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_and_done_marker() {
        let raw = b"data: {\"a\":1}\n\ndata: [DONE]\n\n";
        let iter = SseStreamIter::try_from(&raw[..]).unwrap();
        let events: Vec<_> = iter.collect();
        assert_eq!(events.len(), 2);
        assert!(events[1].is_done());
    }

    #[test]
    fn line_buffer_reassembles_split_chunks() {
        let mut buf = SseLineBuffer::new();
        let mut lines = buf.push(b"data: {\"a\":");
        assert!(lines.is_empty());
        lines = buf.push(b"1}\n");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);
    }
}
