//! Incremental Server-Sent-Events decoding.
//!
//! Network chunks can end anywhere, including in the middle of a line or of a
//! multi-byte character, so bytes are buffered until a full line is available.

use tracing::warn;

use crate::models::execution::LogData;

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data_lines: Vec<String>,
    event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buf.is_empty() {
            let line = String::from_utf8_lossy(&std::mem::take(&mut self.buf)).into_owned();
            if let Some(frame) = self.process_line(line.trim_end_matches('\r')) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data_lines).join("\n");
        Some(SseFrame { event, data })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStreamItem {
    Event(LogData),
    Done,
}

/// Decodes the event stream produced by a workflow run.
#[derive(Debug, Default)]
pub struct RunStreamDecoder {
    sse: SseDecoder,
    done: bool,
}

impl RunStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RunStreamItem> {
        if self.done {
            return Vec::new();
        }
        let frames = self.sse.feed(chunk);
        self.convert(frames)
    }

    pub fn finish(&mut self) -> Vec<RunStreamItem> {
        if self.done {
            return Vec::new();
        }
        let frames = self.sse.finish().into_iter().collect();
        self.convert(frames)
    }

    fn convert(&mut self, frames: Vec<SseFrame>) -> Vec<RunStreamItem> {
        let mut items = Vec::with_capacity(frames.len());
        for frame in frames {
            if frame.data.trim() == DONE_SENTINEL {
                self.done = true;
                items.push(RunStreamItem::Done);
                break;
            }
            match serde_json::from_str::<LogData>(&frame.data) {
                Ok(event) => items.push(RunStreamItem::Event(event)),
                Err(err) => warn!(error = %err, data = %frame.data, "skipping malformed run event"),
            }
        }
        items
    }
}
