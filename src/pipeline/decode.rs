//! SSE framing (bytes -> frames).
//!
//! Lines are `event: <type>`, `data: <payload>`, `: <comment>`; a blank line
//! terminates one frame. Multiple `data:` lines of one frame are trimmed and
//! concatenated. Other fields (`id:`, `retry:`) are ignored.

use bytes::{Bytes, BytesMut};
use futures::{stream, Stream, StreamExt};
use std::collections::VecDeque;

/// One complete frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the last `event:` line, if any.
    pub event: Option<String>,
    pub data: String,
}

/// Output of the framing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseRecord {
    /// A `:` line (keepalive). Does not touch the pending frame.
    Comment(String),
    Frame(SseFrame),
}

/// Incremental SSE decoder.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    line_buf: BytesMut,
    event: Option<String>,
    data: String,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; completed records are appended to `out` in arrival order.
    pub fn feed(&mut self, chunk: &[u8], out: &mut impl Extend<SseRecord>) {
        self.line_buf.extend_from_slice(chunk);
        while let Some(pos) = self.line_buf.iter().position(|b| *b == b'\n') {
            let line = self.line_buf.split_to(pos + 1);
            let mut line = &line[..pos];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line);
            if let Some(record) = self.process_line(&line) {
                out.extend(Some(record));
            }
        }
    }

    /// End of input: a trailing partial line is processed and a pending frame flushed.
    pub fn finish(&mut self, out: &mut impl Extend<SseRecord>) {
        if !self.line_buf.is_empty() {
            let rest = self.line_buf.split();
            let line = String::from_utf8_lossy(&rest[..]);
            let line = line.trim_end_matches('\r').to_string();
            if let Some(record) = self.process_line(&line) {
                out.extend(Some(record));
            }
        }
        if let Some(record) = self.take_frame() {
            out.extend(Some(record));
        }
    }

    /// Whether a frame has started but not been terminated yet.
    pub fn has_pending(&self) -> bool {
        !self.data.is_empty()
    }

    fn process_line(&mut self, line: &str) -> Option<SseRecord> {
        if line.is_empty() {
            let record = self.take_frame();
            self.event = None;
            return record;
        }
        if let Some(comment) = line.strip_prefix(':') {
            return Some(SseRecord::Comment(comment.trim().to_string()));
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.data.push_str(data.trim());
        } else if let Some(event) = line.strip_prefix("event:") {
            let event = event.trim();
            self.event = (!event.is_empty()).then(|| event.to_string());
        }
        None
    }

    fn take_frame(&mut self) -> Option<SseRecord> {
        if self.data.is_empty() {
            return None;
        }
        Some(SseRecord::Frame(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data),
        }))
    }
}

/// Decode a byte stream into SSE records.
///
/// An input error is yielded once and ends the stream; frames completed
/// before it are still delivered first.
pub fn decode_sse<S, E>(input: S) -> impl Stream<Item = Result<SseRecord, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    let state = (
        Box::pin(input),
        SseFrameDecoder::new(),
        VecDeque::<SseRecord>::new(),
        false,
    );
    stream::unfold(state, |(mut input, mut decoder, mut queue, mut done)| async move {
        loop {
            if let Some(record) = queue.pop_front() {
                return Some((Ok(record), (input, decoder, queue, done)));
            }
            if done {
                return None;
            }
            match input.next().await {
                Some(Ok(bytes)) => decoder.feed(&bytes, &mut queue),
                Some(Err(e)) => return Some((Err(e), (input, decoder, queue, true))),
                None => {
                    decoder.finish(&mut queue);
                    done = true;
                }
            }
        }
    })
}
