//! 流水线模块：把 SSE 字节流解码为类型化事件。
//!
//! # Stream decoding pipeline
//!
//! ```text
//! Raw Bytes → decode (SSE framing) → event_map → StreamEvent
//!     │              │                    │
//!   HTTP body   event:/data:/:       alias table,
//!               lines, blank-line    malformed frames
//!               frame boundary       dropped
//! ```
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | Line buffering and frame accumulation |
//! | [`event_map`] | Frame to [`StreamEvent`] mapping |
//!
//! Both stream shapes (event subscription and prompt streaming) share this
//! pipeline, so decoding is identical for the two.

pub mod decode;
pub mod event_map;

use crate::types::StreamEvent;
use bytes::Bytes;
use futures::{future, Stream, StreamExt};

pub use decode::{decode_sse, SseFrame, SseFrameDecoder, SseRecord};
pub use event_map::{map_frame, map_record, EventKind};

/// Decode a byte stream straight into events, in arrival order.
///
/// Frames that cannot be mapped are skipped; input errors are passed through
/// and end the stream.
pub fn decode_events<S, E>(input: S) -> impl Stream<Item = Result<StreamEvent, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    decode_sse(input).filter_map(|item| {
        future::ready(match item {
            Ok(record) => map_record(&record).map(Ok),
            Err(e) => Some(Err(e)),
        })
    })
}
