//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! This module converts the raw byte stream of an OpenAI-compatible
//! `/chat/completions` response into structured [`ChatStreamEvent`]s.  Bytes
//! are buffered until a blank line completes an event, so multi-byte
//! characters split across network reads decode correctly.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::STREAM_BYTES;
use crate::types::ChatCompletionChunk;
use crate::{Error, Result};

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatStreamEvent {
    /// A `chat.completion.chunk` payload.
    Chunk(ChatCompletionChunk),

    /// The `[DONE]` terminator.
    Done,
}

struct SseState<S> {
    stream: S,
    buffer: Vec<u8>,
    exhausted: bool,
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Comment-only events (keep-alives) are skipped.  Errors from the transport
/// are passed through; the caller decides whether to continue.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatStreamEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    // Convert transport errors to our error type
    let stream = byte_stream.map(|result| {
        result.map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let state = SseState {
        stream,
        buffer: Vec::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            // First check if we have a complete event in the buffer
            if let Some((event, consumed)) = extract_event(&state.buffer) {
                state.buffer.drain(..consumed);
                match event {
                    Ok(Some(event)) => return Some((Ok(event), state)),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), state)),
                }
            }
            if state.exhausted {
                return None;
            }

            // Read more data
            match state.stream.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    state.buffer.extend(bytes.iter().filter(|b| **b != b'\r'));
                }
                Some(Err(e)) => {
                    return Some((Err(e), state));
                }
                None => {
                    // End of stream; flush a trailing event without its blank line
                    state.exhausted = true;
                    if state.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                        state.buffer.extend_from_slice(b"\n\n");
                    } else {
                        return None;
                    }
                }
            }
        }
    })
}

/// Extract a complete SSE event from the front of `buffer`.
///
/// Returns the parse result and the number of bytes consumed.  `Ok(None)`
/// means the event carried no data and should be skipped.
fn extract_event(buffer: &[u8]) -> Option<(Result<Option<ChatStreamEvent>>, usize)> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let consumed = end + 2;
    let event_text = match std::str::from_utf8(&buffer[..end]) {
        Ok(text) => text,
        Err(e) => return Some((Err(e.into()), consumed)),
    };

    let mut event_type = None;
    let mut data: Vec<&str> = Vec::new();
    for line in event_text.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        }
    }
    if data.is_empty() {
        return Some((Ok(None), consumed));
    }
    let data = data.join("\n");
    Some((parse_data(event_type, data.trim()), consumed))
}

/// Parse the data payload of one event.
fn parse_data(event_type: Option<&str>, data: &str) -> Result<Option<ChatStreamEvent>> {
    if data == "[DONE]" {
        return Ok(Some(ChatStreamEvent::Done));
    }
    if event_type == Some("error") {
        return Err(Error::api(
            500,
            Some("stream_error".to_string()),
            data.to_string(),
        ));
    }
    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })?;
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        return Err(Error::api(500, Some("stream_error".to_string()), message));
    }
    let chunk: ChatCompletionChunk = serde_json::from_value(value)?;
    Ok(Some(ChatStreamEvent::Chunk(chunk)))
}
