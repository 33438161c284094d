//! Accumulates streamed text fragments into a complete response while passing them through.

use std::pin::Pin;

use futures::Stream;
use futures::stream::BoxStream;

use crate::Result;
use crate::types::ChatCompletionChunk;

/// A stream wrapper that accumulates text fragments into the full response text.
///
/// This allows printing fragments as they arrive while simultaneously building the final
/// response without a second buffer at the call site.  When the stream drains without an
/// error, the accumulated text is sent via the oneshot channel returned by `new()`.  After an
/// error the sender is dropped instead, so the receiver resolves to `Err` and a cut-short
/// response is never mistaken for a complete one.
pub struct AccumulatingStream<'a> {
    inner: BoxStream<'a, Result<String>>,
    text_tx: Option<tokio::sync::oneshot::Sender<String>>,
    text: String,
    interrupted: bool,
}

impl<'a> AccumulatingStream<'a> {
    /// Wraps a fragment stream to accumulate fragments into a single `String`.
    ///
    /// Returns the stream and a receiver that will contain the concatenation of every fragment
    /// once the stream is fully drained.
    pub fn new<S>(stream: S) -> (Self, tokio::sync::oneshot::Receiver<String>)
    where
        S: Stream<Item = Result<String>> + Send + 'a,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let this = Self {
            inner: Box::pin(stream),
            text_tx: Some(tx),
            text: String::new(),
            interrupted: false,
        };
        (this, rx)
    }

    /// The text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether an error cut the stream short.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }
}

impl Stream for AccumulatingStream<'_> {
    type Item = Result<String>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            std::task::Poll::Ready(Some(Ok(fragment))) => {
                self.text.push_str(&fragment);
                std::task::Poll::Ready(Some(Ok(fragment)))
            }
            std::task::Poll::Ready(Some(Err(err))) => {
                self.interrupted = true;
                self.text_tx = None;
                std::task::Poll::Ready(Some(Err(err)))
            }
            std::task::Poll::Ready(None) => {
                if let Some(tx) = self.text_tx.take() {
                    let text = std::mem::take(&mut self.text);
                    let _ = tx.send(text);
                }
                std::task::Poll::Ready(None)
            }
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

/// Turns streamed chunks into suffix fragments.
///
/// Delta chunks are passed through.  Snapshot chunks carry everything generated so far; only
/// the part past the previously observed text is emitted.  A snapshot that does not extend the
/// observed text breaks the monotonic contract and is dropped.
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    received: String,
}

impl FragmentDecoder {
    /// Create a decoder that has observed nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far.
    pub fn received(&self) -> &str {
        &self.received
    }

    /// Decode one chunk into the next fragment, if it carries new text.
    pub fn push_chunk(&mut self, chunk: &ChatCompletionChunk) -> Option<String> {
        let choice = chunk.choices.iter().find(|c| c.index == 0)?;
        if let Some(text) = choice.delta.as_ref().and_then(|d| d.content.as_deref()) {
            self.push_delta(text)
        } else if let Some(text) = choice.message.as_ref().and_then(|m| m.content.as_deref()) {
            self.push_snapshot(text)
        } else {
            None
        }
    }

    /// Record a delta and return it unless it is empty.
    pub fn push_delta(&mut self, delta: &str) -> Option<String> {
        if delta.is_empty() {
            return None;
        }
        self.received.push_str(delta);
        Some(delta.to_string())
    }

    /// Record a cumulative snapshot and return the unseen suffix.
    pub fn push_snapshot(&mut self, snapshot: &str) -> Option<String> {
        if snapshot.is_empty() || snapshot == self.received {
            return None;
        }
        match snapshot.strip_prefix(self.received.as_str()) {
            Some(suffix) => {
                let suffix = suffix.to_string();
                self.received = snapshot.to_string();
                Some(suffix)
            }
            None => {
                tracing::warn!(
                    observed = self.received.len(),
                    snapshot = snapshot.len(),
                    "dropping snapshot that does not extend the streamed text"
                );
                None
            }
        }
    }
}
