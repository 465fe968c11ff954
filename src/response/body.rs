//! Response body sources and the lazily consumed body stream
//!
//! A body source is either nothing, a static buffer, or a chunk stream.
//! Push-style producers get a bounded queue from [`body_channel`]:
//!
//! ```text
//! producer ── send(chunk) ──▶ [ bounded mpsc ] ──▶ BodyStream ──▶ reader
//!     ▲                                                  │
//!     └──────── send() fails once the reader drops ──────┘
//! ```

use crate::utils::errors::{EngineError, Result};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Where a response body comes from
#[derive(Default)]
pub enum BodySource {
    /// No body at all
    #[default]
    None,

    /// A complete buffer, delivered as a single chunk
    Bytes(Bytes),

    /// Chunks delivered as they become available; an `Err` item ends the body
    Stream(BoxStream<'static, Result<Bytes>>),
}

impl BodySource {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        BodySource::Stream(stream.boxed())
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::None => f.write_str("BodySource::None"),
            BodySource::Bytes(b) => write!(f, "BodySource::Bytes({} bytes)", b.len()),
            BodySource::Stream(_) => f.write_str("BodySource::Stream(..)"),
        }
    }
}

impl From<Bytes> for BodySource {
    fn from(bytes: Bytes) -> Self {
        BodySource::Bytes(bytes)
    }
}

impl From<Vec<u8>> for BodySource {
    fn from(bytes: Vec<u8>) -> Self {
        BodySource::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static str> for BodySource {
    fn from(s: &'static str) -> Self {
        BodySource::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for BodySource {
    fn from(s: String) -> Self {
        BodySource::Bytes(Bytes::from(s))
    }
}

/// Producer half of a bounded body queue
#[derive(Debug, Clone)]
pub struct BodySender {
    tx: mpsc::Sender<Result<Bytes>>,
}

impl BodySender {
    /// Queue a chunk, waiting while the queue is full.
    ///
    /// Fails once the reader has dropped the body; producers should stop
    /// emitting at that point.
    pub async fn send(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(Ok(chunk.into()))
            .await
            .map_err(|_| EngineError::BodySource("body reader went away".to_string()))
    }

    /// Terminate the body with an error visible to the reader
    pub async fn fail(self, message: impl Into<String>) {
        let _ = self.tx.send(Err(EngineError::BodySource(message.into()))).await;
    }

    /// End the body. Dropping every sender has the same effect.
    pub fn finish(self) {}

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a bounded push-driven body source holding at most `capacity` chunks
pub fn body_channel(capacity: usize) -> (BodySender, BodySource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        BodySender { tx },
        BodySource::Stream(ReceiverStream::new(rx).boxed()),
    )
}

/// Lazily consumed response body.
///
/// The underlying source is only polled when the reader polls, and the
/// stream ends after the first error.
pub struct BodyStream {
    inner: BoxStream<'static, Result<Bytes>>,
    finished: bool,
}

impl BodyStream {
    pub(crate) fn from_source(source: BodySource) -> Self {
        let inner = match source {
            BodySource::None => stream::empty().boxed(),
            BodySource::Bytes(bytes) if bytes.is_empty() => stream::empty().boxed(),
            BodySource::Bytes(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            BodySource::Stream(s) => s,
        };
        Self {
            inner,
            finished: false,
        }
    }

    /// Read the rest of the body into one buffer
    pub async fn collect_bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Err(e))) => {
                self.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Body of a synthesized response
#[derive(Debug)]
pub enum ResponseBody {
    /// Bodiless status, or nothing to send
    Empty,
    Stream(BodyStream),
}

impl ResponseBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }

    pub async fn collect_bytes(self) -> Result<Bytes> {
        match self {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Stream(stream) => stream.collect_bytes().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_static_bytes_single_chunk() {
        let mut body = BodyStream::from_source(BodySource::from("hello"));
        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from("hello"));
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_source_not_polled_before_read() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polled);
        let source = BodySource::from_stream(stream::iter(0..3).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(format!("chunk{}", i)))
        }));

        let mut body = BodyStream::from_source(source);
        assert_eq!(polled.load(Ordering::SeqCst), 0);

        body.next().await.unwrap().unwrap();
        assert_eq!(polled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_chunks_then_end() {
        let (tx, source) = body_channel(4);
        let body = BodyStream::from_source(source);

        tokio::spawn(async move {
            tx.send("a").await.unwrap();
            tx.send("b").await.unwrap();
            tx.finish();
        });

        assert_eq!(body.collect_bytes().await.unwrap(), Bytes::from("ab"));
    }

    #[tokio::test]
    async fn test_error_is_terminal() {
        let (tx, source) = body_channel(4);
        let mut body = BodyStream::from_source(source);

        tokio::spawn(async move {
            tx.send("partial").await.unwrap();
            tx.fail("socket reset").await;
        });

        assert!(body.next().await.unwrap().is_ok());
        let err = body.next().await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::BodySource(msg) if msg == "socket reset"));
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_backpressure_and_cancellation() {
        let (tx, source) = body_channel(1);
        tx.send("first").await.unwrap();

        // queue is full: the next send waits for the reader
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            tx.send("second"),
        )
        .await;
        assert!(pending.is_err());

        drop(BodyStream::from_source(source));
        assert!(tx.is_closed());
        assert!(tx.send("third").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_body() {
        let bytes = ResponseBody::Empty.collect_bytes().await.unwrap();
        assert!(bytes.is_empty());
    }
}
