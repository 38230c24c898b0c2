//! src/services/responder.rs
//!
//! StreamingResponder — turns a resolved object and a validated range into
//! response framing plus a chunked copy from the backend stream to a sink.
//!
//! Headers are decided before the first byte is read. After that the status
//! can no longer change, so failures are reported by cutting the body short.

use crate::{
    models::{
        object::ObjectHandle,
        range::{ByteSpan, RangeSpec},
    },
    services::store::{ByteStream, ObjectStore, StoreError},
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::StreamExt;
use std::{io, time::Duration};
use thiserror::Error;
use tokio::{sync::mpsc, time::timeout};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info_span, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 8192;

#[derive(Debug, Error)]
#[error("client went away")]
pub struct SinkClosed;

/// Destination of a streamed body.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Deliver one chunk. `Err` means the reader is gone.
    async fn send(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;

    /// Resolves once the reader is gone. Sinks that cannot tell never resolve.
    async fn closed(&self) {
        futures::future::pending::<()>().await
    }

    /// Abort the body after headers were committed.
    async fn fail(&mut self, _err: io::Error) {}
}

/// Sink feeding an axum response body through a one-slot channel, so a slow
/// client throttles the copy loop directly.
pub struct ChannelSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
    write_timeout: Duration,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>, write_timeout: Duration) -> Self {
        Self { tx, write_timeout }
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn send(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.tx.send(Ok(chunk)).await.map_err(|_| SinkClosed)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }

    async fn fail(&mut self, err: io::Error) {
        // an error item makes hyper drop the connection instead of ending
        // the body cleanly
        let _ = timeout(self.write_timeout, self.tx.send(Err(err))).await;
    }
}

/// How a copy ended.
#[derive(Debug)]
pub enum StreamOutcome {
    Completed { bytes: u64 },
    ClientDisconnected { bytes: u64 },
    BackendFailed { bytes: u64, error: io::Error },
    TimedOut { bytes: u64 },
}

impl StreamOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            StreamOutcome::Completed { bytes }
            | StreamOutcome::ClientDisconnected { bytes }
            | StreamOutcome::BackendFailed { bytes, .. }
            | StreamOutcome::TimedOut { bytes } => *bytes,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }
}

/// Errors raised before any header is sent.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
}

/// Status line and headers of a GET response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub span: ByteSpan,
}

#[derive(Clone, Debug)]
pub struct StreamingResponder {
    pub chunk_size: usize,
    pub backend_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for StreamingResponder {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            backend_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(60),
        }
    }
}

impl StreamingResponder {
    pub fn new(chunk_size: usize, backend_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            backend_timeout,
            write_timeout,
        }
    }

    /// 200 for a full body, 206 with `Content-Range` for a partial one.
    pub fn head(&self, handle: &ObjectHandle, range: &RangeSpec) -> ResponseHead {
        let size = handle.size();
        let span = range.span(size);
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(span.len));

        let status = if range.is_partial() {
            let content_range = format!("bytes {}-{}/{}", span.start, span.end(), size);
            if let Ok(value) = HeaderValue::from_str(&content_range) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };

        ResponseHead {
            status,
            headers,
            span,
        }
    }

    /// Open the backend stream for `range`, bounded by the backend timeout.
    pub async fn open(
        &self,
        store: &dyn ObjectStore,
        handle: &ObjectHandle,
        range: &RangeSpec,
    ) -> Result<ByteStream, OpenError> {
        match timeout(self.backend_timeout, store.fetch(handle, range)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(OpenError::Timeout(self.backend_timeout)),
        }
    }

    /// Fetch `range` of `handle` and copy it into `sink`.
    pub async fn run<S: ChunkSink>(
        &self,
        store: &dyn ObjectStore,
        handle: &ObjectHandle,
        range: &RangeSpec,
        sink: &mut S,
    ) -> Result<StreamOutcome, OpenError> {
        let span = range.span(handle.size());
        let stream = self.open(store, handle, range).await?;
        Ok(self.pump(stream, span.len, sink).await)
    }

    /// Build the HTTP response for a GET.
    ///
    /// The backend stream is opened before returning so that a failure to
    /// open still maps to a clean status. The copy itself runs on its own
    /// task that lives as long as the client keeps reading.
    pub async fn respond(
        &self,
        store: &dyn ObjectStore,
        handle: &ObjectHandle,
        range: &RangeSpec,
    ) -> Result<Response, OpenError> {
        let head = self.head(handle, range);
        let stream = self.open(store, handle, range).await?;

        let (tx, rx) = mpsc::channel(1);
        let responder = self.clone();
        let expected = head.span.len;
        let task_span = info_span!(
            "stream",
            path = %handle.path,
            status = head.status.as_u16(),
            len = expected
        );
        tokio::spawn(
            async move {
                let mut sink = ChannelSink::new(tx, responder.write_timeout);
                let outcome = responder.pump(stream, expected, &mut sink).await;
                log_outcome(&outcome, expected);
            }
            .instrument(task_span),
        );

        let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers;
        Ok(response)
    }

    /// Copy exactly `expected` bytes from `stream` into `sink`, in slices of
    /// at most `chunk_size`, strictly in order.
    pub async fn pump<S: ChunkSink>(
        &self,
        mut stream: ByteStream,
        expected: u64,
        sink: &mut S,
    ) -> StreamOutcome {
        let mut sent: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = sink.closed() => {
                    return StreamOutcome::ClientDisconnected { bytes: sent };
                }
                next = timeout(self.backend_timeout, stream.next()) => next,
            };

            let mut chunk = match next {
                Err(_) => {
                    drop(stream);
                    sink.fail(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "backend read timed out",
                    ))
                    .await;
                    return StreamOutcome::TimedOut { bytes: sent };
                }
                // explicit end of stream
                Ok(None) => break,
                Ok(Some(Err(error))) => {
                    drop(stream);
                    sink.fail(io::Error::new(error.kind(), error.to_string()))
                        .await;
                    return StreamOutcome::BackendFailed { bytes: sent, error };
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            let remaining = expected - sent;
            if chunk.len() as u64 > remaining {
                warn!(
                    "backend returned {} bytes past the requested span, dropping them",
                    chunk.len() as u64 - remaining
                );
                chunk.truncate(remaining as usize);
            }

            while !chunk.is_empty() {
                let piece = chunk.split_to(chunk.len().min(self.chunk_size));
                let piece_len = piece.len() as u64;
                match timeout(self.write_timeout, sink.send(piece)).await {
                    Ok(Ok(())) => sent += piece_len,
                    Ok(Err(SinkClosed)) => {
                        return StreamOutcome::ClientDisconnected { bytes: sent };
                    }
                    Err(_) => return StreamOutcome::TimedOut { bytes: sent },
                }
            }

            if sent == expected {
                return StreamOutcome::Completed { bytes: sent };
            }
        }

        if sent == expected {
            StreamOutcome::Completed { bytes: sent }
        } else {
            let error = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("backend stream ended after {} of {} bytes", sent, expected),
            );
            sink.fail(io::Error::new(error.kind(), error.to_string()))
                .await;
            StreamOutcome::BackendFailed { bytes: sent, error }
        }
    }
}

fn log_outcome(outcome: &StreamOutcome, expected: u64) {
    match outcome {
        StreamOutcome::Completed { bytes } => debug!("streamed {} bytes", bytes),
        StreamOutcome::ClientDisconnected { bytes } => {
            debug!("client disconnected after {} of {} bytes", bytes, expected)
        }
        StreamOutcome::BackendFailed { bytes, error } => error!(
            "backend stream failed after {} of {} bytes: {}",
            bytes, expected, error
        ),
        StreamOutcome::TimedOut { bytes } => {
            warn!("stream timed out after {} of {} bytes", bytes, expected)
        }
    }
}
