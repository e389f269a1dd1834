//! Body and trailer lifecycle.
//!
//! A [`Body`] owns one chunk source and the producer of its trailers:
//!
//! ```text
//! Open ──read──▶ Draining ──EOF──▶ Exhausted ──▶ Closed
//!   └────────────────┴──────close()─────────────────┘
//! ```
//!
//! Trailers are produced exactly once, by whichever comes first of the
//! source reaching EOF, an explicit [`Body::finish`], or [`Body::close`].
//! A close before EOF settles trailer waiters with an empty map. The source
//! is released once, no matter how many times or from how many handles
//! close is called.

use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use blastwire_core::codec::{Deferred, read_exact_bytes, read_len};
use blastwire_core::stream::{put_status, read_chunk, read_status, write_chunk, write_end};
use blastwire_core::{Decode, Encode, IncomingStream, OutgoingStream, WireResult};

use crate::error::{HttpError, HttpResult};
use crate::header::{Fields, HeaderMap};
use crate::trailers::{TrailerSlot, Trailers};

/// A type-erased, fallible async stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Where body chunks come from.
#[async_trait]
pub trait ChunkSource: Send {
    /// The next chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> HttpResult<Option<Bytes>>;
}

/// Produces the trailers of a body once it is exhausted.
#[async_trait]
pub trait TrailerProducer: Send {
    async fn produce(self: Box<Self>) -> HttpResult<HeaderMap>;
}

// ── Sources ─────────────────────────────────────────────────────────

#[async_trait]
impl ChunkSource for ByteStream {
    async fn next_chunk(&mut self) -> HttpResult<Option<Bytes>> {
        match self.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(HttpError::Body(e.to_string())),
            None => Ok(None),
        }
    }
}

/// A body decoded from the wire: inline bytes, or chunks on a child stream.
pub enum BodySource {
    Ready(Option<Bytes>),
    Pending(IncomingStream),
}

#[async_trait]
impl ChunkSource for BodySource {
    async fn next_chunk(&mut self) -> HttpResult<Option<Bytes>> {
        match self {
            Self::Ready(bytes) => Ok(bytes.take().filter(|b| !b.is_empty())),
            Self::Pending(r) => Ok(read_chunk(r).await?),
        }
    }
}

/// `stream<u8>` as decoded: the pending form binds the field's child stream.
#[async_trait]
impl Decode for BodySource {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        if read_status(r).await? {
            let len = read_len(r).await?;
            let bytes = read_exact_bytes(r, len).await?;
            Ok(Self::Ready(Some(Bytes::from(bytes))))
        } else {
            Ok(Self::Pending(r.index(path)?))
        }
    }
}

#[async_trait]
impl TrailerProducer for HeaderMap {
    async fn produce(self: Box<Self>) -> HttpResult<HeaderMap> {
        Ok(*self)
    }
}

/// Trailers decoded from the wire: inline fields, or fields on a child stream.
pub enum TrailerSource {
    Ready(Fields),
    Pending(IncomingStream),
}

#[async_trait]
impl TrailerProducer for TrailerSource {
    async fn produce(self: Box<Self>) -> HttpResult<HeaderMap> {
        match *self {
            Self::Ready(fields) => Ok(HeaderMap::from_fields(fields)),
            Self::Pending(mut r) => {
                let fields = Fields::decode(&mut r, &[]).await?;
                if let Err(e) = r.close() {
                    debug!(error = %e, "failed to close trailer stream");
                }
                Ok(HeaderMap::from_fields(fields))
            }
        }
    }
}

/// `future<fields>` as decoded: the pending form binds the field's child stream.
#[async_trait]
impl Decode for TrailerSource {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        if read_status(r).await? {
            Ok(Self::Ready(Fields::decode(r, path).await?))
        } else {
            Ok(Self::Pending(r.index(path)?))
        }
    }
}

// ── Body ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BodyState {
    Open = 0,
    Draining = 1,
    Exhausted = 2,
    Closed = 3,
}

impl BodyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Draining,
            2 => Self::Exhausted,
            _ => Self::Closed,
        }
    }
}

struct Shared {
    source: tokio::sync::Mutex<Option<Box<dyn ChunkSource>>>,
    producer: Mutex<Option<Box<dyn TrailerProducer>>>,
    slot: TrailerSlot,
    state: AtomicU8,
    closing: CancellationToken,
}

impl Shared {
    fn advance(&self, to: BodyState) {
        // Closed is terminal; Exhausted only moves to Closed.
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < to as u8).then_some(to as u8)
            });
    }

    fn take_producer(&self) -> Option<Box<dyn TrailerProducer>> {
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Produce trailers once; a no-op once the producer has been taken.
    async fn finish(&self) {
        let Some(producer) = self.take_producer() else {
            return;
        };
        let trailers = tokio::select! {
            produced = producer.produce() => produced.unwrap_or_else(|e| {
                warn!(error = %e, "failed to produce trailers");
                HeaderMap::new()
            }),
            () = self.closing.cancelled() => HeaderMap::new(),
        };
        trace!(count = trailers.len(), "trailers ready");
        self.slot.set(trailers);
    }

    async fn close(&self) {
        self.closing.cancel();
        self.advance(BodyState::Closed);
        if self.take_producer().is_some() {
            debug!("body closed before trailers were produced");
        }
        self.slot.set(HeaderMap::new());
        if self.source.lock().await.take().is_some() {
            trace!("released body source");
        }
    }
}

/// A body with lazily produced trailers.
pub struct Body {
    shared: Arc<Shared>,
}

/// Closes a [`Body`] from elsewhere, e.g. while a read is in flight.
#[derive(Clone)]
pub struct BodyCloser {
    shared: Arc<Shared>,
}

impl BodyCloser {
    pub async fn close(&self) {
        self.shared.close().await;
    }
}

impl Body {
    /// Wrap `source`; `producer` yields the trailers once `source` is drained.
    pub fn new(
        source: impl ChunkSource + 'static,
        producer: impl TrailerProducer + 'static,
    ) -> (Body, Trailers) {
        let (slot, trailers) = Trailers::pending();
        let shared = Shared {
            source: tokio::sync::Mutex::new(Some(Box::new(source))),
            producer: Mutex::new(Some(Box::new(producer))),
            slot,
            state: AtomicU8::new(BodyState::Open as u8),
            closing: CancellationToken::new(),
        };
        (
            Body {
                shared: Arc::new(shared),
            },
            trailers,
        )
    }

    /// A streaming body whose trailers are known up front but only released
    /// once the stream is drained.
    pub fn from_stream(stream: ByteStream, trailers: HeaderMap) -> (Body, Trailers) {
        Self::new(stream, trailers)
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> (Body, Trailers) {
        Self::new(BodySource::Ready(Some(bytes.into())), HeaderMap::new())
    }

    pub fn empty() -> (Body, Trailers) {
        Self::from_bytes(Bytes::new())
    }

    pub fn state(&self) -> BodyState {
        BodyState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn closer(&self) -> BodyCloser {
        BodyCloser {
            shared: self.shared.clone(),
        }
    }

    /// Read the next non-empty chunk, `None` once the body is exhausted.
    ///
    /// Reaching EOF produces the trailers before returning. Fails with
    /// [`HttpError::BodyClosed`] if the body is closed first.
    pub async fn read_chunk(&self) -> HttpResult<Option<Bytes>> {
        let shared = &self.shared;
        let mut source = tokio::select! {
            guard = shared.source.lock() => guard,
            () = shared.closing.cancelled() => return Err(HttpError::BodyClosed),
        };
        if shared.closing.is_cancelled() {
            return Err(HttpError::BodyClosed);
        }
        let Some(src) = source.as_mut() else {
            return Ok(None);
        };
        shared.advance(BodyState::Draining);
        loop {
            let next = tokio::select! {
                next = src.next_chunk() => next?,
                () = shared.closing.cancelled() => return Err(HttpError::BodyClosed),
            };
            match next {
                Some(chunk) if chunk.is_empty() => continue,
                Some(chunk) => return Ok(Some(chunk)),
                None => break,
            }
        }
        source.take();
        drop(source);
        shared.advance(BodyState::Exhausted);
        trace!("body exhausted");
        shared.finish().await;
        Ok(None)
    }

    /// Force the trailer transition without draining the body.
    pub async fn finish(&self) {
        self.shared.finish().await;
    }

    /// Release the source and settle trailers. Safe to call repeatedly and
    /// concurrently with [`read_chunk`](Body::read_chunk).
    pub async fn close(&self) {
        self.shared.close().await;
    }

    /// Drain the body into one buffer.
    pub async fn collect(&self) -> HttpResult<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.read_chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Expose the body as a chunk stream that ends at EOF or on the first error.
    pub fn into_stream(self) -> impl Stream<Item = HttpResult<Bytes>> + Send {
        futures::stream::unfold(Some(self), |body| async move {
            let Some(body) = body else {
                return None;
            };
            match body.read_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(body))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl Drop for Body {
    fn drop(&mut self) {
        // No read can be in flight; unblock trailer waiters held elsewhere.
        self.shared.closing.cancel();
        self.shared.advance(BodyState::Closed);
        self.shared.slot.set(HeaderMap::new());
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body").field("state", &self.state()).finish()
    }
}

/// `stream<u8>`: pending, with chunks pumped onto the child stream and the
/// body closed afterwards.
impl Encode for Body {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        put_status(buf, false);
        Ok(Some(Box::new(
            move |mut w: OutgoingStream| -> BoxFuture<'static, WireResult<()>> {
                Box::pin(async move {
                    let pumped = pump(&self, &mut w).await;
                    self.close().await;
                    pumped
                })
            },
        )))
    }
}

async fn pump(body: &Body, w: &mut OutgoingStream) -> WireResult<()> {
    loop {
        match body.read_chunk().await {
            Ok(Some(chunk)) => write_chunk(w, &chunk).await?,
            Ok(None) => break,
            Err(HttpError::Wire(e)) => return Err(e),
            Err(e) => return Err(blastwire_core::WireError::Transport(e.to_string())),
        }
    }
    write_end(w).await?;
    w.shutdown().await?;
    Ok(())
}
