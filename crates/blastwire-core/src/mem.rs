//! In-process indexed transport.
//!
//! Each direction of a call is a [`Hub`] of one-way pipes keyed by index
//! path. A writer or reader handle claims its pipe end lazily, on first I/O,
//! so deriving a parent handle just to reach its children costs nothing.
//! Each end can be claimed once; a second claim fails with
//! [`WireError::StreamTaken`]. Shutting down (or dropping) a writer yields
//! EOF on the paired reader.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::index::{IncomingStream, IndexRead, IndexWrite, OutgoingStream};
use crate::invoke::Invoker;
use crate::{WireError, WireResult};

/// Default per-pipe buffer size (64 KB).
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
enum Side {
    Writer,
    Reader,
}

#[derive(Debug)]
struct Pipe {
    writer: Option<DuplexStream>,
    reader: Option<DuplexStream>,
}

/// Path-addressed set of one-way pipes for one direction of a call.
#[derive(Debug)]
struct Hub {
    capacity: usize,
    pipes: Mutex<HashMap<Vec<u32>, Pipe>>,
}

impl Hub {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            pipes: Mutex::new(HashMap::new()),
        })
    }

    fn claim(&self, path: &[u32], side: Side) -> WireResult<DuplexStream> {
        let mut pipes = self.pipes.lock().unwrap_or_else(PoisonError::into_inner);
        let pipe = pipes.entry(path.to_vec()).or_insert_with(|| {
            let (writer, reader) = tokio::io::duplex(self.capacity);
            Pipe {
                writer: Some(writer),
                reader: Some(reader),
            }
        });
        let end = match side {
            Side::Writer => pipe.writer.take(),
            Side::Reader => pipe.reader.take(),
        };
        end.ok_or_else(|| WireError::StreamTaken(path.to_vec()))
    }
}

fn join_path(base: &[u32], rest: &[u32]) -> Vec<u32> {
    let mut path = Vec::with_capacity(base.len() + rest.len());
    path.extend_from_slice(base);
    path.extend_from_slice(rest);
    path
}

// ── Writer ──────────────────────────────────────────────────────────

/// Writing end of an in-memory indexed stream.
#[derive(Debug)]
pub struct MemWriter {
    hub: Arc<Hub>,
    path: Vec<u32>,
    stream: Option<DuplexStream>,
}

impl MemWriter {
    fn new(hub: Arc<Hub>, path: Vec<u32>) -> Self {
        Self {
            hub,
            path,
            stream: None,
        }
    }

    fn stream(&mut self) -> io::Result<&mut DuplexStream> {
        if self.stream.is_none() {
            let stream = self.hub.claim(&self.path, Side::Writer).map_err(io::Error::other)?;
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::other("writer stream unavailable"))
    }
}

impl AsyncWrite for MemWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().stream() {
            Ok(stream) => Pin::new(stream).poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stream() {
            Ok(stream) => Pin::new(stream).poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stream() {
            Ok(stream) => Pin::new(stream).poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl IndexWrite for MemWriter {
    fn index(&self, path: &[u32]) -> WireResult<OutgoingStream> {
        Ok(Box::new(MemWriter::new(
            self.hub.clone(),
            join_path(&self.path, path),
        )))
    }
}

// ── Reader ──────────────────────────────────────────────────────────

/// Reading end of an in-memory indexed stream.
#[derive(Debug)]
pub struct MemReader {
    hub: Arc<Hub>,
    path: Vec<u32>,
    stream: Option<DuplexStream>,
    closed: bool,
}

impl MemReader {
    fn new(hub: Arc<Hub>, path: Vec<u32>) -> Self {
        Self {
            hub,
            path,
            stream: None,
            closed: false,
        }
    }
}

impl AsyncRead for MemReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Ok(()));
        }
        if this.stream.is_none() {
            match this.hub.claim(&this.path, Side::Reader) {
                Ok(stream) => this.stream = Some(stream),
                Err(e) => return Poll::Ready(Err(io::Error::other(e))),
            }
        }
        match this.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Err(io::Error::other("reader stream unavailable"))),
        }
    }
}

impl IndexRead for MemReader {
    fn index(&self, path: &[u32]) -> WireResult<IncomingStream> {
        Ok(Box::new(MemReader::new(
            self.hub.clone(),
            join_path(&self.path, path),
        )))
    }

    fn close(&mut self) -> WireResult<()> {
        self.closed = true;
        self.stream.take();
        Ok(())
    }
}

/// A connected outgoing/incoming stream pair backed by a fresh hub.
pub fn pipe() -> (OutgoingStream, IncomingStream) {
    pipe_with_capacity(DEFAULT_CAPACITY)
}

/// Like [`pipe`] with an explicit per-pipe buffer size.
pub fn pipe_with_capacity(capacity: usize) -> (OutgoingStream, IncomingStream) {
    let hub = Hub::new(capacity);
    (
        Box::new(MemWriter::new(hub.clone(), Vec::new())),
        Box::new(MemReader::new(hub, Vec::new())),
    )
}

// ── Invoker ─────────────────────────────────────────────────────────

/// The remote side's view of one in-memory call.
pub struct Invocation {
    pub instance: String,
    pub function: String,
    /// Parameter bytes (root) and deferred parameter parts (children).
    pub params: IncomingStream,
    /// Result bytes (root) and deferred result parts (children).
    pub results: OutgoingStream,
}

type Handler = Arc<dyn Fn(Invocation) -> BoxFuture<'static, WireResult<()>> + Send + Sync>;

/// An [`Invoker`] whose remote side is an async handler running in-process.
#[derive(Clone)]
pub struct MemoryInvoker {
    handler: Handler,
    capacity: usize,
}

impl MemoryInvoker {
    /// Serve every invocation with `handler`, spawned on the current runtime.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WireResult<()>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |invocation| Box::pin(handler(invocation))),
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Builder method: set the per-pipe buffer size.
    pub fn with_capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }
}

impl std::fmt::Debug for MemoryInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryInvoker")
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[async_trait]
impl Invoker for MemoryInvoker {
    async fn invoke(
        &self,
        _cx: &CallContext,
        instance: &str,
        function: &str,
        params: Bytes,
    ) -> WireResult<(OutgoingStream, IncomingStream)> {
        let (mut outgoing, server_params) = pipe_with_capacity(self.capacity);
        let (server_results, incoming) = pipe_with_capacity(self.capacity);

        let invocation = Invocation {
            instance: instance.to_string(),
            function: function.to_string(),
            params: server_params,
            results: server_results,
        };
        debug!(instance, function, params = params.len(), "dispatching in-memory invocation");

        let handler = self.handler.clone();
        let (instance, function) = (instance.to_string(), function.to_string());
        tokio::spawn(async move {
            if let Err(e) = handler(invocation).await {
                warn!(%instance, %function, error = %e, "in-memory handler failed");
            }
        });

        outgoing.write_all(&params).await?;
        Ok((outgoing, incoming))
    }
}
