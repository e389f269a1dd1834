//! Wire records of `wrpc:http/incoming-handler`.
//!
//! ```text
//! request  { headers, method, scheme, path-with-query?, authority?,
//!            body: stream<u8>, trailers: future<fields> }
//! response { headers, status, body: stream<u8>, trailers: future<fields> }
//! handle(request) -> result<response, error-code>
//! ```
//!
//! Outgoing records own a [`Body`] that is pumped onto the field's child
//! stream; incoming records bind their body and trailers to child streams
//! and read them lazily.

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use blastwire_core::codec::{Deferred, encode_to_bytes};
use blastwire_core::{
    CallContext, Decode, Encode, IncomingStream, Invoker, OutgoingStream, RecordDecoder,
    RecordEncoder, WireResult, call,
};

use crate::body::{Body, BodySource, TrailerSource};
use crate::header::HeaderMap;
use crate::trailers::Trailers;
use crate::types::{ErrorCode, Method, Scheme};

/// Name of the handler function.
pub const HANDLE: &str = "handle";

pub struct OutgoingRequest {
    pub headers: HeaderMap,
    pub method: Method,
    pub scheme: Scheme,
    pub path_with_query: Option<String>,
    pub authority: Option<String>,
    pub body: Body,
    pub trailers: Trailers,
}

impl Encode for OutgoingRequest {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        Ok(RecordEncoder::new(buf)
            .field("headers", self.headers)?
            .field("method", self.method)?
            .field("scheme", self.scheme)?
            .field("path_with_query", self.path_with_query)?
            .field("authority", self.authority)?
            .field("body", self.body)?
            .field("trailers", self.trailers)?
            .finish())
    }
}

#[derive(Debug)]
pub struct IncomingRequest {
    pub headers: HeaderMap,
    pub method: Method,
    pub scheme: Scheme,
    pub path_with_query: Option<String>,
    pub authority: Option<String>,
    pub body: Body,
    pub trailers: Trailers,
}

#[async_trait]
impl Decode for IncomingRequest {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        let mut rec = RecordDecoder::new(r, path);
        let headers = rec.field("headers").await?;
        let method = rec.field("method").await?;
        let scheme = rec.field("scheme").await?;
        let path_with_query = rec.field("path_with_query").await?;
        let authority = rec.field("authority").await?;
        let body: BodySource = rec.field("body").await?;
        let trailers: TrailerSource = rec.field("trailers").await?;
        let (body, trailers) = Body::new(body, trailers);
        Ok(Self {
            headers,
            method,
            scheme,
            path_with_query,
            authority,
            body,
            trailers,
        })
    }
}

pub struct OutgoingResponse {
    pub headers: HeaderMap,
    pub status: u16,
    pub body: Body,
    pub trailers: Trailers,
}

impl OutgoingResponse {
    /// A response with a buffered body and no trailers.
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<bytes::Bytes>) -> Self {
        let (body, trailers) = Body::from_bytes(body);
        Self {
            headers,
            status,
            body,
            trailers,
        }
    }
}

impl Encode for OutgoingResponse {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        Ok(RecordEncoder::new(buf)
            .field("headers", self.headers)?
            .field("status", self.status)?
            .field("body", self.body)?
            .field("trailers", self.trailers)?
            .finish())
    }
}

#[derive(Debug)]
pub struct IncomingResponse {
    pub headers: HeaderMap,
    pub status: u16,
    pub body: Body,
    pub trailers: Trailers,
}

#[async_trait]
impl Decode for IncomingResponse {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        let mut rec = RecordDecoder::new(r, path);
        let headers = rec.field("headers").await?;
        let status = rec.field("status").await?;
        let body: BodySource = rec.field("body").await?;
        let trailers: TrailerSource = rec.field("trailers").await?;
        let (body, trailers) = Body::new(body, trailers);
        Ok(Self {
            headers,
            status,
            body,
            trailers,
        })
    }
}

/// Call `handle` on `instance`.
///
/// The outer result carries transport and codec failures; the inner one is
/// the handler's own answer.
pub async fn handle(
    cx: &CallContext,
    invoker: &dyn Invoker,
    instance: &str,
    request: OutgoingRequest,
) -> WireResult<Result<IncomingResponse, ErrorCode>> {
    debug!(instance, method = %request.method, "invoking http handler");
    call(cx, invoker, instance, HANDLE, request).await
}

/// Serve side of `handle`: write `response` as the call's result.
pub async fn respond(
    mut results: OutgoingStream,
    response: Result<OutgoingResponse, ErrorCode>,
) -> WireResult<()> {
    let (bytes, deferred) = encode_to_bytes(response)?;
    results.write_all(&bytes).await?;
    if let Some(write) = deferred {
        write(results.index(&[0])?).await?;
    }
    results.shutdown().await?;
    Ok(())
}
