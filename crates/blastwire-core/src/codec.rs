//! Value encoding and decoding.
//!
//! [`Encode`] writes a value's immediate bytes into a synchronous buffer and
//! optionally returns a [`Deferred`] writer for the parts that must travel on
//! child streams. [`Decode`] mirrors it: immediate bytes come from the primary
//! stream, deferred parts are bound to child streams addressed by `path`.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use futures::future::BoxFuture;
use tokio::io::AsyncReadExt;
use tracing::trace;

use crate::fanout::fan_out;
use crate::index::{IncomingStream, OutgoingStream, child_path};
use crate::varint;
use crate::{WireError, WireResult};

/// Upper bound on speculative preallocation for untrusted lengths.
const PREALLOC_LIMIT: usize = 64 * 1024;

/// A write step executed later against an index-addressed child stream.
pub type Deferred = Box<dyn FnOnce(OutgoingStream) -> BoxFuture<'static, WireResult<()>> + Send>;

/// Types that can be written to the wire.
pub trait Encode {
    /// Append immediate bytes to `buf`, returning a deferred writer for any
    /// part of the value that is not inlined.
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>>;
}

/// Types that can be read from the wire.
#[async_trait]
pub trait Decode: Sized + Send {
    /// Read the value from `r`. Deferred parts live on children of `r` at
    /// `path` (extended by field or element index for nested values).
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self>;
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Validate that a string or list length fits the 32-bit length prefix.
pub fn check_len(len: usize) -> WireResult<u32> {
    u32::try_from(len).map_err(|_| WireError::LengthOverflow(len))
}

/// Write a 32-bit length prefix.
pub fn put_len(buf: &mut BytesMut, len: usize) -> WireResult<u32> {
    let n = check_len(len)?;
    trace!(len = n, "writing length");
    varint::put_uvarint(buf, u64::from(n));
    Ok(n)
}

/// Write a variant or enum discriminant.
pub fn put_discriminant(buf: &mut BytesMut, discriminant: u32) {
    varint::put_uvarint(buf, u64::from(discriminant));
}

/// Encode a value that must not produce deferred writes.
pub fn encode_sync<T: Encode>(value: T, buf: &mut BytesMut, name: &'static str) -> WireResult<()> {
    match value.encode(buf)? {
        None => Ok(()),
        Some(_) => Err(WireError::UnexpectedDeferred(name)),
    }
}

/// Encode a value into a fresh buffer, returning its bytes and any deferred writer.
pub fn encode_to_bytes<T: Encode>(value: T) -> WireResult<(Bytes, Option<Deferred>)> {
    let mut buf = BytesMut::new();
    let deferred = value.encode(&mut buf)?;
    Ok((buf.freeze(), deferred))
}

/// Read a variant or enum discriminant.
pub async fn read_discriminant(r: &mut IncomingStream) -> WireResult<u32> {
    varint::read_u32(r).await
}

/// Read a 32-bit length prefix.
pub async fn read_len(r: &mut IncomingStream) -> WireResult<usize> {
    Ok(varint::read_u32(r).await? as usize)
}

/// Read a single `0`/`1` flag byte.
pub async fn read_flag(r: &mut IncomingStream, kind: &'static str) -> WireResult<bool> {
    match r.read_u8().await? {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(WireError::UnknownDiscriminant {
            kind,
            value: u32::from(value),
        }),
    }
}

/// Read exactly `len` raw bytes without trusting `len` for allocation.
pub async fn read_exact_bytes(r: &mut IncomingStream, len: usize) -> WireResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    (&mut *r).take(len as u64).read_to_end(&mut buf).await?;
    if buf.len() != len {
        return Err(WireError::InvalidValue(format!(
            "expected {len} bytes, stream ended after {}",
            buf.len()
        )));
    }
    Ok(buf)
}

// ── Scalars ─────────────────────────────────────────────────────────

impl Encode for u8 {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        buf.put_u8(self);
        Ok(None)
    }
}

#[async_trait]
impl Decode for u8 {
    async fn decode(r: &mut IncomingStream, _path: &[u32]) -> WireResult<Self> {
        Ok(r.read_u8().await?)
    }
}

impl Encode for u16 {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        varint::put_uvarint(buf, u64::from(self));
        Ok(None)
    }
}

#[async_trait]
impl Decode for u16 {
    async fn decode(r: &mut IncomingStream, _path: &[u32]) -> WireResult<Self> {
        varint::read_u16(r).await
    }
}

impl Encode for u32 {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        varint::put_uvarint(buf, u64::from(self));
        Ok(None)
    }
}

#[async_trait]
impl Decode for u32 {
    async fn decode(r: &mut IncomingStream, _path: &[u32]) -> WireResult<Self> {
        varint::read_u32(r).await
    }
}

impl Encode for u64 {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        trace!("writing u64");
        varint::put_uvarint(buf, self);
        Ok(None)
    }
}

#[async_trait]
impl Decode for u64 {
    async fn decode(r: &mut IncomingStream, _path: &[u32]) -> WireResult<Self> {
        varint::read_uvarint(r).await
    }
}

impl Encode for () {
    fn encode(self, _buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        Ok(None)
    }
}

#[async_trait]
impl Decode for () {
    async fn decode(_r: &mut IncomingStream, _path: &[u32]) -> WireResult<Self> {
        Ok(())
    }
}

// ── Strings and byte lists ──────────────────────────────────────────

impl Encode for &str {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        put_len(buf, self.len())?;
        trace!("writing string bytes");
        buf.put_slice(self.as_bytes());
        Ok(None)
    }
}

impl Encode for String {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        self.as_str().encode(buf)
    }
}

#[async_trait]
impl Decode for String {
    async fn decode(r: &mut IncomingStream, _path: &[u32]) -> WireResult<Self> {
        let len = read_len(r).await?;
        let bytes = read_exact_bytes(r, len).await?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// `list<u8>`, written as a length prefix followed by the raw bytes.
impl Encode for Bytes {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        put_len(buf, self.len())?;
        buf.put_slice(&self);
        Ok(None)
    }
}

#[async_trait]
impl Decode for Bytes {
    async fn decode(r: &mut IncomingStream, _path: &[u32]) -> WireResult<Self> {
        let len = read_len(r).await?;
        Ok(Bytes::from(read_exact_bytes(r, len).await?))
    }
}

// ── Composites ──────────────────────────────────────────────────────

impl<T: Encode> Encode for Option<T> {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        match self {
            None => {
                buf.put_u8(0);
                Ok(None)
            }
            Some(value) => {
                buf.put_u8(1);
                value.encode(buf)
            }
        }
    }
}

#[async_trait]
impl<T: Decode> Decode for Option<T> {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        if read_flag(r, "option").await? {
            Ok(Some(T::decode(r, path).await?))
        } else {
            Ok(None)
        }
    }
}

impl<T: Encode, E: Encode> Encode for Result<T, E> {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        match self {
            Ok(value) => {
                buf.put_u8(0);
                value.encode(buf)
            }
            Err(err) => {
                buf.put_u8(1);
                err.encode(buf)
            }
        }
    }
}

#[async_trait]
impl<T: Decode, E: Decode> Decode for Result<T, E> {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        if read_flag(r, "result").await? {
            Ok(Err(E::decode(r, path).await?))
        } else {
            Ok(Ok(T::decode(r, path).await?))
        }
    }
}

/// `list<T>`: a length prefix, then each element. Elements that defer are
/// written on the child stream at their position in the list.
impl<T: Encode> Encode for Vec<T> {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        put_len(buf, self.len())?;
        trace!("writing list elements");
        let mut deferred = Vec::new();
        for (i, element) in self.into_iter().enumerate() {
            // `put_len` bounded the length to u32.
            let index = i as u32;
            if let Some(write) = element
                .encode(buf)
                .map_err(|e| WireError::element(index, e))?
            {
                deferred.push((index, write));
            }
        }
        Ok(fan_out(deferred))
    }
}

#[async_trait]
impl<T: Decode> Decode for Vec<T> {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        let len = read_len(r).await?;
        let mut elements = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        for i in 0..len {
            let index = i as u32;
            let element = T::decode(r, &child_path(path, index))
                .await
                .map_err(|e| WireError::element(index, e))?;
            elements.push(element);
        }
        Ok(elements)
    }
}

/// A pair behaves as a two-field record.
impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        let mut deferred = Vec::new();
        if let Some(write) = self.0.encode(buf).map_err(|e| WireError::field("0", e))? {
            deferred.push((0, write));
        }
        if let Some(write) = self.1.encode(buf).map_err(|e| WireError::field("1", e))? {
            deferred.push((1, write));
        }
        Ok(fan_out(deferred))
    }
}

#[async_trait]
impl<A: Decode, B: Decode> Decode for (A, B) {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        let a = A::decode(r, &child_path(path, 0))
            .await
            .map_err(|e| WireError::field("0", e))?;
        let b = B::decode(r, &child_path(path, 1))
            .await
            .map_err(|e| WireError::field("1", e))?;
        Ok((a, b))
    }
}
