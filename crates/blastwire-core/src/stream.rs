//! Framing for `stream<u8>` and `future<T>` values.
//!
//! Both start with a status byte. [`ASYNC_READY`] means the value follows
//! inline; [`ASYNC_PENDING`] means it travels on the field's child stream,
//! as a sequence of `list<u8>` chunks closed by an empty chunk for streams
//! or as a single encoded `T` for futures.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::codec::{put_len, read_exact_bytes, read_len};
use crate::index::IncomingStream;
use crate::{WireError, WireResult};

pub const ASYNC_PENDING: u8 = 0;
pub const ASYNC_READY: u8 = 1;

/// Write the status byte of an async value.
pub fn put_status(buf: &mut BytesMut, ready: bool) {
    buf.put_u8(if ready { ASYNC_READY } else { ASYNC_PENDING });
}

/// Read the status byte of an async value; `true` when ready.
pub async fn read_status(r: &mut IncomingStream) -> WireResult<bool> {
    use tokio::io::AsyncReadExt;
    match r.read_u8().await? {
        ASYNC_PENDING => Ok(false),
        ASYNC_READY => Ok(true),
        value => Err(WireError::UnknownDiscriminant {
            kind: "async status",
            value: u32::from(value),
        }),
    }
}

/// Write one non-empty chunk of a pending byte stream.
pub async fn write_chunk<W>(w: &mut W, chunk: &[u8]) -> WireResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if chunk.is_empty() {
        return Ok(());
    }
    let mut frame = BytesMut::with_capacity(chunk.len() + 5);
    put_len(&mut frame, chunk.len())?;
    frame.put_slice(chunk);
    trace!(len = chunk.len(), "writing stream chunk");
    w.write_all(&frame).await?;
    Ok(())
}

/// Write the end-of-stream marker of a pending byte stream.
pub async fn write_end<W>(w: &mut W) -> WireResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    trace!("writing stream end");
    w.write_all(&[0]).await?;
    Ok(())
}

/// Read the next chunk of a pending byte stream, `None` at end of stream.
///
/// Only the empty end marker ends the stream; a peer closing the stream
/// before sending it truncated the value and is an error.
pub async fn read_chunk(r: &mut IncomingStream) -> WireResult<Option<Bytes>> {
    let len = match read_len(r).await {
        Ok(len) => len,
        Err(WireError::MalformedVarint("unexpected end of stream")) => {
            return Err(WireError::InvalidValue(
                "byte stream closed before end marker".into(),
            ));
        }
        Err(e) => return Err(e),
    };
    if len == 0 {
        return Ok(None);
    }
    Ok(Some(Bytes::from(read_exact_bytes(r, len).await?)))
}
