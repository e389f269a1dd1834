//! LEB128 variable-length unsigned integers.
//!
//! Each byte carries 7 payload bits, least-significant group first, with the
//! high bit set on every byte except the last. Encoding is canonical: no
//! trailing zero groups are ever produced.

use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{WireError, WireResult};

/// Maximum encoded length of a `u64` (ten 7-bit groups).
pub const MAX_LEN_U64: usize = 10;

/// Append the canonical encoding of `value` to `buf`.
pub fn put_uvarint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Canonical encoding of `value` as an owned byte vector.
pub fn encode(value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_LEN_U64);
    put_uvarint(&mut buf, value);
    buf
}

/// Number of bytes [`encode`] produces for `value`.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Incremental decoder state shared by the slice and stream readers.
#[derive(Debug, Default)]
struct Accumulator {
    value: u64,
    shift: u32,
}

impl Accumulator {
    fn push(&mut self, byte: u8) -> WireResult<Option<u64>> {
        // The tenth group only has room for the top bit of a u64.
        if self.shift == 63 && byte > 1 {
            return Err(WireError::MalformedVarint("overflows 64 bits"));
        }
        self.value |= u64::from(byte & 0x7f) << self.shift;
        if byte & 0x80 == 0 {
            return Ok(Some(self.value));
        }
        self.shift += 7;
        Ok(None)
    }
}

/// Decode a varint from the front of `src`, returning the value and the
/// number of bytes consumed.
pub fn decode(src: &[u8]) -> WireResult<(u64, usize)> {
    let mut acc = Accumulator::default();
    for (i, byte) in src.iter().enumerate() {
        if let Some(value) = acc.push(*byte)? {
            return Ok((value, i + 1));
        }
    }
    Err(WireError::MalformedVarint("unexpected end of input"))
}

/// Read a varint from an async byte source.
pub async fn read_uvarint<R>(r: &mut R) -> WireResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut acc = Accumulator::default();
    loop {
        let byte = match r.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(WireError::MalformedVarint("unexpected end of stream"));
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(value) = acc.push(byte)? {
            return Ok(value);
        }
    }
}

/// Read a varint that must fit in 32 bits.
pub async fn read_u32<R>(r: &mut R) -> WireResult<u32>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let value = read_uvarint(r).await?;
    u32::try_from(value).map_err(|_| WireError::MalformedVarint("overflows 32 bits"))
}

/// Read a varint that must fit in 16 bits.
pub async fn read_u16<R>(r: &mut R) -> WireResult<u16>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let value = read_uvarint(r).await?;
    u16::try_from(value).map_err(|_| WireError::MalformedVarint("overflows 16 bits"))
}
