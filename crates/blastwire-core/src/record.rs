//! Record encoding and decoding.
//!
//! A record is a fixed sequence of named fields. Each field's immediate
//! bytes are written to the shared buffer in declaration order; fields that
//! defer are collected by position and fanned out onto child streams.
//!
//! ```text
//! RecordEncoder::new(buf)
//!     .field("id", id)?          // index 0, inline
//!     .field("body", body)?      // index 1, deferred → child [.., 1]
//!     .finish()                  // Option<Deferred>
//! ```

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{Decode, Deferred, Encode};
use crate::fanout::fan_out;
use crate::index::{IncomingStream, child_path};
use crate::{WireError, WireResult};

/// Writes the fields of one record.
pub struct RecordEncoder<'a> {
    buf: &'a mut BytesMut,
    next: u32,
    deferred: Vec<(u32, Deferred)>,
}

impl<'a> RecordEncoder<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self {
            buf,
            next: 0,
            deferred: Vec::new(),
        }
    }

    /// Encode the next field. Errors are tagged with `name`.
    pub fn field<T: Encode>(mut self, name: &'static str, value: T) -> WireResult<Self> {
        let index = self.next;
        trace!(field = name, index, "writing field");
        if let Some(write) = value
            .encode(self.buf)
            .map_err(|e| WireError::field(name, e))?
        {
            self.deferred.push((index, write));
        }
        self.next += 1;
        Ok(self)
    }

    /// Finish the record, returning the aggregate writer for deferred fields.
    pub fn finish(self) -> Option<Deferred> {
        fan_out(self.deferred)
    }
}

/// Reads the fields of one record at `path`.
pub struct RecordDecoder<'a> {
    r: &'a mut IncomingStream,
    path: &'a [u32],
    next: u32,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(r: &'a mut IncomingStream, path: &'a [u32]) -> Self {
        Self { r, path, next: 0 }
    }

    /// Decode the next field. Deferred parts bind to the field's child path.
    pub async fn field<T: Decode>(&mut self, name: &'static str) -> WireResult<T> {
        let index = self.next;
        self.next += 1;
        trace!(field = name, index, "reading field");
        T::decode(self.r, &child_path(self.path, index))
            .await
            .map_err(|e| WireError::field(name, e))
    }
}
