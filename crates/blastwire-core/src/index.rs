//! Index-addressable stream capabilities.
//!
//! A transport hands out one outgoing and one incoming stream per call. Any
//! value that is too large or too lazy to inline (a byte stream, a future)
//! lives on a child stream derived from its parent by a path of indices:
//! field 5 of the record passed as parameter 0 is at `[0, 5]`.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::WireResult;

/// Boxed outgoing stream as handed out by an [`Invoker`](crate::Invoker).
pub type OutgoingStream = Box<dyn IndexWrite>;

/// Boxed incoming stream as handed out by an [`Invoker`](crate::Invoker).
pub type IncomingStream = Box<dyn IndexRead>;

/// A writable stream from which child streams can be derived.
pub trait IndexWrite: AsyncWrite + Send + Unpin {
    /// Derive the child stream at `path`, relative to this stream.
    fn index(&self, path: &[u32]) -> WireResult<OutgoingStream>;
}

/// A readable stream from which child streams can be derived.
pub trait IndexRead: AsyncRead + Send + Unpin {
    /// Derive the child stream at `path`, relative to this stream.
    fn index(&self, path: &[u32]) -> WireResult<IncomingStream>;

    /// Release the stream once fully consumed.
    fn close(&mut self) -> WireResult<()> {
        Ok(())
    }
}

/// `path` extended by one trailing index.
pub fn child_path(path: &[u32], index: u32) -> Vec<u32> {
    let mut child = Vec::with_capacity(path.len() + 1);
    child.extend_from_slice(path);
    child.push(index);
    child
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_path_appends() {
        assert_eq!(child_path(&[], 0), vec![0]);
        assert_eq!(child_path(&[0, 5], 2), vec![0, 5, 2]);
    }
}
