//! blastwire-core — value codec and indexed-stream plumbing for wRPC calls.
//!
//! Provides the pieces every typed remote call is built from:
//! - **varint**: LEB128 unsigned integers
//! - **codec**: [`Encode`] / [`Decode`] for scalars, strings, byte lists, lists,
//!   options, tuples and results
//! - **record**: field-ordered record encoding with deferred sub-writes
//! - **fanout**: spawn-and-join of deferred writers with first-error-wins
//! - **index**: index-addressable stream capabilities supplied by a transport
//! - **invoke**: the [`Invoker`] seam, [`CallContext`] and the generic [`call`]
//! - **mem**: an in-process indexed transport
//! - **config** / **telemetry**: TOML configuration and tracing setup
//!
//! # Immediate vs deferred bytes
//!
//! ```text
//! encode(record, buf)
//!   → every field writes its immediate bytes to `buf`, in declaration order
//!   → fields holding streams or futures hand back a deferred writer
//! deferred(parent)
//!   → parent.index([field]) per deferred field, each written on its own task
//!   → join, surfacing the first error
//! ```

pub mod codec;
pub mod config;
pub mod context;
mod error;
pub mod fanout;
pub mod index;
pub mod invoke;
pub mod mem;
pub mod record;
pub mod stats;
pub mod stream;
pub mod telemetry;
pub mod varint;

pub use codec::{Decode, Deferred, Encode};
pub use context::CallContext;
pub use error::{WireError, WireResult};
pub use index::{IncomingStream, IndexRead, IndexWrite, OutgoingStream};
pub use invoke::{Invoker, call};
pub use record::{RecordDecoder, RecordEncoder};
