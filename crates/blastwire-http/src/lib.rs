//! blastwire-http — HTTP over wRPC.
//!
//! Maps host HTTP calls onto the `wrpc:http/incoming-handler` `handle`
//! function. Request and response bodies travel as `stream<u8>` and
//! trailers as `future<fields>` on indexed child streams:
//!
//! ```text
//! params  [0]      request record (immediate fields)
//!         [0, 5]   request body chunks
//!         [0, 6]   request trailers
//! results [0]      result<response, error-code>
//!         [0, 2]   response body chunks
//!         [0, 3]   response trailers
//! ```

pub mod adapter;
pub mod body;
pub mod client;
mod error;
pub mod header;
pub mod trailers;
pub mod types;
pub mod wire;

pub use adapter::{BasicAuth, HostResponse, RequestBody, RequestOptions};
pub use body::{Body, BodyState, ByteStream};
pub use client::{BlockingHttpClient, HttpClient};
pub use error::{HttpError, HttpResult};
pub use header::{Header, HeaderMap};
pub use trailers::{TrailerSlot, Trailers};
pub use types::{ErrorCode, Method, Scheme};
pub use wire::{IncomingRequest, IncomingResponse, OutgoingRequest, OutgoingResponse};
