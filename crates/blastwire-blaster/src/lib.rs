//! blastwire-blaster — synthetic load against `xk6:wrpc/blaster`.
//!
//! Each [`BlasterClient::blast`] sends one [`Packet`] telling the remote
//! component how long to sleep, spin and hold memory. Only the call itself
//! is modelled here; the workload lives in the component.

pub mod client;
mod error;
pub mod packet;

pub use client::{BlastOptions, BlasterClient, BlockingBlasterClient, blast};
pub use error::{BlastError, BlastResult};
pub use packet::Packet;
