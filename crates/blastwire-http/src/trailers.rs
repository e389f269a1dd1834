//! Single-assignment trailer cell.
//!
//! A [`TrailerSlot`] is written at most once; every [`Trailers`] handle
//! waits for that write. Dropping the slot without writing settles all
//! waiters with an empty header map.

use bytes::BytesMut;
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::trace;

use blastwire_core::codec::{Deferred, encode_to_bytes};
use blastwire_core::stream::put_status;
use blastwire_core::{Encode, OutgoingStream, WireResult};

use crate::header::HeaderMap;

/// The writing side of a trailer cell.
#[derive(Debug)]
pub struct TrailerSlot {
    tx: watch::Sender<Option<HeaderMap>>,
}

impl TrailerSlot {
    /// Store `trailers` unless already set. Returns `true` if this call won.
    pub fn set(&self, trailers: HeaderMap) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(trailers);
            true
        })
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// A handle on trailers that become available once.
#[derive(Debug, Clone)]
pub struct Trailers {
    rx: watch::Receiver<Option<HeaderMap>>,
}

impl Trailers {
    /// A new pending cell.
    pub fn pending() -> (TrailerSlot, Trailers) {
        let (tx, rx) = watch::channel(None);
        (TrailerSlot { tx }, Trailers { rx })
    }

    /// Trailers that are already available.
    pub fn ready(trailers: HeaderMap) -> Self {
        let (tx, rx) = watch::channel(Some(trailers));
        drop(tx);
        Self { rx }
    }

    /// Wait for the trailers. Resolves to an empty map if the slot is
    /// dropped unset.
    pub async fn receive(&self) -> HeaderMap {
        let mut rx = self.rx.clone();
        let ready = rx.wait_for(Option::is_some).await.map(|value| value.clone());
        match ready {
            Ok(trailers) => trailers.unwrap_or_default(),
            Err(_) => self.rx.borrow().clone().unwrap_or_default(),
        }
    }

    /// The trailers, if already available.
    pub fn try_get(&self) -> Option<HeaderMap> {
        self.rx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

/// `future<fields>`: pending, with the fields written on the child stream
/// once they become available.
impl Encode for Trailers {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        put_status(buf, false);
        Ok(Some(Box::new(
            move |mut w: OutgoingStream| -> BoxFuture<'static, WireResult<()>> {
                Box::pin(async move {
                    let trailers = self.receive().await;
                    trace!(count = trailers.len(), "writing trailers");
                    let (bytes, _) = encode_to_bytes(trailers.to_fields())?;
                    w.write_all(&bytes).await?;
                    w.shutdown().await?;
                    Ok(())
                })
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample() -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("X-Checksum", "abc");
        map
    }

    #[tokio::test]
    async fn receive_blocks_until_set() {
        let (slot, trailers) = Trailers::pending();
        assert!(!trailers.is_ready());

        let waiting = tokio::time::timeout(Duration::from_millis(20), trailers.receive()).await;
        assert!(waiting.is_err(), "must block while pending");

        assert!(slot.set(sample()));
        assert_eq!(trailers.receive().await, sample());
    }

    #[tokio::test]
    async fn only_first_set_wins() {
        let (slot, trailers) = Trailers::pending();
        assert!(slot.set(sample()));
        assert!(!slot.set(HeaderMap::new()));
        assert_eq!(trailers.try_get(), Some(sample()));
    }

    #[tokio::test]
    async fn dropped_slot_settles_empty() {
        let (slot, trailers) = Trailers::pending();
        let waiter = tokio::spawn({
            let trailers = trailers.clone();
            async move { trailers.receive().await }
        });
        drop(slot);
        assert!(waiter.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ready_trailers_resolve_immediately() {
        let trailers = Trailers::ready(sample());
        assert!(trailers.is_ready());
        assert_eq!(trailers.receive().await, sample());
    }
}
