//! The transport seam and the generic typed call built on it.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, trace};

use crate::codec::{Decode, Deferred, Encode, encode_to_bytes};
use crate::context::CallContext;
use crate::index::{IncomingStream, OutgoingStream};
use crate::{WireError, WireResult};

/// Performs one named remote call given pre-encoded parameter bytes.
///
/// Implementations deliver `params` and hand back the call's outgoing
/// stream (for deferred parameter parts) and incoming stream (for results).
/// Connection and delivery failures are reported as
/// [`WireError::Transport`].
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        cx: &CallContext,
        instance: &str,
        function: &str,
        params: Bytes,
    ) -> WireResult<(OutgoingStream, IncomingStream)>;
}

/// Invoke `instance.function` with one parameter and decode one result.
///
/// Deferred parts of `params` are written on outgoing index `[0]` by a
/// spawned task while the result is decoded from incoming children of
/// `[0]`. The call returns as soon as the result is decoded; the parameter
/// writer keeps running, bounded by `cx`, since the peer may answer before
/// consuming every parameter part. If decoding fails and the writer has
/// already failed, the writer's error is returned.
pub async fn call<P, R>(
    cx: &CallContext,
    invoker: &dyn Invoker,
    instance: &str,
    function: &str,
    params: P,
) -> WireResult<R>
where
    P: Encode,
    R: Decode,
{
    let (bytes, deferred) = encode_to_bytes(params)?;
    trace!(instance, function, len = bytes.len(), "encoded parameters");

    cx.run(async move {
        let (outgoing, mut incoming) = invoker.invoke(cx, instance, function, bytes).await?;
        let sender = tokio::spawn(send_params(cx.clone(), outgoing, deferred));

        let result = R::decode(&mut incoming, &[0]).await;
        if let Err(e) = incoming.close() {
            error!(error = %e, "failed to close incoming stream");
        }
        let outcome: WireResult<R> = match result {
            Ok(value) => Ok(value),
            Err(e) if sender.is_finished() => match sender.await {
                Ok(Err(send_err)) => {
                    debug!(error = %e, "result decoding failed after parameter write failure");
                    Err(send_err)
                }
                _ => Err(e),
            },
            Err(e) => {
                sender.abort();
                Err(e)
            }
        };
        outcome
    })
    .await
}

/// Write deferred parameter parts and close the outgoing stream.
async fn send_params(
    cx: CallContext,
    mut outgoing: OutgoingStream,
    deferred: Option<Deferred>,
) -> WireResult<()> {
    let sent = match deferred {
        Some(write) => match outgoing.index(&[0]) {
            Ok(child) => cx.run(write(child)).await,
            Err(e) => Err(e),
        },
        None => Ok(()),
    };
    if let Err(e) = &sent {
        debug!(error = %e, "deferred parameter write failed");
    }
    if let Err(e) = outgoing.shutdown().await {
        debug!(error = %e, "failed to close outgoing stream");
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{Invocation, MemoryInvoker};
    use std::time::Duration;

    struct Refusing;

    #[async_trait]
    impl Invoker for Refusing {
        async fn invoke(
            &self,
            _cx: &CallContext,
            _instance: &str,
            _function: &str,
            _params: Bytes,
        ) -> WireResult<(OutgoingStream, IncomingStream)> {
            Err(WireError::Transport("connection refused".into()))
        }
    }

    fn doubling() -> MemoryInvoker {
        MemoryInvoker::new(|mut inv: Invocation| async move {
            let n = u32::decode(&mut inv.params, &[0]).await?;
            let (bytes, _) = encode_to_bytes(u64::from(n) * 2)?;
            inv.results.write_all(&bytes).await?;
            inv.results.shutdown().await?;
            Ok::<_, WireError>(())
        })
    }

    #[tokio::test]
    async fn typed_call_roundtrips() {
        let cx = CallContext::with_timeout(Duration::from_secs(5));
        let doubled: u64 = call(&cx, &doubling(), "test:math/double@0.1.0", "double", 21u32)
            .await
            .unwrap();
        assert_eq!(doubled, 42);
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced() {
        let cx = CallContext::background();
        let err = call::<_, ()>(&cx, &Refusing, "test:x/y@0.1.0", "f", ())
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let silent = MemoryInvoker::new(|inv: Invocation| async move {
            // Hold the result stream open without ever answering.
            let _results = inv.results;
            std::future::pending::<()>().await;
            Ok::<_, WireError>(())
        });
        let cx = CallContext::with_timeout(Duration::from_millis(20));
        let err = call::<_, u32>(&cx, &silent, "test:x/y@0.1.0", "f", ())
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::Timeout(_)));
    }

    /// A parameter whose only content is `len` bytes on its child stream.
    struct Flood(usize);

    impl Encode for Flood {
        fn encode(self, _buf: &mut bytes::BytesMut) -> WireResult<Option<Deferred>> {
            Ok(Some(Box::new(
                move |mut w: OutgoingStream| -> futures::future::BoxFuture<'static, WireResult<()>> {
                    Box::pin(async move {
                        w.write_all(&vec![7u8; self.0]).await?;
                        w.shutdown().await?;
                        Ok(())
                    })
                },
            )))
        }
    }

    #[tokio::test]
    async fn answer_before_parameters_are_drained_returns_promptly() {
        let rejecting = MemoryInvoker::new(|mut inv: Invocation| async move {
            let (bytes, _) = encode_to_bytes(13u32)?;
            inv.results.write_all(&bytes).await?;
            inv.results.shutdown().await?;
            // Keep the parameter streams alive without ever reading them.
            let _params = inv.params;
            std::future::pending::<()>().await;
            Ok::<_, WireError>(())
        });
        let cx = CallContext::with_timeout(Duration::from_secs(5));
        let started = std::time::Instant::now();
        let answer: u32 = call(&cx, &rejecting, "test:x/y@0.1.0", "f", Flood(1 << 20))
            .await
            .unwrap();
        assert_eq!(answer, 13);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
