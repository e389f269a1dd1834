//! Fan-out of deferred writers onto child streams.
//!
//! Every composite encoder (records, lists, tuples) collects its deferred
//! writers as `(index, writer)` pairs and hands them to [`fan_out`], which
//! produces a single aggregate writer. When invoked with a parent stream the
//! aggregate derives one child per index, runs each writer on its own task,
//! waits for all of them and reports the first failure it observes.

use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::codec::Deferred;
use crate::index::OutgoingStream;
use crate::{WireError, WireResult};

/// Combine indexed deferred writers into one, or `None` if there are none.
pub fn fan_out(writes: Vec<(u32, Deferred)>) -> Option<Deferred> {
    if writes.is_empty() {
        return None;
    }
    Some(Box::new(
        move |parent: OutgoingStream| -> BoxFuture<'static, WireResult<()>> {
            Box::pin(run(parent, writes))
        },
    ))
}

/// Run `writes` concurrently against children of `parent` and join them.
///
/// Dropping the returned future aborts every writer still in flight.
pub async fn run(parent: OutgoingStream, writes: Vec<(u32, Deferred)>) -> WireResult<()> {
    let mut tasks = JoinSet::new();
    for (index, write) in writes {
        let child = parent.index(&[index])?;
        trace!(index, "spawning deferred writer");
        tasks.spawn(async move { (index, write(child).await) });
    }
    drop(parent);

    let mut first: Option<WireError> = None;
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                first.get_or_insert(WireError::Task(e.to_string()));
                continue;
            }
        };
        if let Err(e) = result {
            if first.is_none() {
                first = Some(e);
            } else {
                debug!(index, error = %e, "additional deferred writer failed");
            }
        }
    }
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
