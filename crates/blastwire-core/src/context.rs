//! Deadline and cancellation carried through a call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{WireError, WireResult};

/// Per-call context: an optional deadline plus a cancellation token.
///
/// Clones share the token, so cancelling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl CallContext {
    /// A context that never expires on its own.
    pub fn background() -> Self {
        Self {
            deadline: None,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            timeout: Some(timeout),
            cancel: CancellationToken::new(),
        }
    }

    /// A child context sharing this one's cancellation, with the earlier of
    /// the two deadlines.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        match self.deadline {
            Some(parent) if parent <= deadline => Self {
                cancel: self.cancel.child_token(),
                ..self.clone()
            },
            _ => Self {
                deadline: Some(deadline),
                timeout: Some(timeout),
                cancel: self.cancel.child_token(),
            },
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive `fut` to completion unless the deadline passes or the context
    /// is cancelled first. The losing future is dropped.
    pub async fn run<F, T>(&self, fut: F) -> WireResult<T>
    where
        F: Future<Output = WireResult<T>>,
    {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            result = fut => result,
            () = expired => {
                let timeout = self.timeout.unwrap_or_default();
                debug!(?timeout, "call deadline exceeded");
                Err(WireError::Timeout(timeout))
            }
            () = self.cancel.cancelled() => {
                debug!("call cancelled");
                Err(WireError::Cancelled)
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_before_deadline() {
        let cx = CallContext::with_timeout(Duration::from_secs(5));
        let value = cx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_work_times_out() {
        let cx = CallContext::with_timeout(Duration::from_millis(50));
        let result: WireResult<()> = cx.run(std::future::pending()).await;
        assert!(matches!(result, Err(WireError::Timeout(d)) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn cancellation_unblocks_pending_work() {
        let cx = CallContext::background();
        let canceller = cx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let result: WireResult<()> = cx.run(std::future::pending()).await;
        assert!(matches!(result, Err(WireError::Cancelled)));
        assert!(cx.is_cancelled());
    }

    #[tokio::test]
    async fn child_keeps_earlier_parent_deadline() {
        let parent = CallContext::with_timeout(Duration::from_millis(100));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        let tight = parent.child_with_timeout(Duration::from_millis(1));
        assert!(tight.deadline() < parent.deadline());

        parent.cancel();
        assert!(child.is_cancelled());
    }
}
