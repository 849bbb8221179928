//! The process run context.

use tokio_util::sync::CancellationToken;

/// Token meaning "the process is still expected to run".
///
/// Every long-running task holds a clone and checks it to decide whether to
/// continue. Stopping is idempotent and permanent: once stopped, every later
/// check observes the stop, including checks from clones made afterwards.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    token: CancellationToken,
}

impl RunContext {
    /// Create a fresh, running context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the context. Safe to call concurrently and more than once.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether the context has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the context is stopped.
    ///
    /// Resolves immediately if it already is.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stop_is_idempotent() {
        let ctx = RunContext::new();
        assert!(!ctx.is_stopped());

        ctx.stop();
        ctx.stop();
        assert!(ctx.is_stopped());
    }

    #[test]
    fn clones_share_the_stop() {
        let ctx = RunContext::new();
        let early = ctx.clone();
        ctx.stop();

        let late = ctx.clone();
        assert!(early.is_stopped());
        assert!(late.is_stopped());
    }

    #[tokio::test]
    async fn stopped_resolves_for_waiters() {
        let ctx = RunContext::new();
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.stopped().await })
        };

        ctx.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should observe the stop")
            .unwrap();

        // Level-triggered: waiting after the fact returns at once.
        tokio::time::timeout(Duration::from_millis(10), ctx.stopped())
            .await
            .unwrap();
    }
}
