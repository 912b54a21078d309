use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Best-effort cancellation signal shared between the orchestrator and the
/// adapter layer. Stopping kills the in-flight external process; it does not
/// roll back partially-written artifacts of that step.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once `stop` has been called. Returns immediately when the
    /// token is already stopped.
    pub async fn cancelled(&self) {
        if self.is_stopped() {
            return;
        }
        let notified = self.inner.notify.notified();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_after_stop() {
        let token = StopToken::new();
        assert!(!token.is_stopped());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        token.stop();
        waiter.await.unwrap();
        assert!(token.is_stopped());
    }

    #[tokio::test]
    async fn cancelled_is_immediate_when_already_stopped() {
        let token = StopToken::new();
        token.stop();
        token.cancelled().await;
    }
}
