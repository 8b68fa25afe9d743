//! Abort signalling shared by the orchestrator and its workers.

use std::sync::Arc;

use tokio::sync::watch;

/// Triggers an abort for every [`AbortSignal`] derived from it.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes an abort request. Late subscribers still see an abort that already happened.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests an abort. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once an abort has been requested. Pends forever if the handle is dropped.
    pub async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_abort_reaches_subscribers() {
        let handle = AbortHandle::new();
        let mut signal = handle.signal();
        assert!(!signal.is_aborted());

        let waiter = tokio::spawn(async move {
            signal.aborted().await;
            true
        });

        handle.abort();
        let fired = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(fired);
        assert!(handle.is_aborted());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_abort() {
        let handle = AbortHandle::new();
        handle.abort();
        let mut signal = handle.signal();
        assert!(signal.is_aborted());
        tokio::time::timeout(Duration::from_millis(100), signal.aborted())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let mut signal = AbortSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(50), signal.aborted()).await;
        assert!(result.is_err());
    }
}
