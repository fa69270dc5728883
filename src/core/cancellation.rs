// src/core/cancellation.rs

use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable cancellation signal shared between a caller and the
/// executions it wants to be able to interrupt.
///
/// All clones observe the same state: once any clone calls [`cancel`],
/// every synchronous check and every pending [`cancelled`] wait sees it.
/// Cancellation is a request, not a guarantee. A running process is sent
/// a termination signal, and its real exit status is still delivered
/// through the normal completion path.
///
/// [`cancel`]: CancellationToken::cancel
/// [`cancelled`]: CancellationToken::cancelled
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Flags the token as cancelled and wakes every waiter.
    /// Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled. Resolves immediately if it
    /// already is.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // borrow_and_update marks the current value as seen, so a change
        // racing with the check below still wakes `changed`.
        if *rx.borrow_and_update() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // The sender lives inside this token, so `changed` only fails if
        // the token itself was dropped mid-wait; never resolve then.
        std::future::pending::<()>().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
