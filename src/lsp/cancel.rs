//! Cooperative request cancellation
//!
//! Replace-on-reissue: the tracker holds one [`CancelSource`] for the most
//! recent refresh and cancels it before issuing the next request. Tokens are
//! cheap to clone and observe the signal from any task. Dropping a source
//! without cancelling leaves its tokens pending forever, which is the
//! "never cancelled" case, not an error.

use tokio::sync::watch;

/// Issuer-side cancellation handle.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal cancellation to every outstanding token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a [`CancelSource`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled, for callers that want an
    /// uncancellable request (the `CancellationToken.None` analog).
    pub fn none() -> Self {
        let (tx, rx) = watch::channel(false);
        // Dropping the sender means the value can never change.
        drop(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled; pends forever on a token
    /// whose source is gone without cancelling.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
        // Source dropped without cancelling: never resolve.
        std::future::pending::<()>().await;
    }
}
