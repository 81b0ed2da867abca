//! Cooperative cancellation shared by every task of a job

use futures::future::select_all;
use std::sync::Arc;
use tokio::sync::watch;

/// Clonable cancellation flag
///
/// Map tasks poll [`CancelToken::is_cancelled`] per line and reduce
/// attempts per record, so a cancelled job stops without publishing the
/// partition that was in flight. A child token observes its ancestors'
/// cancellation but cancelling it leaves them untouched.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    ancestors: Vec<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            ancestors: Vec::new(),
        }
    }

    /// New token cancelled together with this one
    pub fn child(&self) -> Self {
        let (tx, _rx) = watch::channel(false);
        let mut ancestors = self.ancestors.clone();
        ancestors.push(Arc::clone(&self.tx));
        Self {
            tx: Arc::new(tx),
            ancestors,
        }
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.senders().any(|tx| *tx.borrow())
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let waits = self.senders().map(|tx| {
            let mut rx = tx.subscribe();
            Box::pin(async move {
                // Senders live as long as self, so this cannot fail
                let _ = rx.wait_for(|cancelled| *cancelled).await;
            })
        });
        select_all(waits).await;
    }

    fn senders(&self) -> impl Iterator<Item = &Arc<watch::Sender<bool>>> {
        std::iter::once(&self.tx).chain(self.ancestors.iter())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
