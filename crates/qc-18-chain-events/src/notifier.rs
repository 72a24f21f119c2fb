//! Ordered fan-out of chain head changes to registered observers.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::TipSet;
use crate::error::EventResult;

/// A single step of head movement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadChange {
    /// `to` became the head on top of `from`.
    Apply { from: TipSet, to: TipSet },
    /// `from` was displaced; `to` is the head again.
    Revert { from: TipSet, to: TipSet },
}

impl HeadChange {
    pub fn target(&self) -> &TipSet {
        match self {
            HeadChange::Apply { to, .. } | HeadChange::Revert { to, .. } => to,
        }
    }
}

/// Receives head changes in chain order.
#[async_trait]
pub trait TipSetObserver: Send + Sync {
    async fn apply(&self, from: &TipSet, to: &TipSet) -> EventResult<()>;

    async fn revert(&self, from: &TipSet, to: &TipSet) -> EventResult<()>;
}

/// Holds the observer list and dispatches head changes to it one at a time.
#[derive(Default)]
pub struct ChainNotifier {
    observers: Mutex<Vec<Arc<dyn TipSetObserver>>>,
    dispatch: tokio::sync::Mutex<()>,
}

impl ChainNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. It sees every change dispatched from now on.
    pub fn observe(&self, observer: Arc<dyn TipSetObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Dispatch `changes` to every observer, in registration order.
    ///
    /// Concurrent callers are serialised so no observer sees changes out of
    /// order. An observer error is logged and does not stop the dispatch.
    pub async fn notify(&self, changes: &[HeadChange]) {
        let _ordered = self.dispatch.lock().await;
        let observers: Vec<_> = self.observers.lock().clone();

        for change in changes {
            for observer in &observers {
                let result = match change {
                    HeadChange::Apply { from, to } => observer.apply(from, to).await,
                    HeadChange::Revert { from, to } => observer.revert(from, to).await,
                };
                if let Err(e) = result {
                    warn!(height = change.target().height(), error = %e, "Observer failed to process head change");
                }
            }
        }
    }

    /// Run the dispatch loop over a stream of head change batches.
    pub fn spawn(
        self: Arc<Self>,
        mut changes: mpsc::Receiver<Vec<HeadChange>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Chain notifier started");
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    batch = changes.recv() => match batch {
                        Some(batch) => {
                            debug!(changes = batch.len(), "Dispatching head changes");
                            self.notify(&batch).await;
                        }
                        None => break,
                    },
                }
            }
            info!("Chain notifier stopped");
        })
    }
}
