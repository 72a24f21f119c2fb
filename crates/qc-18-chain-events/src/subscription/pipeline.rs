//! Per-subscription delivery pipeline.
//!
//! ```text
//!  filters ──try_send──→ [ingest mpsc] ──ingest task──→ [send queue] ──drain task──→ sink
//!                          bounded          render        capped, FIFO    one at a time
//! ```
//!
//! Both tasks stop when the subscription's token is cancelled. Overflowing
//! the send queue or a failed delivery stops the subscription.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::domain::{EthBlock, EthSubscriptionResponse, SubscriptionId, TipSet, TipSetKey};
use crate::filter::{Filter, FilterUninstaller, SubItem};
use crate::metrics::EventMetrics;
use crate::ports::{ChainReader, MessageStore, SubscriptionSink};
use crate::render;

/// Collaborators the ingest stage needs to render items.
#[derive(Clone)]
pub struct IngestContext {
    pub chain: Arc<dyn ChainReader>,
    pub messages: Arc<dyn MessageStore>,
}

/// A live client subscription.
pub struct Subscription {
    id: SubscriptionId,
    ingest: mpsc::Sender<SubItem>,
    filters: Mutex<Vec<Filter>>,
    stopped: AtomicBool,
    cancel: CancellationToken,
    uninstaller: Arc<dyn FilterUninstaller>,
    queue: Mutex<VecDeque<Vec<u8>>>,
    wake: Notify,
    max_send_queue: usize,
    metrics: Arc<EventMetrics>,
}

impl Subscription {
    pub(crate) fn new(
        ingest_capacity: usize,
        max_send_queue: usize,
        cancel: CancellationToken,
        uninstaller: Arc<dyn FilterUninstaller>,
        metrics: Arc<EventMetrics>,
    ) -> (Arc<Self>, mpsc::Receiver<SubItem>) {
        let (ingest, rx) = mpsc::channel(ingest_capacity);
        let sub = Arc::new(Self {
            id: SubscriptionId::new(),
            ingest,
            filters: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            cancel,
            uninstaller,
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            max_send_queue,
            metrics,
        });
        (sub, rx)
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Resolves once the subscription has been stopped.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    pub fn filter_ids(&self) -> Vec<crate::domain::FilterId> {
        self.filters.lock().iter().map(Filter::id).collect()
    }

    /// Payloads waiting for delivery.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Route a filter's output into this subscription.
    pub fn add_filter(&self, filter: Filter) {
        if !filter.set_sub_channel(self.ingest.clone()) {
            warn!(subscription_id = %self.id, filter_id = %filter.id(), "Filter already bound to a subscription");
        }

        let mut filters = self.filters.lock();
        if self.is_stopped() {
            drop(filters);
            self.uninstall(&filter);
            return;
        }
        filters.push(filter);
    }

    /// Cancel both stages and uninstall every attached filter. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();

        let filters = std::mem::take(&mut *self.filters.lock());
        for filter in &filters {
            self.uninstall(filter);
        }
        self.queue.lock().clear();

        EventMetrics::incr(&self.metrics.subscriptions_stopped);
        debug!(subscription_id = %self.id, filters = filters.len(), "Subscription stopped");
    }

    fn uninstall(&self, filter: &Filter) {
        if let Err(e) = self.uninstaller.uninstall(filter) {
            // The filter stays behind, capped, until GC reclaims it.
            warn!(subscription_id = %self.id, filter_id = %filter.id(), error = %e, "Failed to remove filter when unsubscribing");
        }
    }

    /// Queue a serialized payload. Returns false once the subscription is
    /// stopped, including when this payload overflowed the queue.
    pub(crate) fn enqueue(&self, payload: Vec<u8>) -> bool {
        let overflow = {
            let mut queue = self.queue.lock();
            // `stop` raises the flag before it clears the queue under this
            // lock, so a payload pushed here is either cleared or rejected.
            if self.is_stopped() {
                return false;
            }
            queue.push_back(payload);
            queue.len() > self.max_send_queue
        };

        if overflow {
            warn!(subscription_id = %self.id, max = self.max_send_queue, "Subscription send queue full, killing subscription");
            EventMetrics::incr(&self.metrics.subscriptions_killed);
            self.stop();
            return false;
        }

        EventMetrics::incr(&self.metrics.payloads_enqueued);
        self.wake.notify_one();
        true
    }

    fn send<T: Serialize>(&self, result: &T) {
        let response = EthSubscriptionResponse {
            subscription: self.id,
            result,
        };
        match serde_json::to_vec(&response) {
            Ok(payload) => {
                self.enqueue(payload);
            }
            Err(e) => {
                warn!(subscription_id = %self.id, error = %e, "Failed to serialize subscription response");
            }
        }
    }

    fn next_payload(&self) -> Option<Vec<u8>> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn start_drain(self: &Arc<Self>, sink: Arc<dyn SubscriptionSink>) {
        tokio::spawn(self.clone().drain(sink));
    }

    pub(crate) fn start_ingest(self: &Arc<Self>, rx: mpsc::Receiver<SubItem>, ctx: IngestContext) {
        tokio::spawn(self.clone().ingest(rx, ctx));
    }

    async fn drain(self: Arc<Self>, sink: Arc<dyn SubscriptionSink>) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = self.wake.notified() => {}
            }

            while let Some(payload) = self.next_payload() {
                let delivered = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return,
                    result = sink.deliver(payload) => result,
                };

                if let Err(e) = delivered {
                    warn!(subscription_id = %self.id, error = %e, "Error sending subscription response, killing subscription");
                    EventMetrics::incr(&self.metrics.subscriptions_killed);
                    self.stop();
                    return;
                }
                EventMetrics::incr(&self.metrics.payloads_delivered);
            }
        }
    }

    async fn ingest(self: Arc<Self>, mut rx: mpsc::Receiver<SubItem>, ctx: IngestContext) {
        let mut last_sent: Option<TipSetKey> = None;

        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            match item {
                SubItem::Event(event) => {
                    match render::logs_from_events(
                        std::slice::from_ref(&event),
                        ctx.messages.as_ref(),
                        &self.metrics,
                    )
                    .await
                    {
                        Ok(logs) => logs.iter().for_each(|log| self.send(log)),
                        Err(e) => {
                            warn!(subscription_id = %self.id, error = %e, "Failed to render event");
                        }
                    }
                }
                SubItem::TipSet(ts) => {
                    if let Some(block) = self.parent_block(&ts, last_sent.as_ref(), &ctx).await {
                        self.send(&block);
                        last_sent = Some(ts.parents().clone());
                    }
                }
                SubItem::Message(message) => {
                    match ctx.messages.tx_hash_from_signed_message(&message) {
                        Ok(hash) => self.send(&hash),
                        Err(e) => {
                            warn!(subscription_id = %self.id, error = %e, "Failed to hash pending message");
                        }
                    }
                }
            }
        }
        trace!(subscription_id = %self.id, "Ingest stopped");
    }

    /// A tipset's effects are only final once its child exists, so a new
    /// head announces its parent.
    async fn parent_block(
        &self,
        ts: &TipSet,
        last_sent: Option<&TipSetKey>,
        ctx: &IngestContext,
    ) -> Option<EthBlock> {
        if ts.height() == 0 {
            return None;
        }

        let parents = ts.parents();
        if last_sent == Some(parents) {
            trace!(subscription_id = %self.id, "Parent tipset already sent");
            return None;
        }

        let parent = match ctx.chain.tipset_by_key(parents).await {
            Ok(parent) => parent,
            Err(e) => {
                warn!(subscription_id = %self.id, tipset = %parents, error = %e, "Failed to load parent tipset");
                return None;
            }
        };

        match ctx.chain.eth_block(&parent).await {
            Ok(block) => Some(block),
            Err(e) => {
                warn!(subscription_id = %self.id, height = parent.height(), error = %e, "Failed to compose block");
                None
            }
        }
    }
}
