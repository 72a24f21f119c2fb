//! `EthEventApi` implementation and the historical query path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::EthEventService;
use crate::domain::{
    event_type, parse_filter_spec, parse_subscription_params, ChainEpoch, CollectedEvent,
    EthFilterResult, EthFilterSpec, EthHash, EthLog, EthSubscribeParams, FilterId, MatchCriteria,
    Scope, SubscriptionId, OPEN_BOUND,
};
use crate::error::{EventError, EventResult, IndexError};
use crate::filter::{Filter, FilterUninstaller};
use crate::ports::{EthEventApi, EventIndex, SubscriptionSink};
use crate::render;
use crate::subscription::Subscription;

impl EthEventService {
    /// Wait until the historical index holds a tipset above `height`.
    ///
    /// Subscribes to index updates before the second check so an update
    /// landing between the first check and the subscription is not missed.
    ///
    /// # Errors
    /// - `FutureHeight`: `height` is above the current head
    /// - `IndexTimeout`: the index did not catch up within the read timeout
    /// - `Cancelled`: the service is shutting down
    pub async fn wait_for_height_processed(&self, height: ChainEpoch) -> EventResult<()> {
        let index = self.index()?;
        let head = self.chain.head().height();
        if height > head {
            return Err(EventError::FutureHeight { height, head });
        }

        tokio::select! {
            biased;
            _ = self.root.cancelled() => Err(EventError::Cancelled),
            waited = tokio::time::timeout(
                self.config.event_read_timeout(),
                height_processed(index.as_ref(), height),
            ) => waited.unwrap_or(Err(EventError::IndexTimeout { height })),
        }
    }

    /// Run `criteria` once against the historical index.
    async fn events_for_criteria(
        &self,
        criteria: MatchCriteria,
    ) -> EventResult<Vec<CollectedEvent>> {
        let index = self.index()?;

        match criteria.scope() {
            Scope::Range { max, .. } => {
                // The head's messages are executed in its child.
                let executed = self.chain.head().height() - 1;
                let max = if max == OPEN_BOUND { executed } else { max };
                if max < 0 {
                    return Err(EventError::invalid_spec(
                        "maxHeight requested is less than 0",
                    ));
                }
                if max > executed {
                    return Err(EventError::invalid_spec(
                        "maxHeight requested is greater than the heaviest tipset",
                    ));
                }
                self.wait_for_height_processed(max).await?;
            }
            Scope::TipSet(cid) => {
                let ts = self.chain.tipset_by_cid(&cid).await?;
                self.wait_for_height_processed(ts.height()).await?;
                if !index.is_tipset_processed(&cid).await? {
                    return Err(EventError::TipsetNotIndexed(cid));
                }
            }
        }

        let filter = self.registry.events().install(criteria, false).await?;
        let events = filter.take_collected_events();
        if let Err(e) = self.registry.uninstall(&Filter::Event(filter)) {
            debug!(error = %e, "Failed to remove temporary filter");
        }
        Ok(events)
    }

    async fn logs(&self, events: &[CollectedEvent]) -> EventResult<Vec<EthLog>> {
        render::logs_from_events(events, self.messages.as_ref(), &self.metrics).await
    }

    /// Logs of one block emitted by one transaction.
    pub async fn logs_for_block_and_transaction(
        &self,
        block_hash: EthHash,
        tx_hash: EthHash,
    ) -> EventResult<Vec<EthLog>> {
        self.ensure_enabled()?;
        let spec = EthFilterSpec {
            block_hash: Some(block_hash),
            ..Default::default()
        };
        let criteria = parse_filter_spec(
            &spec,
            self.chain.head().height(),
            self.config.max_filter_height_range,
        )?;
        let events = self.events_for_criteria(criteria).await?;
        let logs = self.logs(&events).await?;
        Ok(logs
            .into_iter()
            .filter(|log| log.transaction_hash == tx_hash)
            .collect())
    }

    /// Open one subscription fed by several filters. Either every filter is
    /// attached or the subscription is torn down and nothing stays installed.
    ///
    /// # Errors
    /// - `SetupFailed`: wraps the first failure
    pub async fn subscribe_all(
        &self,
        sink: Arc<dyn SubscriptionSink>,
        requests: &[EthSubscribeParams],
    ) -> EventResult<SubscriptionId> {
        self.ensure_enabled()?;
        let sub = self.subscriptions.start_subscription(sink, self.uninstaller());

        for params in requests {
            if let Err(e) = self.attach(&sub, params).await {
                self.abort(&sub);
                return Err(EventError::SetupFailed(Box::new(e)));
            }
        }

        debug!(subscription_id = %sub.id(), filters = requests.len(), "Subscribed");
        Ok(sub.id())
    }

    async fn attach(&self, sub: &Subscription, params: &EthSubscribeParams) -> EventResult<()> {
        let filter = match params.event_type.as_str() {
            event_type::NEW_HEADS => Filter::TipSet(self.registry.tipsets().install()?),
            event_type::LOGS => {
                let criteria = parse_subscription_params(params.params.as_ref())?;
                Filter::Event(self.registry.events().install(criteria, true).await?)
            }
            event_type::PENDING_TRANSACTIONS => {
                Filter::MemPool(self.registry.mempool().install()?)
            }
            other => return Err(EventError::UnsupportedEventType(other.to_string())),
        };
        sub.add_filter(filter);
        Ok(())
    }

    fn abort(&self, sub: &Subscription) {
        if self.subscriptions.stop_subscription(sub.id()).is_err() {
            // Already pruned after stopping itself.
            sub.stop();
        }
    }
}

/// Check, subscribe, recheck, then wait on index updates.
async fn height_processed(index: &dyn EventIndex, height: ChainEpoch) -> EventResult<()> {
    if index.is_height_past(height).await? {
        return Ok(());
    }

    let mut updates = index.subscribe_updates();
    if index.is_height_past(height).await? {
        return Ok(());
    }

    loop {
        match updates.recv().await {
            Ok(()) | Err(RecvError::Lagged(_)) => {
                if index.is_height_past(height).await? {
                    return Ok(());
                }
            }
            Err(RecvError::Closed) => return Err(IndexError::Closed.into()),
        }
    }
}

#[async_trait]
impl EthEventApi for EthEventService {
    async fn new_filter(&self, spec: EthFilterSpec) -> EventResult<FilterId> {
        self.ensure_enabled()?;
        let criteria = parse_filter_spec(
            &spec,
            self.chain.head().height(),
            self.config.max_filter_height_range,
        )?;
        let filter = self.registry.events().install(criteria, true).await?;
        Ok(filter.id())
    }

    async fn new_block_filter(&self) -> EventResult<FilterId> {
        self.ensure_enabled()?;
        Ok(self.registry.tipsets().install()?.id())
    }

    async fn new_pending_transaction_filter(&self) -> EventResult<FilterId> {
        self.ensure_enabled()?;
        Ok(self.registry.mempool().install()?.id())
    }

    async fn get_filter_changes(&self, id: FilterId) -> EventResult<EthFilterResult> {
        self.ensure_enabled()?;
        match self.registry.store().get(id)? {
            Filter::Event(f) => {
                let events = f.take_collected_events();
                Ok(EthFilterResult::Logs(self.logs(&events).await?))
            }
            Filter::TipSet(f) => Ok(EthFilterResult::Hashes(render::hashes_from_tipsets(
                &f.take_collected_tipsets(),
            ))),
            Filter::MemPool(f) => Ok(EthFilterResult::Hashes(render::hashes_from_messages(
                &f.take_collected_messages(),
                self.messages.as_ref(),
            )?)),
        }
    }

    async fn get_filter_logs(&self, id: FilterId) -> EventResult<EthFilterResult> {
        self.ensure_enabled()?;
        match self.registry.store().get(id)? {
            Filter::Event(f) => {
                let events = f.take_collected_events();
                Ok(EthFilterResult::Logs(self.logs(&events).await?))
            }
            _ => Err(EventError::WrongFilterType),
        }
    }

    async fn uninstall_filter(&self, id: FilterId) -> EventResult<bool> {
        self.ensure_enabled()?;
        let filter = match self.registry.store().get(id) {
            Ok(filter) => filter,
            Err(EventError::FilterNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        self.registry.uninstall(&filter)?;
        Ok(true)
    }

    async fn get_logs(&self, spec: EthFilterSpec) -> EventResult<EthFilterResult> {
        self.ensure_enabled()?;
        self.index()?;
        let criteria = parse_filter_spec(
            &spec,
            self.chain.head().height(),
            self.config.max_filter_height_range,
        )?;
        let events = self.events_for_criteria(criteria).await?;
        Ok(EthFilterResult::Logs(self.logs(&events).await?))
    }

    async fn subscribe(
        &self,
        sink: Arc<dyn SubscriptionSink>,
        params: EthSubscribeParams,
    ) -> EventResult<SubscriptionId> {
        self.ensure_enabled()?;
        let sub = self.subscriptions.start_subscription(sink, self.uninstaller());

        if let Err(e) = self.attach(&sub, &params).await {
            self.abort(&sub);
            return Err(e);
        }

        debug!(subscription_id = %sub.id(), event_type = %params.event_type, "Subscribed");
        Ok(sub.id())
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> EventResult<bool> {
        self.ensure_enabled()?;
        match self.subscriptions.stop_subscription(id) {
            Ok(()) => {
                debug!(subscription_id = %id, "Unsubscribed");
                Ok(true)
            }
            Err(EventError::SubscriptionNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
