//! # Inbound Port - EthEventApi
//!
//! Driving port consumed by the node's RPC layer. Request framing and
//! dispatch live there; this trait only carries decoded parameters.
//!
//! | Method | RPC |
//! |--------|-----|
//! | `new_filter` | `eth_newFilter` |
//! | `new_block_filter` | `eth_newBlockFilter` |
//! | `new_pending_transaction_filter` | `eth_newPendingTransactionFilter` |
//! | `get_filter_changes` | `eth_getFilterChanges` |
//! | `get_filter_logs` | `eth_getFilterLogs` |
//! | `uninstall_filter` | `eth_uninstallFilter` |
//! | `get_logs` | `eth_getLogs` |
//! | `subscribe` | `eth_subscribe` |
//! | `unsubscribe` | `eth_unsubscribe` |

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{EthFilterResult, EthFilterSpec, EthSubscribeParams, FilterId, SubscriptionId};
use crate::error::EventResult;
use crate::ports::outbound::SubscriptionSink;

/// Filter and subscription API.
///
/// # Example
///
/// ```rust,ignore
/// use qc_18_chain_events::ports::EthEventApi;
///
/// async fn poll(api: &impl EthEventApi, spec: EthFilterSpec) -> EventResult<()> {
///     let id = api.new_filter(spec).await?;
///     let changes = api.get_filter_changes(id).await?;
///     api.uninstall_filter(id).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait EthEventApi: Send + Sync {
    /// Install a polled log filter.
    async fn new_filter(&self, spec: EthFilterSpec) -> EventResult<FilterId>;

    /// Install a polled filter collecting new block hashes.
    async fn new_block_filter(&self) -> EventResult<FilterId>;

    /// Install a polled filter collecting pending transaction hashes.
    async fn new_pending_transaction_filter(&self) -> EventResult<FilterId>;

    /// Drain everything collected since the last poll.
    async fn get_filter_changes(&self, id: FilterId) -> EventResult<EthFilterResult>;

    /// Like `get_filter_changes`, but only for log filters.
    ///
    /// # Errors
    /// - `WrongFilterType`: the filter collects blocks or transactions
    async fn get_filter_logs(&self, id: FilterId) -> EventResult<EthFilterResult>;

    /// `Ok(false)` when no such filter exists.
    async fn uninstall_filter(&self, id: FilterId) -> EventResult<bool>;

    /// One-shot historical log query.
    async fn get_logs(&self, spec: EthFilterSpec) -> EventResult<EthFilterResult>;

    /// Open a push subscription; payloads go to `sink` until unsubscribed.
    async fn subscribe(
        &self,
        sink: Arc<dyn SubscriptionSink>,
        params: EthSubscribeParams,
    ) -> EventResult<SubscriptionId>;

    /// `Ok(false)` when no such subscription exists.
    async fn unsubscribe(&self, id: SubscriptionId) -> EventResult<bool>;
}
