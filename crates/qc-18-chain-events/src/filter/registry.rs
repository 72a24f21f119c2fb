//! Uninstall dispatch across filter kinds.

use std::sync::Arc;

use tracing::debug;

use super::{EventFilterManager, Filter, FilterStore, MemPoolFilterManager, TipSetFilterManager};
use crate::error::{EventError, EventResult};

/// Tears a filter down wherever it is registered.
pub trait FilterUninstaller: Send + Sync {
    fn uninstall(&self, filter: &Filter) -> EventResult<()>;
}

/// Owns the filter store together with one manager per filter kind.
pub struct FilterRegistry {
    store: Arc<FilterStore>,
    events: Arc<EventFilterManager>,
    tipsets: Arc<TipSetFilterManager>,
    mempool: Arc<MemPoolFilterManager>,
}

impl FilterRegistry {
    pub fn new(
        store: Arc<FilterStore>,
        events: Arc<EventFilterManager>,
        tipsets: Arc<TipSetFilterManager>,
        mempool: Arc<MemPoolFilterManager>,
    ) -> Self {
        Self {
            store,
            events,
            tipsets,
            mempool,
        }
    }

    pub fn store(&self) -> &Arc<FilterStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventFilterManager> {
        &self.events
    }

    pub fn tipsets(&self) -> &Arc<TipSetFilterManager> {
        &self.tipsets
    }

    pub fn mempool(&self) -> &Arc<MemPoolFilterManager> {
        &self.mempool
    }
}

impl FilterUninstaller for FilterRegistry {
    /// Unregister from the owning manager, then from the store. A filter the
    /// manager no longer knows is still removed from the store.
    fn uninstall(&self, filter: &Filter) -> EventResult<()> {
        let id = filter.id();
        let removed = match filter {
            Filter::Event(_) => self.events.remove(id),
            Filter::TipSet(_) => self.tipsets.remove(id),
            Filter::MemPool(_) => self.mempool.remove(id),
        };
        match removed {
            Ok(()) | Err(EventError::FilterNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        self.store.remove(id)?;
        debug!(filter_id = %id, kind = ?filter.kind(), "Uninstalled filter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ActorId, Address, Cid, EthHash, ExecutedMessage, MatchCriteria, SignedMessage, TipSet,
    };
    use crate::error::ChainError;
    use crate::filter::test_support::ManualClock;
    use crate::metrics::EventMetrics;
    use crate::ports::{ActorResolver, MessageStore, TimeSource};
    use async_trait::async_trait;

    struct NoMessages;

    #[async_trait]
    impl MessageStore for NoMessages {
        async fn executed_messages(
            &self,
            _: &TipSet,
            _: &TipSet,
        ) -> Result<Vec<ExecutedMessage>, ChainError> {
            Ok(vec![])
        }

        async fn tx_hash_from_message_cid(&self, _: &Cid) -> Result<Option<EthHash>, ChainError> {
            Ok(None)
        }

        fn tx_hash_from_signed_message(&self, m: &SignedMessage) -> Result<EthHash, ChainError> {
            Ok(EthHash::from_cid(&m.cid))
        }
    }

    struct NoActors;

    #[async_trait]
    impl ActorResolver for NoActors {
        async fn delegated_address(
            &self,
            _: ActorId,
            _: &TipSet,
        ) -> Result<Option<Address>, ChainError> {
            Ok(None)
        }
    }

    fn registry(store: Arc<FilterStore>) -> FilterRegistry {
        let clock: Arc<dyn TimeSource> = ManualClock::at(0);
        let metrics = Arc::new(EventMetrics::new());
        let events = EventFilterManager::new(
            store.clone(),
            Arc::new(NoMessages),
            Arc::new(NoActors),
            None,
            10,
            clock.clone(),
            metrics.clone(),
        );
        FilterRegistry::new(
            store.clone(),
            Arc::new(events),
            Arc::new(TipSetFilterManager::new(store.clone(), 10, clock.clone(), metrics.clone())),
            Arc::new(MemPoolFilterManager::new(store, 10, clock, metrics)),
        )
    }

    #[tokio::test]
    async fn test_uninstall_round_trip() {
        let store = Arc::new(FilterStore::new(10));
        let registry = registry(store.clone());
        let before = store.len();

        let event = registry
            .events()
            .install(MatchCriteria::live(), true)
            .await
            .unwrap();
        let tipset = registry.tipsets().install().unwrap();
        let pending = registry.mempool().install().unwrap();
        assert_eq!(store.len(), before + 3);

        registry.uninstall(&Filter::Event(event)).unwrap();
        registry.uninstall(&Filter::TipSet(tipset)).unwrap();
        registry.uninstall(&Filter::MemPool(pending)).unwrap();

        assert_eq!(store.len(), before);
        assert!(registry.events().is_empty());
        assert!(registry.tipsets().is_empty());
        assert!(registry.mempool().is_empty());
    }

    #[test]
    fn test_second_uninstall_reports_not_found() {
        let store = Arc::new(FilterStore::new(10));
        let registry = registry(store);
        let filter = Filter::TipSet(registry.tipsets().install().unwrap());

        registry.uninstall(&filter).unwrap();
        assert!(matches!(
            registry.uninstall(&filter),
            Err(EventError::FilterNotFound(_))
        ));
    }
}
