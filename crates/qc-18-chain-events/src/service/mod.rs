//! Service wiring: owns the filter registry, the subscription manager and
//! the background tasks.

mod event_api;
pub(crate) mod gc;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{ConfigError, EventsConfig};
use crate::error::{EventError, EventResult};
use crate::filter::{
    EventFilterManager, FilterRegistry, FilterStore, FilterUninstaller, MemPoolFilterManager,
    TipSetFilterManager,
};
use crate::metrics::EventMetrics;
use crate::notifier::ChainNotifier;
use crate::ports::{
    ActorResolver, ChainReader, EventIndex, MempoolSource, MessageStore, SystemTimeSource,
    TimeSource,
};
use crate::subscription::{IngestContext, SubscriptionManager};

/// External collaborators the service is built on.
pub struct Collaborators {
    pub chain: Arc<dyn ChainReader>,
    pub messages: Arc<dyn MessageStore>,
    pub actors: Arc<dyn ActorResolver>,
    pub mempool: Arc<dyn MempoolSource>,
    pub index: Option<Arc<dyn EventIndex>>,
    pub clock: Arc<dyn TimeSource>,
}

impl Collaborators {
    /// Collaborators without a historical index, on the system clock.
    pub fn new(
        chain: Arc<dyn ChainReader>,
        messages: Arc<dyn MessageStore>,
        actors: Arc<dyn ActorResolver>,
        mempool: Arc<dyn MempoolSource>,
    ) -> Self {
        Self {
            chain,
            messages,
            actors,
            mempool,
            index: None,
            clock: Arc::new(SystemTimeSource),
        }
    }

    pub fn with_index(mut self, index: Arc<dyn EventIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }
}

/// The chain event filtering and subscription engine.
pub struct EthEventService {
    config: EventsConfig,
    chain: Arc<dyn ChainReader>,
    messages: Arc<dyn MessageStore>,
    mempool: Arc<dyn MempoolSource>,
    clock: Arc<dyn TimeSource>,
    registry: Arc<FilterRegistry>,
    subscriptions: SubscriptionManager,
    metrics: Arc<EventMetrics>,
    root: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EthEventService {
    /// Build the service. Nothing runs until [`EthEventService::start`].
    pub fn new(config: EventsConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;

        let Collaborators {
            chain,
            messages,
            actors,
            mempool,
            index,
            clock,
        } = collaborators;

        let index = if config.disable_historic_filter_api {
            None
        } else {
            index
        };

        let metrics = Arc::new(EventMetrics::new());
        let store = Arc::new(FilterStore::new(config.max_filters));
        let max_results = config.max_filter_results;

        let events = Arc::new(EventFilterManager::new(
            store.clone(),
            messages.clone(),
            actors,
            index,
            max_results,
            clock.clone(),
            metrics.clone(),
        ));
        let tipsets = Arc::new(TipSetFilterManager::new(
            store.clone(),
            max_results,
            clock.clone(),
            metrics.clone(),
        ));
        let pending = Arc::new(MemPoolFilterManager::new(
            store.clone(),
            max_results,
            clock.clone(),
            metrics.clone(),
        ));
        let registry = Arc::new(FilterRegistry::new(store, events, tipsets, pending));

        let root = CancellationToken::new();
        let subscriptions = SubscriptionManager::new(
            IngestContext {
                chain: chain.clone(),
                messages: messages.clone(),
            },
            config.subscription_buffer,
            config.max_send_queue,
            root.clone(),
            metrics.clone(),
        );

        Ok(Self {
            config,
            chain,
            messages,
            mempool,
            clock,
            registry,
            subscriptions,
            metrics,
            root,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Register with the chain notifier and spawn the GC and mempool tasks.
    /// Does nothing when the engine is disabled.
    pub fn start(&self, notifier: &ChainNotifier) {
        if !self.config.is_enabled() {
            info!("Chain event filtering disabled");
            return;
        }

        let head = self.chain.head();
        self.registry.events().set_current_height(head.height());
        notifier.observe(self.registry.events().clone());
        notifier.observe(self.registry.tipsets().clone());

        let gc = tokio::spawn(gc::run(
            self.registry.clone(),
            self.clock.clone(),
            self.config.filter_ttl(),
            self.config.gc_interval(),
            self.metrics.clone(),
            self.root.child_token(),
        ));
        let mempool = tokio::spawn(
            self.registry
                .mempool()
                .clone()
                .wait_for_mpool_updates(self.mempool.updates(), self.root.child_token()),
        );
        self.tasks.lock().extend([gc, mempool]);

        info!(
            height = head.height(),
            historic = self.registry.events().index().is_some(),
            "Chain event filtering started"
        );
    }

    /// Stop every subscription, uninstall every filter and wait for the
    /// background tasks.
    pub async fn close(&self) {
        self.root.cancel();
        self.subscriptions.stop_all();

        for filter in self.registry.store().all() {
            if let Err(e) = self.registry.uninstall(&filter) {
                warn!(filter_id = %filter.id(), error = %e, "Failed to uninstall filter on shutdown");
            }
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task failed");
            }
        }
        info!("Chain event filtering stopped");
    }

    pub fn config(&self) -> &EventsConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<EventMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Run one GC sweep now. Returns the number of filters evicted.
    pub fn collect_garbage(&self) -> usize {
        gc::sweep(
            &self.registry,
            self.clock.now(),
            self.config.filter_ttl(),
            &self.metrics,
        )
    }

    fn ensure_enabled(&self) -> EventResult<()> {
        if self.config.is_enabled() {
            Ok(())
        } else {
            Err(EventError::NotSupported)
        }
    }

    fn uninstaller(&self) -> Arc<dyn FilterUninstaller> {
        self.registry.clone()
    }

    fn index(&self) -> EventResult<&Arc<dyn EventIndex>> {
        self.registry
            .events()
            .index()
            .ok_or(EventError::IndexUnavailable)
    }
}
