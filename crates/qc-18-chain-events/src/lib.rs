//! # QC-18 Chain Events
//!
//! Filter and subscription engine for chain events: contract logs, new
//! block heads and pending transactions, exposed through an Ethereum-style
//! filter/subscribe API.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure logic, no I/O
//!   - `MatchCriteria`: height/tipset scope, emitter addresses, topic keys
//!   - `parse_filter_spec` / `parse_block_range`: client specs to criteria
//!   - `eth_log_from_event`: decoding of raw event entries into logs
//!   - `EventsConfig`: configuration with validation
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `EthEventApi`: Driving port (inbound API)
//!   - `ChainReader`, `MessageStore`, `ActorResolver`, `EventIndex`,
//!     `MempoolSource`, `SubscriptionSink`: Driven ports
//!
//! - **Filter Layer** (`filter/`): Filter store and per-kind managers
//!
//! - **Subscription Layer** (`subscription/`): Per-client delivery pipelines
//!
//! - **Service Layer** (`service/`): Wiring, historical queries, GC
//!   - `EthEventService`: Implements `EthEventApi`
//!
//! - **Adapters Layer** (`adapters/`): In-memory index, channel sink
//!
//! ```text
//!  head changes ──→ ChainNotifier ──→ EventFilterManager ──┐
//!                                └──→ TipSetFilterManager ─┼─→ FilterStore ←── poll (get_filter_changes)
//!  mempool ────────────────────────→ MemPoolFilterManager ─┘        │
//!                                                                   └──→ Subscription ──→ SubscriptionSink
//! ```
//!
//! ## Invariants
//!
//! - Head changes reach every observer in chain order
//! - Each filter buffers at most `max_filter_results` items
//! - A subscription delivers in enqueue order; overflowing its send queue
//!   terminates it without affecting any other
//! - A multi-filter subscription is installed completely or not at all
//!
//! ## Usage Example
//!
//! ```ignore
//! use qc_18_chain_events::{ChainNotifier, Collaborators, EthEventApi, EthEventService, EventsConfig};
//! use std::sync::Arc;
//!
//! let collaborators = Collaborators::new(chain, messages, actors, mempool)
//!     .with_index(Arc::new(MemoryEventIndex::new()));
//! let service = EthEventService::new(EventsConfig::default(), collaborators)?;
//!
//! let notifier = Arc::new(ChainNotifier::new());
//! service.start(&notifier);
//! notifier.clone().spawn(head_changes, shutdown.clone());
//!
//! let id = service.new_block_filter().await?;
//! let hashes = service.get_filter_changes(id).await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod notifier;
pub mod ports;
pub mod service;
pub mod subscription;

mod render;

// Re-exports for convenience
pub use adapters::{ChannelSink, MemoryEventIndex};
pub use domain::{EventsConfig, FilterId, MatchCriteria, SubscriptionId};
pub use error::{ChainError, DeliveryError, EventError, EventResult, IndexError};
pub use metrics::{EventMetrics, MetricsSnapshot};
pub use notifier::{ChainNotifier, HeadChange, TipSetObserver};
pub use ports::{
    ActorResolver, ChainReader, EthEventApi, EventIndex, MempoolSource, MessageStore,
    SubscriptionSink, SystemTimeSource, TimeSource,
};
pub use service::{Collaborators, EthEventService};
