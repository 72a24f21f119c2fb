//! Push-based subscriptions: filters bound to a client sink.

pub mod manager;
pub mod pipeline;

pub use manager::SubscriptionManager;
pub use pipeline::{IngestContext, Subscription};
