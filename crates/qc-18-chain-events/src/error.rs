//! Error types for the chain events subsystem

use crate::domain::{ChainEpoch, Cid, FilterId, SubscriptionId};
use thiserror::Error;

/// Errors surfaced by the filter and subscription API
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Chain event filtering is not supported by this node")]
    NotSupported,

    #[error("Filter not found: {0}")]
    FilterNotFound(FilterId),

    #[error("Wrong filter type")]
    WrongFilterType,

    #[error("Invalid filter spec: {0}")]
    InvalidSpec(String),

    #[error("Historical event index is disabled")]
    IndexUnavailable,

    #[error("Timed out waiting for event index to process height {height}")]
    IndexTimeout { height: ChainEpoch },

    #[error("Height {height} is in the future (head is {head})")]
    FutureHeight { height: ChainEpoch, head: ChainEpoch },

    #[error("Event index failed to index tipset {0}")]
    TipsetNotIndexed(Cid),

    #[error("Maximum number of filters registered: {max}")]
    MaxFiltersReached { max: usize },

    #[error("Filter ID already registered: {0}")]
    DuplicateFilterId(FilterId),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    #[error("Subscription setup failed: {0}")]
    SetupFailed(Box<EventError>),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Event index error: {0}")]
    Index(#[from] IndexError),
}

impl EventError {
    pub(crate) fn invalid_spec(details: impl Into<String>) -> Self {
        Self::InvalidSpec(details.into())
    }
}

/// Errors from the chain reader, message store and actor state collaborators
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Tipset not found: {0}")]
    TipSetNotFound(String),

    #[error("Actor not found: {0}")]
    ActorNotFound(u64),

    #[error("Message not found: {0}")]
    MessageNotFound(Cid),

    #[error("Cannot render address: {0}")]
    InvalidAddress(String),

    #[error("Chain store error: {0}")]
    Store(String),
}

/// Errors from the historical event index
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Event index closed")]
    Closed,

    #[error("Event index query failed: {0}")]
    Query(String),
}

/// A subscriber could not accept a payload; the subscription is torn down
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Delivery to subscriber failed: {0}")]
pub struct DeliveryError(pub String);

/// Result alias used across the crate
pub type EventResult<T> = Result<T, EventError>;
