//! Subscription sink backed by a bounded channel.
//!
//! The receiving half is typically drained by a websocket writer task.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DeliveryError;
use crate::ports::SubscriptionSink;

/// Forwards each payload into an mpsc channel, waiting for capacity.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelSink {
    /// Create a sink and the receiver its payloads arrive on.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SubscriptionSink for ChannelSink {
    async fn deliver(&self, payload: Vec<u8>) -> Result<(), DeliveryError> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| DeliveryError("subscriber disconnected".to_string()))
    }
}
