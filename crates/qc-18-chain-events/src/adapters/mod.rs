//! Adapters Layer (Driven Adapters)
//!
//! - `MemoryEventIndex` - historical event index held in memory
//! - `ChannelSink` - subscription sink writing payloads into an mpsc channel

pub mod channel_sink;
pub mod memory_index;

pub use channel_sink::ChannelSink;
pub use memory_index::MemoryEventIndex;
