//! Ports layer for the chain events subsystem.
//!
//! - Inbound (Driving) ports: API exposed to the RPC layer
//! - Outbound (Driven) ports: chain, index, mempool and client collaborators

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
