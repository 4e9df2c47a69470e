//! Ports layer for the rank ledger.
//!
//! Defines the hexagonal architecture port traits:
//! - Inbound (Driving) ports: API exposed to route handlers and tools
//! - Outbound (Driven) ports: storage and clock dependencies

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
