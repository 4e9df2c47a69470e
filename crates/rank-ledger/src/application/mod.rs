//! # Application Module
//!
//! Application services orchestrating the domain and outbound ports.

pub mod fulfillment;
pub mod service;

pub use fulfillment::{CleanupHandle, FulfillmentReceipt, VerifiedPurchase};
pub use service::RankLedgerService;
