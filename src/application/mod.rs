//! Application layer coordinating purchases.
//!
//! `PurchaseEngine` is the primary entry point. It drives a purchase through
//! the components in this module, each of which owns its own piece of shared
//! state: the dispatcher uses an actor fed by `tokio` channels, the receipt
//! fetcher and product provider guard their tables with a single mutex each.

pub mod dispatcher;
pub mod engine;
pub mod products;
pub mod receipts;
pub mod validator;
