//! Domain types and the ports through which the platform is reached.
//!
//! Nothing in this module talks to the outside world directly. The platform
//! purchase queue, product catalog, receipt storage and validation transport
//! are all described as traits in [`ports`] and implemented in
//! `crate::infrastructure`.

pub mod ports;
pub mod product;
pub mod purchase;
pub mod receipt;
pub mod transaction;
