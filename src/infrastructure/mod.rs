//! Adapters implementing the domain ports.

pub mod file_receipt;
pub mod http;
pub mod in_memory;
