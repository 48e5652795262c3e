use super::product::ProductQueryResult;
use super::receipt::RefreshProperties;
use super::transaction::{PendingPurchase, TransactionHandle};
use crate::error::{PlatformError, StoreError, TransportError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;

/// The platform's purchase queue: accepts payments and transaction commands.
///
/// State changes come back asynchronously as `QueueEvent`s pushed into the
/// dispatcher's `QueueEventSink`.
#[async_trait]
pub trait PaymentQueue: Send + Sync {
    fn can_make_payments(&self) -> bool;
    async fn add_payment(&self, payment: PendingPurchase);
    async fn finish_transaction(&self, transaction: &TransactionHandle);
    async fn restore_completed_transactions(&self);
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn request_products(
        &self,
        product_ids: &HashSet<String>,
    ) -> Result<ProductQueryResult, PlatformError>;
}

/// Local receipt storage.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Reads the stored receipt. `Ok(None)` when no receipt is present.
    async fn read(&self) -> io::Result<Option<Vec<u8>>>;
    /// Asks the platform to fetch a fresh receipt into storage.
    async fn refresh(&self, properties: Option<&RefreshProperties>) -> Result<(), PlatformError>;
}

/// Transport to the remote validation service.
#[async_trait]
pub trait ReceiptTransport: Send + Sync {
    /// POSTs a JSON body and returns the response body, `None` if there was none.
    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Caller-supplied receipt check used instead of the validation service.
#[async_trait]
pub trait CustomReceiptValidator: Send + Sync {
    async fn validate(
        &self,
        transaction: &TransactionHandle,
        receipt: &[u8],
    ) -> Result<(), StoreError>;
}

pub type SharedPaymentQueue = Arc<dyn PaymentQueue>;
pub type SharedProductCatalog = Arc<dyn ProductCatalog>;
pub type SharedReceiptStore = Arc<dyn ReceiptStore>;
pub type SharedReceiptTransport = Arc<dyn ReceiptTransport>;
pub type SharedReceiptValidator = Arc<dyn CustomReceiptValidator>;
