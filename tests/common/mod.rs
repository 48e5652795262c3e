#![allow(dead_code)]

use iap_relay::application::dispatcher::QueueEventSink;
use iap_relay::application::engine::PurchaseEngine;
use iap_relay::config::ValidatorConfig;
use iap_relay::domain::product::ProductDescriptor;
use iap_relay::domain::transaction::{TransactionHandle, TransactionState, TransactionUpdate};
use iap_relay::infrastructure::in_memory::{
    InMemoryCatalog, InMemoryPaymentQueue, InMemoryReceiptStore, ScriptedReceiptTransport,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

pub const PRODUCTION_URL: &str = "https://buy.test/verifyReceipt";
pub const SANDBOX_URL: &str = "https://sandbox.test/verifyReceipt";

/// A purchase engine wired to in-memory platform adapters.
pub struct Harness {
    pub engine: PurchaseEngine,
    pub queue: Arc<InMemoryPaymentQueue>,
    pub receipts: Arc<InMemoryReceiptStore>,
    pub transport: Arc<ScriptedReceiptTransport>,
    pub events: QueueEventSink,
}

impl Harness {
    pub fn new(receipts: InMemoryReceiptStore) -> Self {
        let _ = env_logger::try_init();
        let queue = Arc::new(InMemoryPaymentQueue::new());
        let receipts = Arc::new(receipts);
        let transport = Arc::new(ScriptedReceiptTransport::new());
        let catalog = Arc::new(InMemoryCatalog::new(vec![
            ProductDescriptor::new("com.app.pro", dec!(4.99), "USD").with_title("Pro"),
            ProductDescriptor::new("com.app.coins", dec!(0.99), "USD").with_title("Coins"),
        ]));
        let engine = PurchaseEngine::new(
            queue.clone(),
            catalog,
            receipts.clone(),
            transport.clone(),
            ValidatorConfig::new(PRODUCTION_URL, SANDBOX_URL),
        );
        let events = engine.transaction_events();
        Self {
            engine,
            queue,
            receipts,
            transport,
            events,
        }
    }

    pub fn with_cached_receipt() -> Self {
        Self::new(InMemoryReceiptStore::new(Some(b"receipt".to_vec())))
    }

    /// Waits for the `count`-th payment to reach the queue, then reports a
    /// state change for it.
    pub async fn settle(&self, count: usize, transaction_id: &str, state: TransactionState) {
        self.queue.wait_for_payments(count).await;
        let payment = self.queue.payments().await[count - 1].clone();
        let handle = TransactionHandle::for_payment(Some(transaction_id.to_string()), &payment);
        self.events
            .transactions_updated(vec![TransactionUpdate::new(handle, state)])
            .unwrap();
    }
}
