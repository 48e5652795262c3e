use crate::domain::ports::{PaymentQueue, ProductCatalog, ReceiptStore, ReceiptTransport};
use crate::domain::product::{ProductDescriptor, ProductQueryResult};
use crate::domain::receipt::RefreshProperties;
use crate::domain::transaction::{PendingPurchase, TransactionHandle};
use crate::error::{PlatformError, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};

/// A product catalog held in memory.
///
/// Used by the command-line tool (loaded from CSV) and by tests.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    products: HashMap<String, ProductDescriptor>,
}

impl InMemoryCatalog {
    pub fn new(products: impl IntoIterator<Item = ProductDescriptor>) -> Self {
        Self {
            products: products
                .into_iter()
                .map(|p| (p.product_id.clone(), p))
                .collect(),
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn request_products(
        &self,
        product_ids: &HashSet<String>,
    ) -> Result<ProductQueryResult, PlatformError> {
        let mut result = ProductQueryResult::default();
        for id in product_ids {
            match self.products.get(id) {
                Some(product) => result.products.push(product.clone()),
                None => {
                    result.invalid_product_ids.insert(id.clone());
                }
            }
        }
        result.products.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(result)
    }
}

/// Receipt storage held in memory, with a scriptable refresh.
///
/// A refresh replaces the stored receipt with the configured refreshed one
/// (if any), or fails with the configured error.
#[derive(Default)]
pub struct InMemoryReceiptStore {
    receipt: RwLock<Option<Vec<u8>>>,
    refreshed_receipt: Option<Vec<u8>>,
    refresh_error: Option<PlatformError>,
    refresh_delay: Duration,
    refresh_count: AtomicUsize,
    refresh_properties: Mutex<Vec<Option<RefreshProperties>>>,
}

impl InMemoryReceiptStore {
    pub fn new(receipt: Option<Vec<u8>>) -> Self {
        Self {
            receipt: RwLock::new(receipt),
            ..Self::default()
        }
    }

    pub fn with_refreshed_receipt(mut self, receipt: Vec<u8>) -> Self {
        self.refreshed_receipt = Some(receipt);
        self
    }

    pub fn with_refresh_error(mut self, error: PlatformError) -> Self {
        self.refresh_error = Some(error);
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Number of refresh commands issued so far.
    pub fn refresh_count(&self) -> usize {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// Properties passed to each refresh command, in order.
    pub async fn refresh_properties(&self) -> Vec<Option<RefreshProperties>> {
        self.refresh_properties.lock().await.clone()
    }
}

#[async_trait]
impl ReceiptStore for InMemoryReceiptStore {
    async fn read(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.receipt.read().await.clone())
    }

    async fn refresh(&self, properties: Option<&RefreshProperties>) -> Result<(), PlatformError> {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        self.refresh_properties.lock().await.push(properties.cloned());
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        if let Some(error) = &self.refresh_error {
            return Err(error.clone());
        }
        if let Some(receipt) = &self.refreshed_receipt {
            *self.receipt.write().await = Some(receipt.clone());
        }
        Ok(())
    }
}

/// A payment queue that records the commands it receives.
///
/// Transaction updates are not generated here; whoever drives the queue pushes
/// them through the dispatcher's `QueueEventSink`.
pub struct InMemoryPaymentQueue {
    can_make_payments: AtomicBool,
    payments: RwLock<Vec<PendingPurchase>>,
    finished: RwLock<Vec<TransactionHandle>>,
    restores: AtomicUsize,
    changed: Notify,
}

impl Default for InMemoryPaymentQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPaymentQueue {
    pub fn new() -> Self {
        Self {
            can_make_payments: AtomicBool::new(true),
            payments: RwLock::new(Vec::new()),
            finished: RwLock::new(Vec::new()),
            restores: AtomicUsize::new(0),
            changed: Notify::new(),
        }
    }

    pub fn set_can_make_payments(&self, allowed: bool) {
        self.can_make_payments.store(allowed, Ordering::SeqCst);
    }

    pub async fn payments(&self) -> Vec<PendingPurchase> {
        self.payments.read().await.clone()
    }

    pub async fn finished(&self) -> Vec<TransactionHandle> {
        self.finished.read().await.clone()
    }

    pub fn restore_requests(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` payments have been submitted.
    pub async fn wait_for_payments(&self, count: usize) {
        loop {
            let changed = self.changed.notified();
            if self.payments.read().await.len() >= count {
                return;
            }
            changed.await;
        }
    }

    /// Waits until at least `count` restore commands have been issued.
    pub async fn wait_for_restores(&self, count: usize) {
        loop {
            let changed = self.changed.notified();
            if self.restore_requests() >= count {
                return;
            }
            changed.await;
        }
    }
}

#[async_trait]
impl PaymentQueue for InMemoryPaymentQueue {
    fn can_make_payments(&self) -> bool {
        self.can_make_payments.load(Ordering::SeqCst)
    }

    async fn add_payment(&self, payment: PendingPurchase) {
        self.payments.write().await.push(payment);
        self.changed.notify_waiters();
    }

    async fn finish_transaction(&self, transaction: &TransactionHandle) {
        self.finished.write().await.push(transaction.clone());
        self.changed.notify_waiters();
    }

    async fn restore_completed_transactions(&self) {
        self.restores.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }
}

pub type TransportReply = Result<Option<Vec<u8>>, TransportError>;

/// A validation service stand-in that answers from a script.
///
/// Replies are handed out in order regardless of the endpoint; every request
/// is recorded with its URL and decoded JSON body.
#[derive(Default)]
pub struct ScriptedReceiptTransport {
    replies: Mutex<VecDeque<TransportReply>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedReceiptTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: Vec<TransportReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        }
    }

    /// Appends a JSON reply to the script.
    pub async fn push_json(&self, body: Value) {
        self.replies.lock().await.push_back(Self::json(body));
    }

    pub fn json(body: Value) -> TransportReply {
        Ok(Some(body.to_string().into_bytes()))
    }

    pub async fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().await.clone()
    }

    pub async fn urls(&self) -> Vec<String> {
        self.requests.lock().await.iter().map(|(url, _)| url.clone()).collect()
    }
}

#[async_trait]
impl ReceiptTransport for ScriptedReceiptTransport {
    async fn post_json(&self, url: &str, body: Vec<u8>) -> TransportReply {
        let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
        self.requests.lock().await.push((url.to_string(), body));
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(TransportError(format!("No scripted reply for {url}"))))
    }
}
