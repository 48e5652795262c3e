use crate::domain::ports::SharedReceiptStore;
use crate::domain::receipt::RefreshProperties;
use crate::error::ReceiptError;
use log::*;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};

type FetchResult = Result<Vec<u8>, ReceiptError>;
type Waiters = Vec<oneshot::Sender<FetchResult>>;

/// Reads the local receipt, refreshing it from the platform when needed.
///
/// At most one refresh is outstanding at a time. Callers that ask for a
/// refresh while one is running wait on it instead of starting another, and
/// all of them receive the same result.
#[derive(Clone)]
pub struct ReceiptFetcher {
    store: SharedReceiptStore,
    /// `Some` exactly while a refresh is in flight.
    refresh: Arc<Mutex<Option<Waiters>>>,
}

impl ReceiptFetcher {
    pub fn new(store: SharedReceiptStore) -> Self {
        Self {
            store,
            refresh: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the receipt blob.
    ///
    /// # Arguments
    ///
    /// * `force_refresh` - Refresh even if a receipt is already stored.
    /// * `properties` - Passed to the platform refresh command. Ignored when
    ///   joining a refresh another caller already started.
    pub async fn fetch(
        &self,
        force_refresh: bool,
        properties: Option<RefreshProperties>,
    ) -> FetchResult {
        if !force_refresh {
            match self.store.read().await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => debug!("No local receipt, refreshing"),
                Err(e) => debug!("Local receipt unreadable ({e}), refreshing"),
            }
        }

        let (waiter, result) = oneshot::channel();
        let start = {
            let mut slot = self.refresh.lock().await;
            match slot.as_mut() {
                Some(waiters) => {
                    waiters.push(waiter);
                    false
                }
                None => {
                    *slot = Some(vec![waiter]);
                    true
                }
            }
        };

        if start {
            let store = Arc::clone(&self.store);
            let slot = Arc::clone(&self.refresh);
            tokio::spawn(async move {
                Self::run_refresh(store, slot, properties).await;
            });
        } else {
            trace!("Joining receipt refresh already in flight");
        }

        result
            .await
            .map_err(|_| ReceiptError::ReceiptRead("Receipt refresh was abandoned".to_string()))?
    }

    /// Whether a platform refresh is currently outstanding.
    pub async fn is_refreshing(&self) -> bool {
        self.refresh.lock().await.is_some()
    }

    async fn run_refresh(
        store: SharedReceiptStore,
        slot: Arc<Mutex<Option<Waiters>>>,
        properties: Option<RefreshProperties>,
    ) {
        debug!("Starting receipt refresh");
        let refreshed = store.refresh(properties.as_ref()).await;
        let waiters = slot.lock().await.take().unwrap_or_default();

        let result = match refreshed {
            Ok(()) => match store.read().await {
                Ok(Some(receipt)) => Ok(receipt),
                Ok(None) => Err(ReceiptError::NoReceiptData),
                Err(e) => Err(ReceiptError::ReceiptRead(e.to_string())),
            },
            Err(e) => Err(ReceiptError::Refresh(e)),
        };
        debug!(
            "Receipt refresh finished (ok: {}), notifying {} waiters",
            result.is_ok(),
            waiters.len()
        );
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}
