use crate::domain::ports::SharedProductCatalog;
use crate::domain::product::ProductQueryResult;
use crate::error::{PlatformError, Result};
use log::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use uuid::Uuid;

type QueryResponder = oneshot::Sender<std::result::Result<ProductQueryResult, PlatformError>>;

struct InflightQuery {
    product_ids: HashSet<String>,
    responder: QueryResponder,
}

/// Issues product catalog lookups and tracks the ones still in flight.
///
/// Every lookup is registered under a fresh token before the catalog is asked,
/// and is removed from the table exactly once when its response arrives.
#[derive(Clone)]
pub struct ProductInfoProvider {
    catalog: SharedProductCatalog,
    inflight: Arc<Mutex<HashMap<Uuid, InflightQuery>>>,
}

impl ProductInfoProvider {
    pub fn new(catalog: SharedProductCatalog) -> Self {
        Self {
            catalog,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Looks up the given identifiers in the catalog.
    ///
    /// Catalog errors are returned unchanged as `StoreError::Platform`.
    pub async fn retrieve_product_info(
        &self,
        product_ids: HashSet<String>,
    ) -> Result<ProductQueryResult> {
        let token = Uuid::new_v4();
        let (responder, response) = oneshot::channel();

        self.inflight.lock().await.insert(
            token,
            InflightQuery {
                product_ids: product_ids.clone(),
                responder,
            },
        );
        trace!("Registered product query {token} for {} identifiers", product_ids.len());

        let catalog = Arc::clone(&self.catalog);
        let inflight = Arc::clone(&self.inflight);
        tokio::spawn(async move {
            let result = catalog.request_products(&product_ids).await;
            Self::complete(&inflight, token, result).await;
        });

        let result = response.await.map_err(|_| {
            PlatformError::unknown("Product query was dropped before completing")
        })?;
        Ok(result?)
    }

    /// Number of lookups currently waiting on the catalog.
    pub async fn in_flight(&self) -> usize {
        self.inflight.lock().await.len()
    }

    async fn complete(
        inflight: &Mutex<HashMap<Uuid, InflightQuery>>,
        token: Uuid,
        result: std::result::Result<ProductQueryResult, PlatformError>,
    ) {
        let query = inflight.lock().await.remove(&token);
        match query {
            Some(query) => {
                if let Ok(found) = &result {
                    debug!(
                        "Product query {token} finished: {} of {} matched",
                        found.products.len(),
                        query.product_ids.len()
                    );
                }
                if query.responder.send(result).is_err() {
                    debug!("Caller of product query {token} stopped waiting");
                }
            }
            None => debug!("Dropping response for unknown product query {token}"),
        }
    }
}
