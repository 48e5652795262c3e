use super::dispatcher::{FallbackHandler, QueueEventSink, TransactionDispatcher};
use super::products::ProductInfoProvider;
use super::receipts::ReceiptFetcher;
use super::validator::ReceiptValidator;
use crate::config::ValidatorConfig;
use crate::domain::ports::{
    SharedPaymentQueue, SharedProductCatalog, SharedReceiptStore, SharedReceiptTransport,
};
use crate::domain::product::{ProductDescriptor, ProductQueryResult};
use crate::domain::purchase::{ProductRef, PurchaseOutcome, PurchaseRequest, Validation};
use crate::domain::receipt::{ReceiptInfo, RefreshProperties, ValidationResult};
use crate::domain::transaction::{TransactionHandle, TransactionOutcome};
use crate::error::{ReceiptError, Result, StoreError};
use log::*;
use std::collections::HashSet;

/// The main entry point for purchasing products.
///
/// `PurchaseEngine` sequences a purchase through product resolution, payment,
/// receipt retrieval, validation and finalization. It holds no shared state of
/// its own: the routing table, the receipt refresh slot and the product query
/// table belong to the components it is built from.
#[derive(Clone)]
pub struct PurchaseEngine {
    dispatcher: TransactionDispatcher,
    products: ProductInfoProvider,
    receipts: ReceiptFetcher,
    validator: ReceiptValidator,
}

impl PurchaseEngine {
    /// Creates a new `PurchaseEngine` and starts its transaction dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `queue` - The platform purchase queue.
    /// * `catalog` - The platform product catalog.
    /// * `receipt_store` - Local receipt storage.
    /// * `transport` - Transport to the receipt validation service.
    /// * `config` - Validation endpoints.
    pub fn new(
        queue: SharedPaymentQueue,
        catalog: SharedProductCatalog,
        receipt_store: SharedReceiptStore,
        transport: SharedReceiptTransport,
        config: ValidatorConfig,
    ) -> Self {
        Self::from_parts(
            TransactionDispatcher::spawn(queue),
            ProductInfoProvider::new(catalog),
            ReceiptFetcher::new(receipt_store),
            ReceiptValidator::new(transport, config),
        )
    }

    pub fn from_parts(
        dispatcher: TransactionDispatcher,
        products: ProductInfoProvider,
        receipts: ReceiptFetcher,
        validator: ReceiptValidator,
    ) -> Self {
        Self {
            dispatcher,
            products,
            receipts,
            validator,
        }
    }

    /// Sink the platform adapter feeds queue events into.
    pub fn transaction_events(&self) -> QueueEventSink {
        self.dispatcher.event_sink()
    }

    pub fn can_make_payments(&self) -> bool {
        self.dispatcher.can_make_payments()
    }

    /// Installs the handler for transactions no purchase call is waiting on,
    /// such as restored purchases or ones left over from a previous run.
    pub fn set_fallback_handler(&self, handler: FallbackHandler) -> Result<()> {
        self.dispatcher.set_fallback(handler)
    }

    pub async fn retrieve_product_info(
        &self,
        product_ids: HashSet<String>,
    ) -> Result<ProductQueryResult> {
        self.products.retrieve_product_info(product_ids).await
    }

    pub async fn fetch_receipt(
        &self,
        force_refresh: bool,
        properties: Option<RefreshProperties>,
    ) -> std::result::Result<Vec<u8>, ReceiptError> {
        self.receipts.fetch(force_refresh, properties).await
    }

    pub async fn validate_receipt(
        &self,
        receipt: &[u8],
        shared_secret: Option<String>,
        exclude_old_transactions: Option<bool>,
    ) -> ValidationResult {
        self.validator
            .validate_data(receipt, shared_secret, exclude_old_transactions)
            .await
    }

    pub async fn validate_receipt_base64(
        &self,
        receipt_base64: String,
        shared_secret: Option<String>,
        exclude_old_transactions: Option<bool>,
    ) -> ValidationResult {
        self.validator
            .validate(receipt_base64, shared_secret, exclude_old_transactions)
            .await
    }

    pub async fn finalize(&self, transaction: &TransactionHandle) {
        self.dispatcher.finalize(transaction).await;
    }

    pub async fn restore(&self) -> Result<()> {
        self.dispatcher.restore().await
    }

    /// Buys a product and validates the resulting receipt.
    ///
    /// The transaction is finalized only once validation succeeded. Any
    /// failure after payment leaves it in the platform queue, which will
    /// deliver it again later (to the fallback handler).
    pub async fn purchase(&self, request: PurchaseRequest, validation: Validation) -> PurchaseOutcome {
        let product = match self.resolve_product(&request.product).await {
            Ok(product) => product,
            Err(error) => {
                warn!("Could not resolve product {}: {error}", request.product.product_id());
                return PurchaseOutcome::ProductFailed {
                    product_id: request.product.product_id().to_string(),
                    error,
                };
            }
        };

        debug!("Submitting payment for {}", product.product_id);
        let payment = request.payment_for(&product);
        let outcome = match self.dispatcher.submit(payment.clone()).await {
            Ok(outcome) => outcome,
            // The payment is in the queue; only its outcome went missing.
            Err(error @ StoreError::OutcomeLost) => {
                warn!("Lost the outcome of a submitted payment for {}", payment.product_id);
                return PurchaseOutcome::Failed {
                    transaction: TransactionHandle::for_payment(None, &payment),
                    error,
                };
            }
            Err(error) => {
                return PurchaseOutcome::ProductFailed {
                    product_id: product.product_id,
                    error,
                };
            }
        };

        let transaction = match outcome {
            TransactionOutcome::Purchased(transaction) | TransactionOutcome::Restored(transaction) => {
                transaction
            }
            TransactionOutcome::Deferred(transaction) => {
                return PurchaseOutcome::Deferred { transaction };
            }
            TransactionOutcome::Cancelled(transaction) => {
                return PurchaseOutcome::Cancelled { transaction };
            }
            TransactionOutcome::Failed(transaction, error) => {
                return PurchaseOutcome::Failed {
                    transaction,
                    error: error.into(),
                };
            }
        };

        debug!("Fetching receipt for transaction {:?}", transaction.transaction_id);
        let receipt = match self.receipts.fetch(request.force_refresh_receipt, None).await {
            Ok(receipt) => receipt,
            Err(error) => {
                return PurchaseOutcome::Failed {
                    transaction,
                    error: error.into(),
                };
            }
        };

        let validated = match validation {
            Validation::Internal { shared_secret } => self
                .validator
                .validate_data(
                    &receipt,
                    shared_secret,
                    Some(request.exclude_old_transactions),
                )
                .await
                .map_err(StoreError::from),
            Validation::Custom(validator) => validator
                .validate(&transaction, &receipt)
                .await
                .map(|()| ReceiptInfo::new()),
        };
        let validation = match validated {
            Ok(validation) => validation,
            Err(error) => {
                debug!("Receipt validation failed: {error}");
                return PurchaseOutcome::Failed { transaction, error };
            }
        };

        self.dispatcher.finalize(&transaction).await;
        info!(
            "Purchase of {} completed (transaction {:?})",
            transaction.product_id, transaction.transaction_id
        );
        PurchaseOutcome::Succeeded {
            transaction,
            receipt,
            validation,
        }
    }

    async fn resolve_product(&self, product: &ProductRef) -> Result<ProductDescriptor> {
        match product {
            ProductRef::Descriptor(product) => Ok(product.clone()),
            ProductRef::Id(product_id) => {
                let result = self
                    .products
                    .retrieve_product_info(HashSet::from([product_id.clone()]))
                    .await?;
                result
                    .first()
                    .cloned()
                    .ok_or_else(|| StoreError::UnknownProduct(product_id.clone()))
            }
        }
    }
}
