use super::ports::SharedReceiptValidator;
use super::product::ProductDescriptor;
use super::receipt::ReceiptInfo;
use super::transaction::{PaymentDiscount, PendingPurchase, TransactionHandle};
use crate::error::StoreError;

/// What is being bought: a bare identifier that still has to be resolved
/// against the catalog, or a descriptor the caller already holds.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductRef {
    Id(String),
    Descriptor(ProductDescriptor),
}

impl ProductRef {
    pub fn product_id(&self) -> &str {
        match self {
            ProductRef::Id(id) => id,
            ProductRef::Descriptor(product) => &product.product_id,
        }
    }
}

impl From<&str> for ProductRef {
    fn from(id: &str) -> Self {
        ProductRef::Id(id.to_string())
    }
}

impl From<String> for ProductRef {
    fn from(id: String) -> Self {
        ProductRef::Id(id)
    }
}

impl From<ProductDescriptor> for ProductRef {
    fn from(product: ProductDescriptor) -> Self {
        ProductRef::Descriptor(product)
    }
}

/// Parameters of one purchase call.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRequest {
    pub product: ProductRef,
    pub quantity: u32,
    pub application_username: String,
    pub discount: Option<PaymentDiscount>,
    /// Refresh the local receipt even if one is already present.
    pub force_refresh_receipt: bool,
    /// Only honoured by the built-in validator.
    pub exclude_old_transactions: bool,
}

impl PurchaseRequest {
    pub fn new(product: impl Into<ProductRef>) -> Self {
        Self {
            product: product.into(),
            quantity: 1,
            application_username: String::new(),
            discount: None,
            force_refresh_receipt: false,
            exclude_old_transactions: false,
        }
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn application_username(mut self, username: impl Into<String>) -> Self {
        self.application_username = username.into();
        self
    }

    pub fn discount(mut self, discount: PaymentDiscount) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn force_refresh_receipt(mut self, force: bool) -> Self {
        self.force_refresh_receipt = force;
        self
    }

    pub fn exclude_old_transactions(mut self, exclude: bool) -> Self {
        self.exclude_old_transactions = exclude;
        self
    }

    pub(crate) fn payment_for(&self, product: &ProductDescriptor) -> PendingPurchase {
        PendingPurchase {
            product_id: product.product_id.clone(),
            quantity: self.quantity,
            application_username: self.application_username.clone(),
            discount: self.discount.clone(),
        }
    }
}

/// How the receipt of a completed transaction is checked before finalizing.
#[derive(Clone)]
pub enum Validation {
    /// Post the receipt to the remote validation service.
    Internal { shared_secret: Option<String> },
    /// Hand the transaction and raw receipt to caller-supplied code.
    Custom(SharedReceiptValidator),
}

/// Final result of a purchase call.
#[derive(Debug)]
pub enum PurchaseOutcome {
    /// Validated and finalized. `validation` is empty when a custom validator
    /// was used.
    Succeeded {
        transaction: TransactionHandle,
        receipt: Vec<u8>,
        validation: ReceiptInfo,
    },
    Deferred {
        transaction: TransactionHandle,
    },
    Cancelled {
        transaction: TransactionHandle,
    },
    /// The transaction was not finalized and will be redelivered by the queue.
    Failed {
        transaction: TransactionHandle,
        error: StoreError,
    },
    /// The product could not be resolved; no payment was submitted.
    ProductFailed {
        product_id: String,
        error: StoreError,
    },
}

impl PurchaseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PurchaseOutcome::Succeeded { .. })
    }

    pub fn transaction(&self) -> Option<&TransactionHandle> {
        match self {
            PurchaseOutcome::Succeeded { transaction, .. }
            | PurchaseOutcome::Deferred { transaction }
            | PurchaseOutcome::Cancelled { transaction }
            | PurchaseOutcome::Failed { transaction, .. } => Some(transaction),
            PurchaseOutcome::ProductFailed { .. } => None,
        }
    }
}
