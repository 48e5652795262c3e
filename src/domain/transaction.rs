use crate::error::PlatformError;
use serde::{Deserialize, Serialize};

/// Signed promotional-offer token attached to a payment.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct PaymentDiscount {
    pub identifier: String,
    pub key_identifier: String,
    pub nonce: uuid::Uuid,
    pub signature: String,
    pub timestamp: u64,
}

/// A payment request handed to the platform queue.
///
/// Built once per purchase call and never mutated afterwards.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PendingPurchase {
    pub product_id: String,
    pub quantity: u32,
    pub application_username: String,
    pub discount: Option<PaymentDiscount>,
}

impl PendingPurchase {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            quantity: 1,
            application_username: String::new(),
            discount: None,
        }
    }
}

/// The platform's handle for one purchase attempt.
///
/// Opaque to this crate apart from the product identifier, which is what
/// outcomes are routed by. Callers pass it back to finalize the transaction.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct TransactionHandle {
    /// Assigned by the platform once the transaction is purchased or restored.
    pub transaction_id: Option<String>,
    pub product_id: String,
    pub quantity: u32,
    pub application_username: String,
}

impl TransactionHandle {
    pub fn new(transaction_id: Option<String>, product_id: impl Into<String>) -> Self {
        Self {
            transaction_id,
            product_id: product_id.into(),
            quantity: 1,
            application_username: String::new(),
        }
    }

    pub fn for_payment(transaction_id: Option<String>, payment: &PendingPurchase) -> Self {
        Self {
            transaction_id,
            product_id: payment.product_id.clone(),
            quantity: payment.quantity,
            application_username: payment.application_username.clone(),
        }
    }
}

/// State of a transaction as reported by the platform queue.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TransactionState {
    Purchasing,
    Purchased,
    Restored,
    Deferred,
    Failed(Option<PlatformError>),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TransactionUpdate {
    pub transaction: TransactionHandle,
    pub state: TransactionState,
}

impl TransactionUpdate {
    pub fn new(transaction: TransactionHandle, state: TransactionState) -> Self {
        Self { transaction, state }
    }
}

/// Events emitted by the platform queue.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum QueueEvent {
    TransactionsUpdated(Vec<TransactionUpdate>),
    RestoreFinished,
    RestoreFailed(PlatformError),
}

/// Terminal result of a single transaction, as delivered to callers.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TransactionOutcome {
    Purchased(TransactionHandle),
    Restored(TransactionHandle),
    Deferred(TransactionHandle),
    Failed(TransactionHandle, PlatformError),
    Cancelled(TransactionHandle),
}

impl TransactionOutcome {
    /// Classifies a platform update. Returns `None` for non-terminal states.
    ///
    /// A failure caused by the user cancelling the payment sheet becomes
    /// `Cancelled`; a failure without an error gets a synthesized unknown one.
    pub fn from_update(update: TransactionUpdate) -> Option<Self> {
        let TransactionUpdate { transaction, state } = update;
        let outcome = match state {
            TransactionState::Purchasing => return None,
            TransactionState::Purchased => TransactionOutcome::Purchased(transaction),
            TransactionState::Restored => TransactionOutcome::Restored(transaction),
            TransactionState::Deferred => TransactionOutcome::Deferred(transaction),
            TransactionState::Failed(Some(error)) if error.is_payment_cancelled() => {
                TransactionOutcome::Cancelled(transaction)
            }
            TransactionState::Failed(Some(error)) => TransactionOutcome::Failed(transaction, error),
            TransactionState::Failed(None) => TransactionOutcome::Failed(
                transaction,
                PlatformError::unknown("Unknown error occurred"),
            ),
        };
        Some(outcome)
    }

    pub fn transaction(&self) -> &TransactionHandle {
        match self {
            TransactionOutcome::Purchased(t)
            | TransactionOutcome::Restored(t)
            | TransactionOutcome::Deferred(t)
            | TransactionOutcome::Failed(t, _)
            | TransactionOutcome::Cancelled(t) => t,
        }
    }
}
