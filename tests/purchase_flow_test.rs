mod common;

use async_trait::async_trait;
use common::{Harness, PRODUCTION_URL, SANDBOX_URL};
use iap_relay::domain::ports::CustomReceiptValidator;
use iap_relay::domain::product::ProductDescriptor;
use iap_relay::domain::purchase::{PurchaseOutcome, PurchaseRequest, Validation};
use iap_relay::domain::transaction::{
    PaymentDiscount, QueueEvent, TransactionHandle, TransactionOutcome, TransactionState, TransactionUpdate,
};
use iap_relay::error::{PlatformError, PlatformErrorKind, ReceiptError, StoreError};
use iap_relay::infrastructure::in_memory::InMemoryReceiptStore;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

fn internal() -> Validation {
    Validation::Internal {
        shared_secret: Some("secret".to_string()),
    }
}

fn start(
    harness: &Harness,
    request: PurchaseRequest,
    validation: Validation,
) -> tokio::task::JoinHandle<PurchaseOutcome> {
    let engine = harness.engine.clone();
    tokio::spawn(async move { engine.purchase(request, validation).await })
}

#[tokio::test]
async fn test_successful_purchase_is_validated_and_finalized() {
    let harness = Harness::with_cached_receipt();
    harness
        .transport
        .push_json(json!({
            "status": 0,
            "latest_receipt_info": [{ "product_id": "com.app.pro", "transaction_id": "T1" }]
        }))
        .await;

    let purchase = start(&harness, PurchaseRequest::new("com.app.pro"), internal());
    harness.settle(1, "T1", TransactionState::Purchased).await;

    match purchase.await.unwrap() {
        PurchaseOutcome::Succeeded {
            transaction,
            receipt,
            validation,
        } => {
            assert_eq!(transaction.transaction_id.as_deref(), Some("T1"));
            assert_eq!(receipt, b"receipt".to_vec());
            assert_eq!(validation["latest_receipt_info"][0]["transaction_id"], "T1");
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let finished = harness.queue.finished().await;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].transaction_id.as_deref(), Some("T1"));

    let requests = harness.transport.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, PRODUCTION_URL);
    assert_eq!(requests[0].1["receipt-data"], "cmVjZWlwdA==");
    assert_eq!(requests[0].1["password"], "secret");
    assert_eq!(requests[0].1["exclude-old-transactions"], false);
}

#[tokio::test]
async fn test_cancelled_purchase_skips_receipt_and_finalization() {
    let harness = Harness::with_cached_receipt();

    let purchase = start(&harness, PurchaseRequest::new("com.app.pro"), internal());
    let cancelled = PlatformError::new(PlatformErrorKind::PaymentCancelled, "user cancelled");
    harness
        .settle(1, "T1", TransactionState::Failed(Some(cancelled)))
        .await;

    assert!(matches!(
        purchase.await.unwrap(),
        PurchaseOutcome::Cancelled { .. }
    ));
    assert!(harness.transport.requests().await.is_empty());
    assert!(harness.queue.finished().await.is_empty());
    assert_eq!(harness.receipts.refresh_count(), 0);
}

#[tokio::test]
async fn test_deferred_purchase_is_reported_without_validation() {
    let harness = Harness::with_cached_receipt();

    let purchase = start(&harness, PurchaseRequest::new("com.app.pro"), internal());
    harness.settle(1, "T1", TransactionState::Deferred).await;

    let outcome = purchase.await.unwrap();
    assert!(matches!(outcome, PurchaseOutcome::Deferred { .. }));
    assert_eq!(outcome.transaction().unwrap().product_id, "com.app.pro");
    assert!(harness.transport.requests().await.is_empty());
    assert!(harness.queue.finished().await.is_empty());
}

#[tokio::test]
async fn test_failed_purchase_carries_platform_error() {
    let harness = Harness::with_cached_receipt();

    let purchase = start(&harness, PurchaseRequest::new("com.app.pro"), internal());
    let invalid = PlatformError::new(PlatformErrorKind::PaymentInvalid, "bad payment");
    harness
        .settle(1, "T1", TransactionState::Failed(Some(invalid.clone())))
        .await;

    match purchase.await.unwrap() {
        PurchaseOutcome::Failed {
            error: StoreError::Platform(error),
            ..
        } => assert_eq!(error, invalid),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(harness.queue.finished().await.is_empty());
}

#[tokio::test]
async fn test_missing_receipt_leaves_transaction_unfinished() {
    let harness = Harness::new(InMemoryReceiptStore::new(None));

    let purchase = start(&harness, PurchaseRequest::new("com.app.pro"), internal());
    harness.settle(1, "T1", TransactionState::Purchased).await;

    assert!(matches!(
        purchase.await.unwrap(),
        PurchaseOutcome::Failed {
            error: StoreError::Receipt(ReceiptError::NoReceiptData),
            ..
        }
    ));
    assert_eq!(harness.receipts.refresh_count(), 1);
    assert!(harness.transport.requests().await.is_empty());
    assert!(harness.queue.finished().await.is_empty());
}

#[tokio::test]
async fn test_rejected_receipt_leaves_transaction_unfinished() {
    let harness = Harness::with_cached_receipt();
    harness.transport.push_json(json!({ "status": 21004 })).await;

    let purchase = start(&harness, PurchaseRequest::new("com.app.pro"), internal());
    harness.settle(1, "T1", TransactionState::Purchased).await;

    match purchase.await.unwrap() {
        PurchaseOutcome::Failed {
            error: StoreError::Receipt(ReceiptError::ReceiptInvalid { receipt, .. }),
            ..
        } => assert_eq!(receipt["status"], 21004),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(harness.queue.finished().await.is_empty());
}

#[tokio::test]
async fn test_sandbox_receipt_is_accepted_after_retry() {
    let harness = Harness::with_cached_receipt();
    harness.transport.push_json(json!({ "status": 21007 })).await;
    harness
        .transport
        .push_json(json!({ "status": 0, "environment": "Sandbox" }))
        .await;

    let purchase = start(&harness, PurchaseRequest::new("com.app.pro"), internal());
    harness.settle(1, "T1", TransactionState::Purchased).await;

    match purchase.await.unwrap() {
        PurchaseOutcome::Succeeded { validation, .. } => {
            assert_eq!(validation["environment"], "Sandbox")
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(
        harness.transport.urls().await,
        vec![PRODUCTION_URL.to_string(), SANDBOX_URL.to_string()]
    );
    assert_eq!(harness.queue.finished().await.len(), 1);
}

#[tokio::test]
async fn test_restored_state_completes_purchase() {
    let harness = Harness::with_cached_receipt();
    harness.transport.push_json(json!({ "status": 0 })).await;

    let purchase = start(&harness, PurchaseRequest::new("com.app.pro"), internal());
    harness.settle(1, "T0", TransactionState::Restored).await;

    assert!(purchase.await.unwrap().is_success());
    assert_eq!(harness.queue.finished().await.len(), 1);
}

#[tokio::test]
async fn test_unknown_product_never_reaches_the_queue() {
    let harness = Harness::with_cached_receipt();

    let outcome = harness
        .engine
        .purchase(PurchaseRequest::new("com.app.missing"), internal())
        .await;

    match outcome {
        PurchaseOutcome::ProductFailed {
            product_id,
            error: StoreError::UnknownProduct(id),
        } => {
            assert_eq!(product_id, "com.app.missing");
            assert_eq!(id, "com.app.missing");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(harness.queue.payments().await.is_empty());
}

#[tokio::test]
async fn test_descriptor_purchase_carries_payment_options() {
    let harness = Harness::with_cached_receipt();
    harness.transport.push_json(json!({ "status": 0 })).await;

    // Not in the catalog: a descriptor is used as-is.
    let product = ProductDescriptor::new("com.app.limited", dec!(9.99), "EUR");
    let request = PurchaseRequest::new(product)
        .quantity(3)
        .application_username("user-hash")
        .exclude_old_transactions(true);
    let purchase = start(&harness, request, internal());
    harness.settle(1, "T9", TransactionState::Purchased).await;

    assert!(purchase.await.unwrap().is_success());
    let payment = &harness.queue.payments().await[0];
    assert_eq!(payment.product_id, "com.app.limited");
    assert_eq!(payment.quantity, 3);
    assert_eq!(payment.application_username, "user-hash");
    assert_eq!(
        harness.transport.requests().await[0].1["exclude-old-transactions"],
        true
    );
}

#[tokio::test]
async fn test_promotional_discount_reaches_the_queue() {
    let harness = Harness::with_cached_receipt();
    harness.transport.push_json(json!({ "status": 0 })).await;

    let discount = PaymentDiscount {
        identifier: "winback-50".to_string(),
        key_identifier: "KEY123".to_string(),
        nonce: Uuid::new_v4(),
        signature: "c2lnbmF0dXJl".to_string(),
        timestamp: 1_700_000_000_000,
    };
    let request = PurchaseRequest::new("com.app.pro").discount(discount.clone());
    let purchase = start(&harness, request, internal());
    harness.settle(1, "T1", TransactionState::Purchased).await;

    assert!(purchase.await.unwrap().is_success());
    let payments = harness.queue.payments().await;
    assert_eq!(payments[0].discount, Some(discount));
}

#[tokio::test]
async fn test_forced_refresh_before_validation() {
    let harness = Harness::new(
        InMemoryReceiptStore::new(Some(b"stale".to_vec())).with_refreshed_receipt(b"fresh".to_vec()),
    );
    harness.transport.push_json(json!({ "status": 0 })).await;

    let request = PurchaseRequest::new("com.app.pro").force_refresh_receipt(true);
    let purchase = start(&harness, request, internal());
    harness.settle(1, "T1", TransactionState::Purchased).await;

    match purchase.await.unwrap() {
        PurchaseOutcome::Succeeded { receipt, .. } => assert_eq!(receipt, b"fresh".to_vec()),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(harness.receipts.refresh_count(), 1);
}

struct RecordingValidator {
    accept: bool,
    seen: Mutex<Vec<(TransactionHandle, Vec<u8>)>>,
}

impl RecordingValidator {
    fn new(accept: bool) -> Arc<Self> {
        Arc::new(Self {
            accept,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CustomReceiptValidator for RecordingValidator {
    async fn validate(&self, transaction: &TransactionHandle, receipt: &[u8]) -> Result<(), StoreError> {
        self.seen
            .lock()
            .unwrap()
            .push((transaction.clone(), receipt.to_vec()));
        if self.accept {
            Ok(())
        } else {
            Err(StoreError::CustomValidation("server said no".to_string()))
        }
    }
}

#[tokio::test]
async fn test_custom_validator_accepts_receipt() {
    let harness = Harness::with_cached_receipt();
    let validator = RecordingValidator::new(true);

    let purchase = start(
        &harness,
        PurchaseRequest::new("com.app.pro"),
        Validation::Custom(validator.clone()),
    );
    harness.settle(1, "T1", TransactionState::Purchased).await;

    match purchase.await.unwrap() {
        PurchaseOutcome::Succeeded { validation, .. } => assert!(validation.is_empty()),
        other => panic!("unexpected outcome {:?}", other),
    }
    let seen = validator.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.transaction_id.as_deref(), Some("T1"));
    assert_eq!(seen[0].1, b"receipt".to_vec());
    assert!(harness.transport.requests().await.is_empty());
    assert_eq!(harness.queue.finished().await.len(), 1);
}

#[tokio::test]
async fn test_custom_validator_rejection_leaves_transaction_unfinished() {
    let harness = Harness::with_cached_receipt();

    let purchase = start(
        &harness,
        PurchaseRequest::new("com.app.pro"),
        Validation::Custom(RecordingValidator::new(false)),
    );
    harness.settle(1, "T1", TransactionState::Purchased).await;

    assert!(matches!(
        purchase.await.unwrap(),
        PurchaseOutcome::Failed {
            error: StoreError::CustomValidation(_),
            ..
        }
    ));
    assert!(harness.queue.finished().await.is_empty());
}

#[tokio::test]
async fn test_restore_delivers_transactions_to_fallback() {
    let harness = Harness::with_cached_receipt();
    let (delivered, mut received) = mpsc::unbounded_channel();
    harness
        .engine
        .set_fallback_handler(Arc::new(move |outcome: TransactionOutcome| {
            let _ = delivered.send(outcome);
        }))
        .unwrap();

    let engine = harness.engine.clone();
    let restore = tokio::spawn(async move { engine.restore().await });
    harness.queue.wait_for_restores(1).await;

    let handle = TransactionHandle::new(Some("T0".to_string()), "com.app.pro");
    harness
        .events
        .transactions_updated(vec![TransactionUpdate::new(
            handle.clone(),
            TransactionState::Restored,
        )])
        .unwrap();
    harness
        .events
        .send(QueueEvent::RestoreFinished)
        .unwrap();

    restore.await.unwrap().unwrap();
    assert_eq!(
        received.recv().await,
        Some(TransactionOutcome::Restored(handle))
    );
}

#[tokio::test]
async fn test_can_make_payments_reflects_queue() {
    let harness = Harness::with_cached_receipt();
    assert!(harness.engine.can_make_payments());

    harness.queue.set_can_make_payments(false);
    assert!(!harness.engine.can_make_payments());
}
