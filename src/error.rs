use crate::domain::receipt::{ReceiptInfo, ReceiptStatus};
use std::fmt;
use thiserror::Error;

/// Error codes reported natively by the platform purchase queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformErrorKind {
    Unknown,
    ClientInvalid,
    PaymentCancelled,
    PaymentInvalid,
    PaymentNotAllowed,
    StoreProductNotAvailable,
    CloudServicePermissionDenied,
    CloudServiceNetworkConnectionFailed,
    CloudServiceRevoked,
}

impl PlatformErrorKind {
    /// The platform's numeric code for this error.
    pub fn code(&self) -> i64 {
        match self {
            PlatformErrorKind::Unknown => 0,
            PlatformErrorKind::ClientInvalid => 1,
            PlatformErrorKind::PaymentCancelled => 2,
            PlatformErrorKind::PaymentInvalid => 3,
            PlatformErrorKind::PaymentNotAllowed => 4,
            PlatformErrorKind::StoreProductNotAvailable => 5,
            PlatformErrorKind::CloudServicePermissionDenied => 6,
            PlatformErrorKind::CloudServiceNetworkConnectionFailed => 7,
            PlatformErrorKind::CloudServiceRevoked => 8,
        }
    }
}

impl fmt::Display for PlatformErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// An error raised by the platform (purchase queue, catalog or receipt refresh).
///
/// Passed through to callers unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Platform error {kind}: {message}")]
pub struct PlatformError {
    pub kind: PlatformErrorKind,
    pub message: String,
}

impl PlatformError {
    pub fn new(kind: PlatformErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::Unknown, message)
    }

    pub fn is_payment_cancelled(&self) -> bool {
        self.kind == PlatformErrorKind::PaymentCancelled
    }
}

/// Failure of a transport-level call to the validation service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Errors produced while obtaining or validating a receipt.
///
/// Cloneable so a single refresh outcome can be handed to every waiting caller.
#[derive(Error, Debug, Clone)]
pub enum ReceiptError {
    #[error("No receipt data available")]
    NoReceiptData,
    #[error("Validation service returned no data")]
    NoRemoteData,
    #[error("Could not encode validation request body: {0}")]
    RequestBodyEncode(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Could not decode validation response: {message}")]
    JsonDecode {
        message: String,
        response: Option<String>,
    },
    #[error("Receipt invalid: {status}")]
    ReceiptInvalid {
        status: ReceiptStatus,
        receipt: ReceiptInfo,
    },
    #[error("Receipt read failed: {0}")]
    ReceiptRead(String),
    #[error("Receipt refresh failed: {0}")]
    Refresh(PlatformError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Receipt(#[from] ReceiptError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("Unknown product: {0}")]
    UnknownProduct(String),
    #[error("Custom receipt validation failed: {0}")]
    CustomValidation(String),
    #[error("Transaction dispatcher is no longer running")]
    DispatcherStopped,
    #[error("Transaction dispatcher stopped before the outcome of a submitted payment arrived")]
    OutcomeLost,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
