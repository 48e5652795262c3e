use crate::error::ReceiptError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Decoded JSON body returned by the validation service.
pub type ReceiptInfo = Map<String, Value>;

/// Result of validating one receipt.
pub type ValidationResult = Result<ReceiptInfo, ReceiptError>;

/// Properties passed along with a receipt refresh (used by test environments
/// to request expired or revoked receipts).
pub type RefreshProperties = HashMap<String, Value>;

/// Status codes returned by the validation service in the `status` field.
///
/// `None` means the field was absent; `Unknown` means it held a code outside
/// this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiptStatus {
    Unknown,
    None,
    Valid,
    /// The request was not made using HTTP POST.
    JsonNotReadable,
    /// The receipt-data property was malformed or the service had a temporary issue.
    MalformedOrMissingData,
    ReceiptCouldNotBeAuthenticated,
    /// The shared secret does not match the one on file for the account.
    SecretNotMatching,
    ReceiptServerUnavailable,
    /// Valid receipt whose subscription has expired.
    SubscriptionExpired,
    /// Sandbox receipt sent to the production endpoint.
    TestReceipt,
    /// Production receipt sent to the sandbox endpoint.
    ProductionEnvironment,
    InternalDataAccessError,
    UserAccountNotFound,
}

impl ReceiptStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ReceiptStatus::Valid,
            21000 => ReceiptStatus::JsonNotReadable,
            21002 => ReceiptStatus::MalformedOrMissingData,
            21003 => ReceiptStatus::ReceiptCouldNotBeAuthenticated,
            21004 => ReceiptStatus::SecretNotMatching,
            21005 => ReceiptStatus::ReceiptServerUnavailable,
            21006 => ReceiptStatus::SubscriptionExpired,
            21007 => ReceiptStatus::TestReceipt,
            21008 => ReceiptStatus::ProductionEnvironment,
            21009 => ReceiptStatus::InternalDataAccessError,
            21010 => ReceiptStatus::UserAccountNotFound,
            _ => ReceiptStatus::Unknown,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ReceiptStatus::Unknown => -2,
            ReceiptStatus::None => -1,
            ReceiptStatus::Valid => 0,
            ReceiptStatus::JsonNotReadable => 21000,
            ReceiptStatus::MalformedOrMissingData => 21002,
            ReceiptStatus::ReceiptCouldNotBeAuthenticated => 21003,
            ReceiptStatus::SecretNotMatching => 21004,
            ReceiptStatus::ReceiptServerUnavailable => 21005,
            ReceiptStatus::SubscriptionExpired => 21006,
            ReceiptStatus::TestReceipt => 21007,
            ReceiptStatus::ProductionEnvironment => 21008,
            ReceiptStatus::InternalDataAccessError => 21009,
            ReceiptStatus::UserAccountNotFound => 21010,
        }
    }

    /// Reads the `status` field of a response body.
    pub fn from_receipt(receipt: &ReceiptInfo) -> Self {
        receipt
            .get("status")
            .and_then(Value::as_i64)
            .map(Self::from_code)
            .unwrap_or(ReceiptStatus::None)
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Which validation endpoint a request is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Sandbox,
}

/// Body of a validation request.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ValidationRequest {
    #[serde(rename = "receipt-data")]
    pub receipt_data: String,
    #[serde(rename = "password", skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
    #[serde(
        rename = "exclude-old-transactions",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_old_transactions: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_codes_round_trip_through_known_set() {
        for code in [0, 21000, 21002, 21003, 21004, 21005, 21006, 21007, 21008, 21009, 21010] {
            assert_eq!(ReceiptStatus::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_unrecognized_code_is_unknown() {
        assert_eq!(ReceiptStatus::from_code(21001), ReceiptStatus::Unknown);
        assert_eq!(ReceiptStatus::from_code(42), ReceiptStatus::Unknown);
    }

    #[test]
    fn test_missing_status_is_none_not_unknown() {
        let receipt = json!({ "environment": "Production" });
        let status = ReceiptStatus::from_receipt(receipt.as_object().unwrap());
        assert_eq!(status, ReceiptStatus::None);

        let receipt = json!({ "status": "0" });
        let status = ReceiptStatus::from_receipt(receipt.as_object().unwrap());
        assert_eq!(status, ReceiptStatus::None);
    }

    #[test]
    fn test_request_omits_absent_fields() {
        let request = ValidationRequest {
            receipt_data: "cmVjZWlwdA==".to_string(),
            shared_secret: None,
            exclude_old_transactions: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body, json!({ "receipt-data": "cmVjZWlwdA==" }));
    }

    #[test]
    fn test_request_includes_optional_fields() {
        let request = ValidationRequest {
            receipt_data: "cmVjZWlwdA==".to_string(),
            shared_secret: Some("s3cret".to_string()),
            exclude_old_transactions: Some(true),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "receipt-data": "cmVjZWlwdA==",
                "password": "s3cret",
                "exclude-old-transactions": true
            })
        );
    }
}
