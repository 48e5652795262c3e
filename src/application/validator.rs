use crate::config::ValidatorConfig;
use crate::domain::ports::SharedReceiptTransport;
use crate::domain::receipt::{
    Environment, ReceiptInfo, ReceiptStatus, ValidationRequest, ValidationResult,
};
use crate::error::ReceiptError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::*;
use serde_json::Value;

/// Validates receipts against the remote validation service.
///
/// Requests always go to production first. When production answers that the
/// receipt belongs to the test environment (status 21007) the same payload is
/// sent once to the sandbox endpoint and that answer is final.
#[derive(Clone)]
pub struct ReceiptValidator {
    transport: SharedReceiptTransport,
    config: ValidatorConfig,
}

impl ReceiptValidator {
    pub fn new(transport: SharedReceiptTransport, config: ValidatorConfig) -> Self {
        Self { transport, config }
    }

    /// Base64-encodes raw receipt bytes and validates them.
    pub async fn validate_data(
        &self,
        receipt: &[u8],
        shared_secret: Option<String>,
        exclude_old_transactions: Option<bool>,
    ) -> ValidationResult {
        self.validate(STANDARD.encode(receipt), shared_secret, exclude_old_transactions)
            .await
    }

    pub async fn validate(
        &self,
        receipt_base64: String,
        shared_secret: Option<String>,
        exclude_old_transactions: Option<bool>,
    ) -> ValidationResult {
        let request = ValidationRequest {
            receipt_data: receipt_base64,
            shared_secret,
            exclude_old_transactions,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| ReceiptError::RequestBodyEncode(e.to_string()))?;

        match self.post(Environment::Production, body.clone()).await {
            Err(ReceiptError::ReceiptInvalid {
                status: ReceiptStatus::TestReceipt,
                ..
            }) => {
                debug!("Receipt is from the test environment, retrying against sandbox");
                self.post(Environment::Sandbox, body).await
            }
            result => result,
        }
    }

    async fn post(&self, environment: Environment, body: Vec<u8>) -> ValidationResult {
        let url = self.config.url(environment);
        trace!("Posting receipt to {url}");
        let data = self
            .transport
            .post_json(url, body)
            .await
            .map_err(|e| ReceiptError::Network(e.to_string()))?
            .filter(|data| !data.is_empty())
            .ok_or(ReceiptError::NoRemoteData)?;

        let receipt = match serde_json::from_slice::<Value>(&data) {
            Ok(Value::Object(receipt)) => receipt,
            Ok(_) => ReceiptInfo::new(),
            Err(e) => {
                return Err(ReceiptError::JsonDecode {
                    message: e.to_string(),
                    response: String::from_utf8(data).ok(),
                });
            }
        };

        match ReceiptStatus::from_receipt(&receipt) {
            ReceiptStatus::Valid => {
                debug!("Receipt accepted by {environment:?} endpoint");
                Ok(receipt)
            }
            status => {
                debug!("Receipt rejected by {environment:?} endpoint: {status}");
                Err(ReceiptError::ReceiptInvalid { status, receipt })
            }
        }
    }
}
