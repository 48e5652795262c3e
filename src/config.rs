use crate::domain::receipt::Environment;
use log::*;

pub const DEFAULT_PRODUCTION_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";
pub const DEFAULT_SANDBOX_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

/// Endpoints of the receipt validation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub production_url: String,
    /// Used only when production reports a sandbox receipt.
    pub sandbox_url: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            production_url: DEFAULT_PRODUCTION_URL.to_string(),
            sandbox_url: DEFAULT_SANDBOX_URL.to_string(),
        }
    }
}

impl ValidatorConfig {
    pub fn new(production_url: impl Into<String>, sandbox_url: impl Into<String>) -> Self {
        Self {
            production_url: production_url.into(),
            sandbox_url: sandbox_url.into(),
        }
    }

    pub fn new_from_env_or_default() -> Self {
        let production_url = std::env::var("IAP_RELAY_PRODUCTION_URL").unwrap_or_else(|_| {
            debug!("IAP_RELAY_PRODUCTION_URL not set, using {DEFAULT_PRODUCTION_URL}");
            DEFAULT_PRODUCTION_URL.to_string()
        });
        let sandbox_url = std::env::var("IAP_RELAY_SANDBOX_URL").unwrap_or_else(|_| {
            debug!("IAP_RELAY_SANDBOX_URL not set, using {DEFAULT_SANDBOX_URL}");
            DEFAULT_SANDBOX_URL.to_string()
        });
        Self {
            production_url,
            sandbox_url,
        }
    }

    pub fn url(&self, environment: Environment) -> &str {
        match environment {
            Environment::Production => &self.production_url,
            Environment::Sandbox => &self.sandbox_url,
        }
    }
}
