use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

/// Billing period of an auto-renewable subscription, e.g. 3 months.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
pub struct SubscriptionPeriod {
    pub unit: PeriodUnit,
    pub count: u32,
}

/// A product as returned by the platform catalog.
///
/// Descriptors are immutable once the catalog has produced them; the purchase
/// flow only ever reads the identifier back out of them.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
pub struct ProductDescriptor {
    /// The identifier the product is registered under in the store.
    pub product_id: String,
    /// Localized display title.
    pub title: String,
    /// Price in `currency`.
    pub price: Decimal,
    /// ISO 4217 currency code of `price`.
    pub currency: String,
    /// Present only for subscription products.
    pub subscription_period: Option<SubscriptionPeriod>,
}

impl ProductDescriptor {
    pub fn new(product_id: impl Into<String>, price: Decimal, currency: impl Into<String>) -> Self {
        let product_id = product_id.into();
        Self {
            title: product_id.clone(),
            product_id,
            price,
            currency: currency.into(),
            subscription_period: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_subscription_period(mut self, period: SubscriptionPeriod) -> Self {
        self.subscription_period = Some(period);
        self
    }

    pub fn is_subscription(&self) -> bool {
        self.subscription_period.is_some()
    }
}

/// Response of a catalog lookup: the products that matched and the
/// identifiers the catalog did not recognise.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct ProductQueryResult {
    pub products: Vec<ProductDescriptor>,
    pub invalid_product_ids: HashSet<String>,
}

impl ProductQueryResult {
    pub fn first(&self) -> Option<&ProductDescriptor> {
        self.products.first()
    }
}
