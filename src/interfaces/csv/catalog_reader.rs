use crate::domain::product::{PeriodUnit, ProductDescriptor, SubscriptionPeriod};
use crate::error::{Result, StoreError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct CatalogRecord {
    product_id: String,
    #[serde(default)]
    title: Option<String>,
    price: Decimal,
    currency: String,
    #[serde(default)]
    period_unit: Option<PeriodUnit>,
    #[serde(default)]
    period_count: Option<u32>,
}

impl TryFrom<CatalogRecord> for ProductDescriptor {
    type Error = StoreError;

    fn try_from(record: CatalogRecord) -> Result<Self> {
        let mut product = ProductDescriptor::new(record.product_id, record.price, record.currency);
        if let Some(title) = record.title.filter(|t| !t.is_empty()) {
            product = product.with_title(title);
        }
        match (record.period_unit, record.period_count) {
            (Some(unit), count) => {
                product = product.with_subscription_period(SubscriptionPeriod {
                    unit,
                    count: count.unwrap_or(1),
                });
            }
            (None, Some(_)) => {
                return Err(StoreError::Config(format!(
                    "Product {} has a period_count but no period_unit",
                    product.product_id
                )));
            }
            (None, None) => {}
        }
        Ok(product)
    }
}

/// Reads a product catalog from a CSV source.
///
/// Expected header: `product_id, title, price, currency, period_unit, period_count`.
/// The last two columns are only filled in for subscriptions.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    /// Creates a new `CatalogReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and converts catalog rows.
    pub fn products(self) -> impl Iterator<Item = Result<ProductDescriptor>> {
        self.reader.into_deserialize::<CatalogRecord>().map(|result| {
            result
                .map_err(StoreError::from)
                .and_then(ProductDescriptor::try_from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_catalog() {
        let data = "product_id, title, price, currency, period_unit, period_count\n\
                    com.app.pro, Pro, 4.99, USD, ,\n\
                    com.app.monthly, Monthly, 1.99, EUR, month, 1";
        let reader = CatalogReader::new(data.as_bytes());
        let results: Vec<Result<ProductDescriptor>> = reader.products().collect();

        assert_eq!(results.len(), 2);
        let pro = results[0].as_ref().unwrap();
        assert_eq!(pro.product_id, "com.app.pro");
        assert_eq!(pro.price, dec!(4.99));
        assert!(!pro.is_subscription());

        let monthly = results[1].as_ref().unwrap();
        assert_eq!(
            monthly.subscription_period,
            Some(SubscriptionPeriod {
                unit: PeriodUnit::Month,
                count: 1
            })
        );
    }

    #[test]
    fn test_reader_short_rows() {
        let data = "product_id, title, price, currency\ncom.app.coins, , 0.99, USD";
        let reader = CatalogReader::new(data.as_bytes());
        let product = reader.products().next().unwrap().unwrap();

        assert_eq!(product.title, "com.app.coins");
        assert_eq!(product.currency, "USD");
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "product_id, title, price, currency\ncom.app.pro, Pro, free, USD";
        let reader = CatalogReader::new(data.as_bytes());
        let results: Vec<Result<ProductDescriptor>> = reader.products().collect();

        assert!(results[0].is_err());
    }

    #[test]
    fn test_reader_count_without_unit() {
        let data = "product_id, title, price, currency, period_unit, period_count\n\
                    com.app.odd, Odd, 1.00, USD, , 3";
        let reader = CatalogReader::new(data.as_bytes());
        let results: Vec<Result<ProductDescriptor>> = reader.products().collect();

        assert!(matches!(results[0], Err(StoreError::Config(_))));
    }
}
