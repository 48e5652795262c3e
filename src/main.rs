use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use iap_relay::application::products::ProductInfoProvider;
use iap_relay::application::receipts::ReceiptFetcher;
use iap_relay::application::validator::ReceiptValidator;
use iap_relay::config::ValidatorConfig;
use iap_relay::domain::product::ProductDescriptor;
use iap_relay::error::StoreError;
use iap_relay::infrastructure::file_receipt::FileReceiptStore;
use iap_relay::infrastructure::http::HttpReceiptTransport;
use iap_relay::infrastructure::in_memory::InMemoryCatalog;
use iap_relay::interfaces::csv::catalog_reader::CatalogReader;
use log::*;
use miette::{IntoDiagnostic, Result};
use std::collections::HashSet;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up product identifiers in a CSV product catalog
    Products {
        /// Product catalog CSV file
        #[arg(long)]
        catalog: PathBuf,

        /// Product identifiers to look up
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Validate a receipt file against the receipt validation service
    Validate {
        /// Receipt file (raw bytes, or base64 text with --base64)
        receipt: PathBuf,

        /// The receipt file already contains base64 text
        #[arg(long)]
        base64: bool,

        /// App-specific shared secret for auto-renewable subscriptions
        #[arg(long)]
        shared_secret: Option<String>,

        /// Only return the latest renewal transaction of each subscription
        #[arg(long)]
        exclude_old_transactions: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Products { catalog, ids } => lookup_products(catalog, ids).await,
        Command::Validate {
            receipt,
            base64,
            shared_secret,
            exclude_old_transactions,
        } => validate_receipt(receipt, base64, shared_secret, exclude_old_transactions).await,
    }
}

async fn lookup_products(catalog: PathBuf, ids: Vec<String>) -> Result<()> {
    let file = File::open(catalog).into_diagnostic()?;
    let mut products = Vec::new();
    for product in CatalogReader::new(file).products() {
        match product {
            Ok(product) => products.push(product),
            Err(e) => eprintln!("Error reading product: {}", e),
        }
    }
    debug!("Loaded {} catalog entries", products.len());

    let provider = ProductInfoProvider::new(Arc::new(InMemoryCatalog::new(products)));
    let ids: HashSet<String> = ids.into_iter().collect();
    let result = provider.retrieve_product_info(ids).await.into_diagnostic()?;

    let mut invalid: Vec<&String> = result.invalid_product_ids.iter().collect();
    invalid.sort();
    let output = serde_json::json!({
        "products": result.products.iter().collect::<Vec<&ProductDescriptor>>(),
        "invalid_product_ids": invalid,
    });
    println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
    Ok(())
}

async fn validate_receipt(
    receipt: PathBuf,
    is_base64: bool,
    shared_secret: Option<String>,
    exclude_old_transactions: bool,
) -> Result<()> {
    let fetcher = ReceiptFetcher::new(Arc::new(FileReceiptStore::new(&receipt)));
    let data = fetcher.fetch(false, None).await.into_diagnostic()?;
    let receipt_base64 = if is_base64 {
        String::from_utf8(data)
            .map_err(|e| StoreError::Config(format!("Receipt is not base64 text: {e}")))
            .into_diagnostic()?
            .trim()
            .to_string()
    } else {
        STANDARD.encode(data)
    };

    let transport = HttpReceiptTransport::new().into_diagnostic()?;
    let validator = ReceiptValidator::new(Arc::new(transport), ValidatorConfig::new_from_env_or_default());
    let exclude = exclude_old_transactions.then_some(true);
    let receipt_info = validator
        .validate(receipt_base64, shared_secret, exclude)
        .await
        .into_diagnostic()?;

    println!("{}", serde_json::to_string_pretty(&receipt_info).into_diagnostic()?);
    Ok(())
}
