use crate::domain::ports::ReceiptTransport;
use crate::error::{StoreError, TransportError};
use async_trait::async_trait;
use log::*;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Arc;

/// Sends validation requests over HTTPS with `reqwest`.
///
/// No timeout is configured; a request waits until the server answers or the
/// connection fails.
#[derive(Clone)]
pub struct HttpReceiptTransport {
    client: Arc<Client>,
}

impl HttpReceiptTransport {
    pub fn new() -> Result<Self, StoreError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl ReceiptTransport for HttpReceiptTransport {
    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<Option<Vec<u8>>, TransportError> {
        trace!("POST {url} ({} bytes)", body.len());
        let response = self
            .client
            .post(url)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        trace!("{url} answered {}", response.status());
        let data = response
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        if data.is_empty() {
            Ok(None)
        } else {
            Ok(Some(data.to_vec()))
        }
    }
}
