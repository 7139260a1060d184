//! HTTP discovery client
//!
//! Reads the provider listing published by the marketplace indexer:
//! `GET {base}/providers` returning a JSON array of provider entries.

use async_trait::async_trait;
use reqwest::Client;

use super::types::DiscoveredProvider;
use super::DiscoveryService;

pub struct HttpDiscovery {
    client: Client,
    base_url: String,
}

impl HttpDiscovery {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn providers_url(&self) -> String {
        format!("{}/providers", self.base_url)
    }
}

#[async_trait]
impl DiscoveryService for HttpDiscovery {
    async fn list_providers(&self) -> Result<Vec<DiscoveredProvider>, String> {
        let url = self.providers_url();
        log::debug!("[REGISTRY] Fetching provider listing from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("Discovery request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Discovery returned HTTP {}: {}", status.as_u16(), body));
        }

        response
            .json::<Vec<DiscoveredProvider>>()
            .await
            .map_err(|e| format!("Failed to parse provider listing: {}", e))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
