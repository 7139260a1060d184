use reqwest::Client;
use std::time::Duration;

/// Build the HTTP client shared by every outbound call of one router context.
///
/// `Client::clone()` is just an `Arc` increment, so components hold their own
/// clone. Per-call deadlines are applied by the caller, not here; the client
/// timeout is only a backstop.
pub fn build_client() -> Result<Client, String> {
    Client::builder()
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {}", e))
}
