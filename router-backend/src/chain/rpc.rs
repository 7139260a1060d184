//! Minimal EVM JSON-RPC client for the ledger chain

use ethers::types::{Address, TransactionReceipt, H256, U256};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

pub struct EvmRpc {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl EvmRpc {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        log::debug!("[RPC] {} -> {}", method, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("RPC {} request failed: {}", method, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("RPC {} returned HTTP {}: {}", method, status.as_u16(), text));
        }

        let parsed: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| format!("Invalid RPC {} response: {}", method, e))?;

        if let Some(err) = parsed.error {
            return Err(format!("RPC {} error {}: {}", method, err.code, err.message));
        }

        serde_json::from_value(parsed.result.unwrap_or(Value::Null))
            .map_err(|e| format!("Unexpected RPC {} result: {}", method, e))
    }

    /// eth_call against the latest block
    pub async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, String> {
        let result: String = self
            .request(
                "eth_call",
                json!([
                    { "to": format!("{:#x}", to), "data": format!("0x{}", hex::encode(data)) },
                    "latest"
                ]),
            )
            .await?;

        let hex_str = result.strip_prefix("0x").unwrap_or(&result);
        hex::decode(hex_str).map_err(|e| format!("Invalid eth_call result hex: {}", e))
    }

    pub async fn get_transaction_count(&self, address: Address) -> Result<U256, String> {
        self.request(
            "eth_getTransactionCount",
            json!([format!("{:#x}", address), "pending"]),
        )
        .await
    }

    pub async fn gas_price(&self) -> Result<U256, String> {
        self.request("eth_gasPrice", json!([])).await
    }

    pub async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &[u8],
        value: U256,
    ) -> Result<U256, String> {
        self.request(
            "eth_estimateGas",
            json!([{
                "from": format!("{:#x}", from),
                "to": format!("{:#x}", to),
                "data": format!("0x{}", hex::encode(data)),
                "value": format!("{:#x}", value),
            }]),
        )
        .await
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256, String> {
        self.request(
            "eth_sendRawTransaction",
            json!([format!("0x{}", hex::encode(raw))]),
        )
        .await
    }

    pub async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, String> {
        self.request("eth_getTransactionReceipt", json!([format!("{:?}", hash)]))
            .await
    }
}
