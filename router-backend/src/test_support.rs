//! Shared fixtures for unit tests

use async_trait::async_trait;
use ethers::types::{H256, U256};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::auth::ProviderHandshake;
use crate::domain_types::ProviderAddress;
use crate::ledger::{LedgerService, TopUpReceipt, TopUpStatus};
use crate::registry::{
    DiscoveredProvider, DiscoveryService, KnownProviderEntry, KnownProviderTable, Provider,
    Verifiability,
};
use crate::verifier::ResponseVerifier;
use crate::wallet::{EnvWalletProvider, WalletProvider};

/// Well-known local development key (Hardhat account #0)
pub const TEST_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn address(n: u8) -> ProviderAddress {
    ProviderAddress::parse(&format!("0x{:040x}", n)).unwrap()
}

pub fn provider(n: u8, endpoint: &str) -> Provider {
    Provider {
        address: address(n),
        endpoint: endpoint.trim_end_matches('/').to_string(),
        model: format!("model-{}", n),
        verifiability: Verifiability::None,
        priority_rank: None,
        tee_signer: None,
    }
}

pub fn discovered(n: u8) -> DiscoveredProvider {
    DiscoveredProvider {
        address: address(n).to_hex(),
        endpoint: format!("https://p{}.example.com", n),
        model: format!("model-{}", n),
        verifiability: Verifiability::None,
        tee_signer: None,
    }
}

/// Discovery entry for an already-built provider (e.g. one pointed at a mock server)
pub fn discovered_from(p: &Provider) -> DiscoveredProvider {
    DiscoveredProvider {
        address: p.address.to_hex(),
        endpoint: p.endpoint.clone(),
        model: p.model.clone(),
        verifiability: p.verifiability,
        tee_signer: p.tee_signer.map(|s| s.to_hex()),
    }
}

pub fn known_table(ranks: &[(u8, u32)]) -> KnownProviderTable {
    KnownProviderTable::from_entries(
        ranks
            .iter()
            .map(|(n, rank)| KnownProviderEntry {
                address: address(*n).to_hex(),
                endpoint: format!("https://p{}.example.com", n),
                model: format!("model-{}", n),
                verifiability: Verifiability::None,
                rank: *rank,
                tee_signer: None,
            })
            .collect(),
    )
    .unwrap()
}

/// Known-good table built from providers and their ranks
pub fn known_table_of(entries: &[(&Provider, u32)]) -> KnownProviderTable {
    KnownProviderTable::from_entries(
        entries
            .iter()
            .map(|(p, rank)| KnownProviderEntry {
                address: p.address.to_hex(),
                endpoint: p.endpoint.clone(),
                model: p.model.clone(),
                verifiability: p.verifiability,
                rank: *rank,
                tee_signer: p.tee_signer.map(|s| s.to_hex()),
            })
            .collect(),
    )
    .unwrap()
}

pub fn test_wallet() -> Arc<dyn WalletProvider> {
    Arc::new(EnvWalletProvider::from_private_key(TEST_PRIVATE_KEY, 1).unwrap())
}

/// OpenAI-shaped completion body
pub fn completion_json(id: &str, content: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion",
        "model": "served-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
    })
}

// =====================================================
// Chain JSON-RPC
// =====================================================

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

/// Mock the JSON-RPC calls behind a signed send: a fixed pending nonce,
/// gas quotes, a broadcast returning `0xabab..ab` and a successful receipt.
pub async fn mount_chain(server: &MockServer, pending_nonce: &str) {
    let hash = format!("{:?}", H256::repeat_byte(0xab));
    let replies = [
        ("eth_getTransactionCount", json!(pending_nonce)),
        ("eth_gasPrice", json!("0x3b9aca00")),
        ("eth_estimateGas", json!("0x5208")),
        ("eth_sendRawTransaction", json!(hash)),
        (
            "eth_getTransactionReceipt",
            json!({
                "transactionHash": hash,
                "transactionIndex": "0x0",
                "blockHash": format!("{:?}", H256::repeat_byte(0x01)),
                "blockNumber": "0x10",
                "from": format!("{:?}", test_wallet().address()),
                "to": "0x0000000000000000000000000000000000000abc",
                "cumulativeGasUsed": "0x5208",
                "gasUsed": "0x5208",
                "contractAddress": null,
                "logs": [],
                "status": "0x1",
                "logsBloom": format!("0x{}", "00".repeat(256)),
                "type": "0x0",
                "effectiveGasPrice": "0x3b9aca00"
            }),
        ),
    ];

    for (rpc_method, result) in replies {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": rpc_method})))
            .respond_with(rpc_result(result))
            .mount(server)
            .await;
    }
}

async fn rpc_requests(server: &MockServer, rpc_method: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.body_json::<Value>().ok())
        .filter(|body| body["method"] == rpc_method)
        .collect()
}

/// Number of JSON-RPC requests for `rpc_method` the server has seen
pub async fn rpc_calls(server: &MockServer, rpc_method: &str) -> usize {
    rpc_requests(server, rpc_method).await.len()
}

/// Raw signed transactions broadcast to the server, in arrival order
pub async fn raw_transactions(server: &MockServer) -> Vec<String> {
    rpc_requests(server, "eth_sendRawTransaction")
        .await
        .into_iter()
        .filter_map(|body| body["params"][0].as_str().map(str::to_string))
        .collect()
}

// =====================================================
// Discovery
// =====================================================

pub struct MockDiscovery {
    result: Result<Vec<DiscoveredProvider>, String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockDiscovery {
    pub fn returning(providers: Vec<DiscoveredProvider>) -> Self {
        Self {
            result: Ok(providers),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            result: Err(error.to_string()),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl DiscoveryService for MockDiscovery {
    async fn list_providers(&self) -> Result<Vec<DiscoveredProvider>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// =====================================================
// Ledger
// =====================================================

pub struct MockLedger {
    balance: Mutex<U256>,
    /// Submitted deposits not yet credited
    in_flight: Mutex<Vec<(String, U256)>>,
    pub top_ups: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_top_ups: AtomicBool,
    /// Report submitted deposits as pending
    pub hold_confirmation: AtomicBool,
    /// Report submitted deposits as reverted
    pub revert_top_ups: AtomicBool,
}

impl MockLedger {
    pub fn with_balance(balance: u64) -> Self {
        Self {
            balance: Mutex::new(U256::from(balance)),
            in_flight: Mutex::new(Vec::new()),
            top_ups: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_top_ups: AtomicBool::new(false),
            hold_confirmation: AtomicBool::new(false),
            revert_top_ups: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LedgerService for MockLedger {
    async fn get_balance(&self) -> Result<U256, String> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err("ledger unreachable".to_string());
        }
        Ok(*self.balance.lock())
    }

    async fn submit_top_up(&self, amount: U256) -> Result<TopUpReceipt, String> {
        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;
        if self.fail_top_ups.load(Ordering::SeqCst) {
            return Err("deposit rejected".to_string());
        }
        let n = self.top_ups.fetch_add(1, Ordering::SeqCst);
        let tx_id = format!("0x{:064x}", n + 1);
        self.in_flight.lock().push((tx_id.clone(), amount));
        Ok(TopUpReceipt { tx_id })
    }

    async fn top_up_status(&self, receipt: &TopUpReceipt) -> Result<TopUpStatus, String> {
        if self.hold_confirmation.load(Ordering::SeqCst) {
            return Ok(TopUpStatus::Pending);
        }
        let mut in_flight = self.in_flight.lock();
        let Some(pos) = in_flight.iter().position(|(id, _)| id == &receipt.tx_id) else {
            return Ok(TopUpStatus::Confirmed);
        };
        let (_, amount) = in_flight.remove(pos);
        if self.revert_top_ups.load(Ordering::SeqCst) {
            return Ok(TopUpStatus::Failed("execution reverted".to_string()));
        }
        let mut balance = self.balance.lock();
        *balance = balance.saturating_add(amount);
        Ok(TopUpStatus::Confirmed)
    }

    fn owner_address(&self) -> String {
        "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string()
    }
}

// =====================================================
// Handshake / verification
// =====================================================

pub struct MockHandshake {
    fail: bool,
    /// When set, only this provider is rejected
    only: Option<ProviderAddress>,
    delay: Option<Duration>,
}

impl MockHandshake {
    pub fn ok() -> Self {
        Self { fail: false, only: None, delay: None }
    }

    pub fn failing() -> Self {
        Self { fail: true, only: None, delay: None }
    }

    pub fn failing_for(provider: ProviderAddress) -> Self {
        Self { fail: true, only: Some(provider), delay: None }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { fail: false, only: None, delay: Some(delay) }
    }
}

#[async_trait]
impl ProviderHandshake for MockHandshake {
    async fn acknowledge(&self, provider: &Provider) -> Result<(), String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail && self.only.is_none_or(|only| only == provider.address) {
            return Err("acknowledgement reverted".to_string());
        }
        Ok(())
    }
}

pub struct MockVerifier {
    result: Result<bool, String>,
    /// Chat ids passed to `verify`, in call order
    pub chat_ids: Mutex<Vec<Option<String>>>,
}

impl MockVerifier {
    pub fn accepting() -> Self {
        Self {
            result: Ok(true),
            chat_ids: Mutex::new(Vec::new()),
        }
    }

    pub fn erroring() -> Self {
        Self {
            result: Err("signature endpoint unavailable".to_string()),
            chat_ids: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResponseVerifier for MockVerifier {
    async fn verify(
        &self,
        _provider: &Provider,
        _raw_response: &Value,
        chat_id: Option<&str>,
    ) -> Result<bool, String> {
        self.chat_ids.lock().push(chat_id.map(str::to_string));
        self.result.clone()
    }
}
