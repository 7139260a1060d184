//! Ledger chain access: JSON-RPC reads and wallet-signed contract transactions

pub mod abi;
mod rpc;

pub use rpc::EvmRpc;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionReceipt, TransactionRequest, H256, U256, U64};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::wallet::WalletProvider;

/// Poll interval while waiting for a transaction receipt
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Nonce for the next send: the chain's pending count, unless this process
/// already broadcast past it
fn next_nonce(local: Option<U256>, chain_pending: U256) -> U256 {
    match local {
        Some(local) if local > chain_pending => local,
        _ => chain_pending,
    }
}

pub struct ChainClient {
    rpc: EvmRpc,
    wallet: Arc<dyn WalletProvider>,
    chain_id: u64,
    /// Held across nonce selection, signing and broadcast; holds the next nonce
    send_lock: Mutex<Option<U256>>,
}

impl ChainClient {
    pub fn new(rpc: EvmRpc, wallet: Arc<dyn WalletProvider>, chain_id: u64) -> Self {
        Self {
            rpc,
            wallet,
            chain_id,
            send_lock: Mutex::new(None),
        }
    }

    pub fn wallet(&self) -> &Arc<dyn WalletProvider> {
        &self.wallet
    }

    pub async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, String> {
        self.rpc.call(to, data).await
    }

    /// Sign and broadcast a contract call; returns the transaction hash.
    /// Sends from one process are serialized so each gets its own nonce.
    pub async fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
        value: U256,
    ) -> Result<H256, String> {
        let from = self.wallet.address();
        let mut next = self.send_lock.lock().await;

        let pending = self.rpc.get_transaction_count(from).await?;
        let nonce = next_nonce(*next, pending);
        let gas_price = self.rpc.gas_price().await?;
        let gas = self.rpc.estimate_gas(from, to, &data, value).await?;
        let gas = gas * U256::from(120) / U256::from(100); // 20% buffer

        log::info!(
            "[RPC] Sending tx to {:#x}: value={}, data_len={} bytes, gas={}, nonce={}",
            to,
            value,
            data.len(),
            gas,
            nonce
        );

        let tx = TransactionRequest::new()
            .from(from)
            .to(to)
            .value(value)
            .data(data)
            .nonce(nonce)
            .gas(gas)
            .gas_price(gas_price)
            .chain_id(self.chain_id);

        let typed_tx: TypedTransaction = tx.into();
        let signature = self.wallet.sign_transaction(&typed_tx).await?;
        let raw = typed_tx.rlp_signed(&signature);

        match self.rpc.send_raw_transaction(&raw).await {
            Ok(hash) => {
                *next = Some(nonce + U256::one());
                Ok(hash)
            }
            Err(e) => {
                // Unknown whether the node took it; re-seed from the chain next time
                *next = None;
                Err(e)
            }
        }
    }

    pub async fn receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, String> {
        self.rpc.get_transaction_receipt(hash).await
    }

    /// Poll until the transaction is mined. Callers bound this with a timeout.
    pub async fn wait_for_receipt(&self, hash: H256) -> Result<TransactionReceipt, String> {
        loop {
            if let Some(receipt) = self.receipt(hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    /// Send a transaction and wait for a successful receipt
    pub async fn transact(&self, to: Address, data: Vec<u8>, value: U256) -> Result<H256, String> {
        let hash = self.send_transaction(to, data, value).await?;
        let receipt = self.wait_for_receipt(hash).await?;

        if receipt.status != Some(U64::from(1)) {
            return Err(format!("Transaction {:?} reverted", hash));
        }

        Ok(hash)
    }
}
