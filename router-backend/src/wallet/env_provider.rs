//! Environment-based Wallet Provider
//!
//! The signing key comes from `ROUTER_PRIVATE_KEY` at start-up and stays in
//! memory for the life of the process.

use async_trait::async_trait;
use ethers::core::k256::ecdsa::SigningKey;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature};

use super::WalletProvider;

/// Wallet provider backed by a locally held private key
pub struct EnvWalletProvider {
    wallet: LocalWallet,
    address: String,
}

impl EnvWalletProvider {
    /// Create provider from a private key string (hex, with or without 0x)
    pub fn from_private_key(private_key: &str, chain_id: u64) -> Result<Self, String> {
        let key_hex = private_key.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let key_bytes = hex::decode(key_hex)
            .map_err(|e| format!("Invalid private key hex: {}", e))?;

        if key_bytes.len() != 32 {
            return Err(format!(
                "Invalid private key: expected 32 bytes, got {}",
                key_bytes.len()
            ));
        }

        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| format!("Invalid private key: {}", e))?;

        let wallet = LocalWallet::from(signing_key).with_chain_id(chain_id);
        let address = format!("{:#x}", wallet.address());

        Ok(Self { wallet, address })
    }
}

#[async_trait]
impl WalletProvider for EnvWalletProvider {
    async fn sign_message(&self, message: &[u8]) -> Result<Signature, String> {
        self.wallet
            .sign_message(message)
            .await
            .map_err(|e| format!("Message signing failed: {}", e))
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Signature, String> {
        self.wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| format!("Transaction signing failed: {}", e))
    }

    fn get_address(&self) -> String {
        self.address.clone()
    }

    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn mode_name(&self) -> &'static str {
        "env"
    }
}
