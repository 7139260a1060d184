//! Wallet Provider Abstraction
//!
//! The router signs two kinds of things with the configured credential:
//! per-attempt request headers (ERC-191 messages) and ledger transactions
//! (top-ups, provider acknowledgements). Both go through [`WalletProvider`]
//! so tests and alternative custody backends can swap the key source.

mod env_provider;

pub use env_provider::EnvWalletProvider;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature};
use std::sync::Arc;

use crate::config::RouterConfig;
use crate::error::RouterError;

/// Trait for wallet providers - abstracts key custody from the signing call sites
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Sign an arbitrary message with the ERC-191 personal-sign prefix
    async fn sign_message(&self, message: &[u8]) -> Result<Signature, String>;

    /// Sign a transaction for broadcast
    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Signature, String>;

    /// Wallet address (lowercase hex)
    fn get_address(&self) -> String;

    /// Wallet address as a typed value
    fn address(&self) -> Address;

    /// Mode name for logging
    fn mode_name(&self) -> &'static str;
}

/// Create the wallet provider for a router context
pub fn create_wallet_provider(config: &RouterConfig) -> Result<Arc<dyn WalletProvider>, RouterError> {
    let provider = EnvWalletProvider::from_private_key(config.private_key(), config.chain_id)
        .map_err(RouterError::Configuration)?;

    log::info!(
        "Wallet provider initialized ({} mode): {}",
        provider.mode_name(),
        provider.get_address()
    );

    Ok(Arc::new(provider))
}
