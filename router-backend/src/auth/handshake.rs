//! Provider signer acknowledgement on the ledger contract

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::ProviderHandshake;
use crate::chain::{abi, ChainClient};
use crate::domain_types::ProviderAddress;
use crate::registry::Provider;

/// Acknowledges a provider's signing identity with an on-chain transaction.
///
/// At most one acknowledgement is in flight per provider. Concurrent callers
/// wait on the same cell; a failed transaction leaves the cell empty so the
/// next attempt retries.
pub struct ChainHandshake {
    chain: Arc<ChainClient>,
    contract: Address,
    acknowledged: DashMap<ProviderAddress, Arc<OnceCell<String>>>,
}

impl ChainHandshake {
    pub fn new(chain: Arc<ChainClient>, contract: Address) -> Self {
        Self {
            chain,
            contract,
            acknowledged: DashMap::new(),
        }
    }
}

#[async_trait]
impl ProviderHandshake for ChainHandshake {
    async fn acknowledge(&self, provider: &Provider) -> Result<(), String> {
        // Clone out so the shard guard is released before awaiting
        let cell = self
            .acknowledged
            .entry(provider.address)
            .or_default()
            .clone();

        cell.get_or_try_init(|| async {
            log::info!("[AUTH] Acknowledging provider signer {}", provider.address);
            let hash = self
                .chain
                .transact(
                    self.contract,
                    abi::encode_acknowledge(provider.address.into()),
                    U256::zero(),
                )
                .await?;
            Ok::<_, String>(format!("{:?}", hash))
        })
        .await?;

        Ok(())
    }
}
