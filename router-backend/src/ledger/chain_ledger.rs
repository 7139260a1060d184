//! On-chain ledger contract backend

use async_trait::async_trait;
use ethers::types::{Address, H256, U256, U64};
use std::str::FromStr;
use std::sync::Arc;

use super::{LedgerService, TopUpReceipt, TopUpStatus};
use crate::chain::{abi, ChainClient};

pub struct ChainLedger {
    chain: Arc<ChainClient>,
    contract: Address,
}

impl ChainLedger {
    pub fn new(chain: Arc<ChainClient>, contract: Address) -> Self {
        Self { chain, contract }
    }
}

#[async_trait]
impl LedgerService for ChainLedger {
    async fn get_balance(&self) -> Result<U256, String> {
        let owner = self.chain.wallet().address();
        let data = self
            .chain
            .call(self.contract, &abi::encode_get_balance(owner))
            .await?;
        abi::decode_uint(&data)
    }

    async fn submit_top_up(&self, amount: U256) -> Result<TopUpReceipt, String> {
        let hash = self
            .chain
            .send_transaction(self.contract, abi::encode_deposit_fund(), amount)
            .await?;
        Ok(TopUpReceipt {
            tx_id: format!("{:?}", hash),
        })
    }

    async fn top_up_status(&self, receipt: &TopUpReceipt) -> Result<TopUpStatus, String> {
        let hash = H256::from_str(&receipt.tx_id)
            .map_err(|e| format!("Invalid top-up tx id {}: {}", receipt.tx_id, e))?;

        Ok(match self.chain.receipt(hash).await? {
            None => TopUpStatus::Pending,
            Some(r) if r.status == Some(U64::from(1)) => TopUpStatus::Confirmed,
            Some(_) => TopUpStatus::Failed(format!("deposit {} reverted", receipt.tx_id)),
        })
    }

    fn owner_address(&self) -> String {
        self.chain.wallet().get_address()
    }
}
