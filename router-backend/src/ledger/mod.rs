//! Prepaid balance management
//!
//! The ledger account is the only state shared across concurrent requests.
//! Balance reads run unlocked; only a shortfall takes the funding lock, which
//! re-reads the balance and owns the single in-flight deposit. While a
//! broadcast deposit is unconfirmed no second one is sent, even if the caller
//! that sent it gave up waiting. Ledger trouble never aborts routing:
//! providers reject underfunded calls themselves and the failover loop moves
//! on.

mod chain_ledger;

pub use chain_ledger::ChainLedger;

use async_trait::async_trait;
use ethers::types::U256;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Receipt polling interval while a deposit confirms
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpReceipt {
    pub tx_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopUpStatus {
    Pending,
    Confirmed,
    Failed(String),
}

/// Opaque prepaid-balance ledger
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn get_balance(&self) -> Result<U256, String>;

    /// Broadcast a deposit without waiting for it to be included
    async fn submit_top_up(&self, amount: U256) -> Result<TopUpReceipt, String>;

    async fn top_up_status(&self, receipt: &TopUpReceipt) -> Result<TopUpStatus, String>;

    fn owner_address(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAccount {
    pub owner_address: String,
    /// Last balance successfully read, if any
    pub total_balance: Option<U256>,
    pub min_threshold: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundsCheck {
    /// Balance after the check; last-known value when the read failed
    pub balance: Option<U256>,
    pub top_up_performed: bool,
}

impl FundsCheck {
    fn unchanged(balance: U256) -> Self {
        Self {
            balance: Some(balance),
            top_up_performed: false,
        }
    }
}

pub struct LedgerClient {
    service: Arc<dyn LedgerService>,
    min_threshold: U256,
    top_up_amount: U256,
    /// Bounds each ledger call and the wait for a deposit to confirm
    call_timeout: Duration,
    poll_interval: Duration,
    /// Deposit broadcast but not yet seen confirmed
    funding: Mutex<Option<TopUpReceipt>>,
    last_known: RwLock<Option<U256>>,
}

impl LedgerClient {
    pub fn new(
        service: Arc<dyn LedgerService>,
        min_threshold: U256,
        top_up_amount: U256,
        call_timeout: Duration,
    ) -> Self {
        Self {
            service,
            min_threshold,
            top_up_amount,
            call_timeout,
            poll_interval: CONFIRM_POLL_INTERVAL,
            funding: Mutex::new(None),
            last_known: RwLock::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn min_threshold(&self) -> U256 {
        self.min_threshold
    }

    pub fn last_known_balance(&self) -> Option<U256> {
        *self.last_known.read()
    }

    pub fn account(&self) -> LedgerAccount {
        LedgerAccount {
            owner_address: self.service.owner_address(),
            total_balance: self.last_known_balance(),
            min_threshold: self.min_threshold,
        }
    }

    /// Read the balance without topping up; refreshes the last-known value
    pub async fn current_balance(&self) -> Result<U256, String> {
        self.read_balance().await
    }

    /// Ensure the configured minimum threshold is available
    pub async fn ensure_default_funds(&self) -> FundsCheck {
        self.ensure_funds(self.min_threshold).await
    }

    pub async fn ensure_funds(&self, min_amount: U256) -> FundsCheck {
        let balance = match self.read_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                // Without a fresh reading we cannot tell whether a top-up is needed
                log::warn!("[LEDGER] Balance read failed (non-fatal): {}", e);
                return FundsCheck {
                    balance: self.last_known_balance(),
                    top_up_performed: false,
                };
            }
        };

        if balance >= min_amount {
            log::debug!("[LEDGER] Balance {} covers minimum {}", balance, min_amount);
            return FundsCheck::unchanged(balance);
        }

        let mut pending = self.funding.lock().await;

        if let Some(receipt) = pending.clone() {
            let status = tokio::time::timeout(self.call_timeout, self.service.top_up_status(&receipt))
                .await
                .unwrap_or_else(|_| Err("status check timed out".to_string()));
            match status {
                Ok(TopUpStatus::Confirmed) => {
                    log::info!("[LEDGER] Earlier top-up {} confirmed", receipt.tx_id);
                    *pending = None;
                }
                Ok(TopUpStatus::Failed(reason)) => {
                    log::warn!("[LEDGER] Earlier top-up {} failed: {}", receipt.tx_id, reason);
                    *pending = None;
                }
                Ok(TopUpStatus::Pending) => {
                    log::info!(
                        "[LEDGER] Top-up {} still pending, not sending another",
                        receipt.tx_id
                    );
                    return FundsCheck::unchanged(balance);
                }
                Err(e) => {
                    log::warn!("[LEDGER] Status of top-up {} unknown: {}", receipt.tx_id, e);
                    return FundsCheck::unchanged(balance);
                }
            }
        }

        // Another caller may have funded the account while we waited for the lock
        let balance = match self.read_balance().await {
            Ok(b) => b,
            Err(e) => {
                log::warn!("[LEDGER] Balance re-read failed (non-fatal): {}", e);
                return FundsCheck::unchanged(balance);
            }
        };
        if balance >= min_amount {
            return FundsCheck::unchanged(balance);
        }

        log::info!(
            "[LEDGER] Balance {} below minimum {}, topping up {}",
            balance,
            min_amount,
            self.top_up_amount
        );

        let submitted =
            tokio::time::timeout(self.call_timeout, self.service.submit_top_up(self.top_up_amount)).await;
        let receipt = match submitted {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                log::warn!("[LEDGER] Top-up failed (proceeding without funds guarantee): {}", e);
                return FundsCheck::unchanged(balance);
            }
            Err(_) => {
                log::warn!(
                    "[LEDGER] Top-up submission timed out after {}ms (proceeding without funds guarantee)",
                    self.call_timeout.as_millis()
                );
                return FundsCheck::unchanged(balance);
            }
        };

        log::info!("[LEDGER] Top-up broadcast: {}", receipt.tx_id);
        *pending = Some(receipt.clone());

        match self.await_confirmation(&receipt).await {
            TopUpStatus::Confirmed => {
                log::info!("[LEDGER] Top-up confirmed: {}", receipt.tx_id);
                *pending = None;
            }
            TopUpStatus::Failed(reason) => {
                log::warn!("[LEDGER] Top-up {} failed: {}", receipt.tx_id, reason);
                *pending = None;
                return FundsCheck::unchanged(balance);
            }
            TopUpStatus::Pending => {
                log::warn!(
                    "[LEDGER] Top-up {} not confirmed within {}ms; re-checking on the next request",
                    receipt.tx_id,
                    self.call_timeout.as_millis()
                );
                return FundsCheck::unchanged(balance);
            }
        }

        let refreshed = match self.read_balance().await {
            Ok(b) => b,
            Err(e) => {
                log::warn!("[LEDGER] Balance re-read after top-up failed: {}", e);
                let assumed = balance.saturating_add(self.top_up_amount);
                *self.last_known.write() = Some(assumed);
                assumed
            }
        };
        FundsCheck {
            balance: Some(refreshed),
            top_up_performed: true,
        }
    }

    /// Poll until the deposit settles or `call_timeout` runs out (`Pending`)
    async fn await_confirmation(&self, receipt: &TopUpReceipt) -> TopUpStatus {
        let poll = async {
            loop {
                match self.service.top_up_status(receipt).await {
                    Ok(TopUpStatus::Pending) => {}
                    Ok(settled) => return settled,
                    Err(e) => log::debug!("[LEDGER] Top-up status check failed: {}", e),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        tokio::time::timeout(self.call_timeout, poll)
            .await
            .unwrap_or(TopUpStatus::Pending)
    }

    async fn read_balance(&self) -> Result<U256, String> {
        let balance = tokio::time::timeout(self.call_timeout, self.service.get_balance())
            .await
            .map_err(|_| format!("timed out after {}ms", self.call_timeout.as_millis()))??;
        *self.last_known.write() = Some(balance);
        Ok(balance)
    }
}
