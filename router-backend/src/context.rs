//! Router context
//!
//! One value per process, built from [`RouterConfig`] and handed to every
//! request handler. It owns the collaborators; nothing here is global.

use std::sync::Arc;
use std::time::Instant;

use crate::auth::{ChainHandshake, RequestAuthenticator, SignedHeaderIssuer};
use crate::chain::{ChainClient, EvmRpc};
use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::executor::InferenceExecutor;
use crate::http;
use crate::ledger::{ChainLedger, LedgerClient};
use crate::orchestrator::{FailoverOrchestrator, RoutingSettings};
use crate::registry::{DiscoveryService, HttpDiscovery, ProviderRegistry};
use crate::verifier::{AttestationVerifier, ResponseVerifier};
use crate::wallet::{self, WalletProvider};

pub struct RouterContext {
    pub config: RouterConfig,
    pub wallet: Arc<dyn WalletProvider>,
    pub orchestrator: Arc<FailoverOrchestrator>,
    pub started_at: Instant,
}

impl RouterContext {
    /// Wire the on-chain ledger, HTTP discovery and attestation verifier
    pub fn from_config(config: RouterConfig) -> Result<Self, RouterError> {
        config.validate()?;

        let client = http::build_client().map_err(RouterError::Configuration)?;
        let wallet = wallet::create_wallet_provider(&config)?;

        let rpc = EvmRpc::new(client.clone(), &config.rpc_url);
        let chain = Arc::new(ChainClient::new(rpc, wallet.clone(), config.chain_id));

        let ledger = LedgerClient::new(
            Arc::new(ChainLedger::new(chain.clone(), config.ledger_contract)),
            config.min_balance,
            config.top_up_amount,
            config.top_up_timeout,
        );

        let discovery: Option<Arc<dyn DiscoveryService>> = config
            .discovery_url
            .as_deref()
            .map(|url| Arc::new(HttpDiscovery::new(client.clone(), url)) as Arc<dyn DiscoveryService>);
        if discovery.is_none() {
            log::warn!("[REGISTRY] No discovery URL configured; routing from the known-good table only");
        }

        let mut registry = ProviderRegistry::new(
            discovery,
            Arc::new(config.known_providers.clone()),
            config.discovery_timeout,
        );
        if let Some(ttl) = config.discovery_cache_ttl {
            registry = registry.with_cache_ttl(ttl);
        }

        let authenticator = RequestAuthenticator::new(
            Arc::new(ChainHandshake::new(chain, config.ledger_contract)),
            Arc::new(SignedHeaderIssuer::new(wallet.clone(), config.chain_id)),
            config.require_handshake,
            config.handshake_timeout,
        );

        let verifier: Arc<dyn ResponseVerifier> = Arc::new(AttestationVerifier::new(client.clone()));

        let orchestrator = FailoverOrchestrator::new(
            Arc::new(ledger),
            Arc::new(registry),
            Arc::new(authenticator),
            Arc::new(InferenceExecutor::new(client)),
            verifier,
            RoutingSettings::from_config(&config),
        );

        log::info!(
            "[ROUTER] Context ready: chain {}, {} known provider(s), exhaustion policy {}",
            config.chain_id,
            config.known_providers.len(),
            config.exhaustion_policy
        );

        Ok(Self {
            config,
            wallet,
            orchestrator: Arc::new(orchestrator),
            started_at: Instant::now(),
        })
    }

    pub fn owner_address(&self) -> String {
        self.wallet.get_address()
    }
}
