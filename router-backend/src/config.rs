use ethers::types::{Address, U256};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RouterError;
use crate::registry::KnownProviderTable;

/// Environment variable names
pub mod env_vars {
    pub const PRIVATE_KEY: &str = "ROUTER_PRIVATE_KEY";
    pub const RPC_URL: &str = "ROUTER_RPC_URL";
    pub const CHAIN_ID: &str = "ROUTER_CHAIN_ID";
    pub const LEDGER_CONTRACT: &str = "ROUTER_LEDGER_CONTRACT";
    pub const DISCOVERY_URL: &str = "ROUTER_DISCOVERY_URL";
    pub const MIN_BALANCE: &str = "ROUTER_MIN_BALANCE";
    pub const TOP_UP_AMOUNT: &str = "ROUTER_TOP_UP_AMOUNT";
    pub const ATTEMPT_TIMEOUT_MS: &str = "ROUTER_ATTEMPT_TIMEOUT_MS";
    pub const DISCOVERY_TIMEOUT_MS: &str = "ROUTER_DISCOVERY_TIMEOUT_MS";
    pub const TOP_UP_TIMEOUT_MS: &str = "ROUTER_TOP_UP_TIMEOUT_MS";
    pub const HANDSHAKE_TIMEOUT_MS: &str = "ROUTER_HANDSHAKE_TIMEOUT_MS";
    pub const VERIFY_TIMEOUT_MS: &str = "ROUTER_VERIFY_TIMEOUT_MS";
    pub const KNOWN_PROVIDERS: &str = "ROUTER_KNOWN_PROVIDERS";
    pub const KNOWN_PROVIDERS_JSON: &str = "ROUTER_KNOWN_PROVIDERS_JSON";
    pub const EXHAUSTION_POLICY: &str = "ROUTER_EXHAUSTION_POLICY";
    pub const REQUIRE_HANDSHAKE: &str = "ROUTER_REQUIRE_HANDSHAKE";
    pub const DISCOVERY_CACHE_SECS: &str = "ROUTER_DISCOVERY_CACHE_SECS";
    pub const PORT: &str = "ROUTER_PORT";
}

/// 0G Galileo testnet
pub const DEFAULT_CHAIN_ID: u64 = 16601;
/// 0.01 of the native token, in its smallest unit
pub const DEFAULT_MIN_BALANCE: u64 = 10_000_000_000_000_000;
/// 0.1 of the native token, in its smallest unit
pub const DEFAULT_TOP_UP_AMOUNT: u64 = 100_000_000_000_000_000;
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_TOP_UP_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PORT: u16 = 9110;

/// What to return once every candidate has failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExhaustionPolicy {
    /// `ok:true` labeled local fallback answer
    Degraded,
    /// `ok:false` with the last provider error
    Error,
}

#[derive(Clone)]
pub struct RouterConfig {
    private_key: String,
    pub rpc_url: String,
    pub chain_id: u64,
    pub ledger_contract: Address,
    pub discovery_url: Option<String>,
    pub min_balance: U256,
    pub top_up_amount: U256,
    pub attempt_timeout: Duration,
    pub discovery_timeout: Duration,
    pub top_up_timeout: Duration,
    pub handshake_timeout: Duration,
    pub verify_timeout: Duration,
    pub known_providers: KnownProviderTable,
    pub exhaustion_policy: ExhaustionPolicy,
    pub require_handshake: bool,
    pub discovery_cache_ttl: Option<Duration>,
    pub port: u16,
}

impl fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("private_key", &"<redacted>")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("ledger_contract", &self.ledger_contract)
            .field("discovery_url", &self.discovery_url)
            .field("min_balance", &self.min_balance)
            .field("top_up_amount", &self.top_up_amount)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("known_providers", &self.known_providers.len())
            .field("exhaustion_policy", &self.exhaustion_policy)
            .finish_non_exhaustive()
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, RouterError>
where
    T::Err: fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RouterError::config(format!("{} is invalid ({}): {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_amount(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<U256, RouterError> {
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => U256::from_dec_str(raw.trim())
            .map_err(|e| RouterError::config(format!("{} is not a decimal amount ({}): {}", key, raw, e))),
        None => Ok(U256::from(default)),
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, RouterError> {
    match lookup(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(RouterError::config(format!("{} must be a boolean, got {}", key, other))),
    }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

impl RouterConfig {
    /// Config with defaults for everything but the required values
    pub fn new(private_key: impl Into<String>, rpc_url: impl Into<String>, ledger_contract: Address) -> Self {
        Self {
            private_key: private_key.into(),
            rpc_url: rpc_url.into(),
            chain_id: DEFAULT_CHAIN_ID,
            ledger_contract,
            discovery_url: None,
            min_balance: U256::from(DEFAULT_MIN_BALANCE),
            top_up_amount: U256::from(DEFAULT_TOP_UP_AMOUNT),
            attempt_timeout: millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
            discovery_timeout: millis(DEFAULT_DISCOVERY_TIMEOUT_MS),
            top_up_timeout: millis(DEFAULT_TOP_UP_TIMEOUT_MS),
            handshake_timeout: millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            verify_timeout: millis(DEFAULT_VERIFY_TIMEOUT_MS),
            known_providers: KnownProviderTable::empty(),
            exhaustion_policy: ExhaustionPolicy::Degraded,
            require_handshake: false,
            discovery_cache_ttl: None,
            port: DEFAULT_PORT,
        }
    }

    pub fn from_env() -> Result<Self, RouterError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; `from_env` passes the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RouterError> {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| RouterError::config(format!("{} must be set", key)))
        };

        let private_key = required(env_vars::PRIVATE_KEY)?;
        let rpc_url = required(env_vars::RPC_URL)?;
        let ledger_raw = required(env_vars::LEDGER_CONTRACT)?;
        let ledger_contract = Address::from_str(&ledger_raw).map_err(|e| {
            RouterError::config(format!("{} is not an address ({}): {}", env_vars::LEDGER_CONTRACT, ledger_raw, e))
        })?;

        let known_providers = if let Some(path) = lookup(env_vars::KNOWN_PROVIDERS).filter(|p| !p.trim().is_empty()) {
            KnownProviderTable::from_file(path.trim()).map_err(RouterError::Configuration)?
        } else if let Some(json) = lookup(env_vars::KNOWN_PROVIDERS_JSON).filter(|j| !j.trim().is_empty()) {
            KnownProviderTable::from_json(&json).map_err(RouterError::Configuration)?
        } else {
            KnownProviderTable::empty()
        };

        let cache_secs: u64 = parse_var(&lookup, env_vars::DISCOVERY_CACHE_SECS, 0)?;

        let config = Self {
            private_key,
            rpc_url,
            chain_id: parse_var(&lookup, env_vars::CHAIN_ID, DEFAULT_CHAIN_ID)?,
            ledger_contract,
            discovery_url: lookup(env_vars::DISCOVERY_URL)
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            min_balance: parse_amount(&lookup, env_vars::MIN_BALANCE, DEFAULT_MIN_BALANCE)?,
            top_up_amount: parse_amount(&lookup, env_vars::TOP_UP_AMOUNT, DEFAULT_TOP_UP_AMOUNT)?,
            attempt_timeout: millis(parse_var(&lookup, env_vars::ATTEMPT_TIMEOUT_MS, DEFAULT_ATTEMPT_TIMEOUT_MS)?),
            discovery_timeout: millis(parse_var(&lookup, env_vars::DISCOVERY_TIMEOUT_MS, DEFAULT_DISCOVERY_TIMEOUT_MS)?),
            top_up_timeout: millis(parse_var(&lookup, env_vars::TOP_UP_TIMEOUT_MS, DEFAULT_TOP_UP_TIMEOUT_MS)?),
            handshake_timeout: millis(parse_var(&lookup, env_vars::HANDSHAKE_TIMEOUT_MS, DEFAULT_HANDSHAKE_TIMEOUT_MS)?),
            verify_timeout: millis(parse_var(&lookup, env_vars::VERIFY_TIMEOUT_MS, DEFAULT_VERIFY_TIMEOUT_MS)?),
            known_providers,
            exhaustion_policy: parse_var(&lookup, env_vars::EXHAUSTION_POLICY, ExhaustionPolicy::Degraded)?,
            require_handshake: parse_bool(&lookup, env_vars::REQUIRE_HANDSHAKE)?,
            discovery_cache_ttl: (cache_secs > 0).then(|| Duration::from_secs(cache_secs)),
            port: parse_var(&lookup, env_vars::PORT, DEFAULT_PORT)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn validate(&self) -> Result<(), RouterError> {
        if self.private_key.trim().is_empty() {
            return Err(RouterError::config(format!("{} must be set", env_vars::PRIVATE_KEY)));
        }

        let rpc = url::Url::parse(&self.rpc_url)
            .map_err(|e| RouterError::config(format!("{} is not a URL: {}", env_vars::RPC_URL, e)))?;
        if !matches!(rpc.scheme(), "http" | "https") {
            return Err(RouterError::config(format!("{} must be http(s)", env_vars::RPC_URL)));
        }

        if self.ledger_contract.is_zero() {
            return Err(RouterError::config(format!("{} is the zero address", env_vars::LEDGER_CONTRACT)));
        }

        if self.attempt_timeout.is_zero() {
            return Err(RouterError::config(format!("{} must be positive", env_vars::ATTEMPT_TIMEOUT_MS)));
        }

        if self.top_up_amount.is_zero() {
            return Err(RouterError::config(format!("{} must be positive", env_vars::TOP_UP_AMOUNT)));
        }

        if self.discovery_url.is_none() && self.known_providers.is_empty() {
            return Err(RouterError::config(format!(
                "No provider source: set {} or a known-good table ({} / {})",
                env_vars::DISCOVERY_URL,
                env_vars::KNOWN_PROVIDERS,
                env_vars::KNOWN_PROVIDERS_JSON
            )));
        }

        if self.known_providers.is_empty() {
            log::warn!(
                "No known-good providers configured ({} / {}); discovery failures will leave no candidates",
                env_vars::KNOWN_PROVIDERS,
                env_vars::KNOWN_PROVIDERS_JSON
            );
        }

        Ok(())
    }
}
