//! Per-attempt request authentication
//!
//! Each attempt performs the provider handshake and then asks the issuer for
//! a header set bound to the exact serialized body. Issued header sets are
//! fingerprinted; a set that was already handed out is refused, so a header
//! can never ride on two HTTP calls.

mod handshake;
pub mod signer;
pub mod types;

pub use handshake::ChainHandshake;
pub use signer::SignedHeaderIssuer;
pub use types::{content_digest_sha256, AuthHeaders};

use async_trait::async_trait;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::Provider;

/// How long issued fingerprints are remembered; longer than any signature validity
const ISSUED_FINGERPRINT_TTL: Duration = Duration::from_secs(15 * 60);
const ISSUED_FINGERPRINT_CAPACITY: u64 = 100_000;

/// Acknowledges a provider's signing identity before it is called
#[async_trait]
pub trait ProviderHandshake: Send + Sync {
    async fn acknowledge(&self, provider: &Provider) -> Result<(), String>;
}

/// Mints single-use headers bound to a provider and a request body
#[async_trait]
pub trait HeaderIssuer: Send + Sync {
    async fn issue_headers(&self, provider: &Provider, content: &[u8]) -> Result<AuthHeaders, String>;
}

pub struct RequestAuthenticator {
    handshake: Arc<dyn ProviderHandshake>,
    issuer: Arc<dyn HeaderIssuer>,
    require_handshake: bool,
    handshake_timeout: Duration,
    issued: Cache<String, ()>,
}

impl RequestAuthenticator {
    pub fn new(
        handshake: Arc<dyn ProviderHandshake>,
        issuer: Arc<dyn HeaderIssuer>,
        require_handshake: bool,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            handshake,
            issuer,
            require_handshake,
            handshake_timeout,
            issued: Cache::builder()
                .max_capacity(ISSUED_FINGERPRINT_CAPACITY)
                .time_to_live(ISSUED_FINGERPRINT_TTL)
                .build(),
        }
    }

    /// Handshake then issue headers for one attempt. Errors are provider-level.
    pub async fn authenticate(&self, provider: &Provider, content: &[u8]) -> Result<AuthHeaders, String> {
        let handshake = tokio::time::timeout(self.handshake_timeout, self.handshake.acknowledge(provider))
            .await
            .unwrap_or_else(|_| {
                Err(format!(
                    "timed out after {}ms",
                    self.handshake_timeout.as_millis()
                ))
            });

        if let Err(e) = handshake {
            if self.require_handshake {
                return Err(format!("Handshake with {} failed: {}", provider.address, e));
            }
            log::warn!(
                "[AUTH] Handshake with {} failed (continuing): {}",
                provider.address,
                e
            );
        }

        let headers = self
            .issuer
            .issue_headers(provider, content)
            .await
            .map_err(|e| format!("Header issuance for {} failed: {}", provider.address, e))?;

        if headers.is_empty() {
            return Err(format!("Header issuance for {} returned no headers", provider.address));
        }

        let entry = self.issued.entry(headers.fingerprint()).or_insert(());
        if !entry.is_fresh() {
            log::error!(
                "[AUTH] Issuer returned an already-used header set for {}; refusing to reuse",
                provider.address
            );
            return Err(format!("Header set for {} was already issued", provider.address));
        }

        Ok(headers)
    }
}
