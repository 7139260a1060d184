//! Response authenticity checks
//!
//! Verification only ever sets the `verified` flag. A failure, including a
//! provider that cannot be verified at all, never turns a completion into an
//! error.

mod attestation;

pub use attestation::AttestationVerifier;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::Provider;

#[async_trait]
pub trait ResponseVerifier: Send + Sync {
    async fn verify(
        &self,
        provider: &Provider,
        raw_response: &Value,
        chat_id: Option<&str>,
    ) -> Result<bool, String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Verified,
    /// Provider offers no attestation
    NotApplicable,
    Failed(String),
}

impl VerificationStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationStatus::Verified)
    }
}

/// Run the verifier for attested providers, bounded by `timeout`
pub async fn verify_response(
    verifier: &Arc<dyn ResponseVerifier>,
    provider: &Provider,
    raw_response: &Value,
    chat_id: Option<&str>,
    timeout: Duration,
) -> VerificationStatus {
    if !provider.is_attested() {
        return VerificationStatus::NotApplicable;
    }

    let outcome = tokio::time::timeout(timeout, verifier.verify(provider, raw_response, chat_id)).await;

    let status = match outcome {
        Ok(Ok(true)) => VerificationStatus::Verified,
        Ok(Ok(false)) => VerificationStatus::Failed("signature did not match provider signer".to_string()),
        Ok(Err(e)) => VerificationStatus::Failed(e),
        Err(_) => VerificationStatus::Failed(format!("timed out after {}ms", timeout.as_millis())),
    };

    match &status {
        VerificationStatus::Verified => {
            log::info!("[VERIFY] Response from {} verified", provider.address)
        }
        VerificationStatus::Failed(reason) => log::warn!(
            "[VERIFY] Response from {} not verified (non-fatal): {}",
            provider.address,
            reason
        ),
        VerificationStatus::NotApplicable => {}
    }

    status
}
