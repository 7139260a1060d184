//! Request-bound header issuance: RFC 9421 HTTP Message Signatures with ERC-191 signing
//!
//! Every call produces a fresh nonce and creation time, and the signature
//! covers the provider address and a Content-Digest of the exact body bytes,
//! so a header set is valid for one request to one provider only.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;

use super::types::{content_digest_sha256, AuthHeaders};
use super::HeaderIssuer;
use crate::registry::Provider;
use crate::wallet::WalletProvider;

/// Seconds a signature stays valid after creation
const SIGNATURE_VALIDITY_SECS: i64 = 300;

pub const HEADER_SIGNATURE_INPUT: &str = "Signature-Input";
pub const HEADER_SIGNATURE: &str = "Signature";
pub const HEADER_CONTENT_DIGEST: &str = "Content-Digest";
pub const HEADER_PROVIDER_ADDRESS: &str = "X-Provider-Address";
pub const HEADER_CALLER_ADDRESS: &str = "X-Caller-Address";
pub const HEADER_REQUEST_NONCE: &str = "X-Request-Nonce";

pub struct SignedHeaderIssuer {
    wallet_provider: Arc<dyn WalletProvider>,
    chain_id: u64,
}

impl SignedHeaderIssuer {
    pub fn new(wallet_provider: Arc<dyn WalletProvider>, chain_id: u64) -> Self {
        Self {
            wallet_provider,
            chain_id,
        }
    }

    fn target(provider: &Provider) -> Result<(String, String), String> {
        let url = url::Url::parse(&provider.completions_url())
            .map_err(|e| format!("Invalid completions URL for {}: {}", provider.address, e))?;
        let host = url
            .host_str()
            .ok_or_else(|| format!("Completions URL for {} has no host", provider.address))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok((authority.to_lowercase(), url.path().to_string()))
    }
}

#[async_trait]
impl HeaderIssuer for SignedHeaderIssuer {
    async fn issue_headers(&self, provider: &Provider, content: &[u8]) -> Result<AuthHeaders, String> {
        let (authority, path) = Self::target(provider)?;
        let content_digest = content_digest_sha256(content);
        let provider_address = provider.address.to_hex();
        let caller = self.wallet_provider.get_address();

        let components = [
            "@method",
            "@authority",
            "@path",
            "content-digest",
            "x-provider-address",
        ];

        let nonce = uuid::Uuid::new_v4().to_string();
        let created = Utc::now().timestamp();
        let expires = created + SIGNATURE_VALIDITY_SECS;
        let keyid = format!("erc8128:{}:{}", self.chain_id, caller);

        let components_str = components
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(" ");

        let sig_params = format!(
            "({});created={};expires={};keyid=\"{}\";nonce=\"{}\";alg=\"erc191\"",
            components_str, created, expires, keyid, nonce,
        );

        let mut base_lines: Vec<String> = components
            .iter()
            .map(|comp| {
                let value = match *comp {
                    "@method" => "POST".to_string(),
                    "@authority" => authority.clone(),
                    "@path" => path.clone(),
                    "content-digest" => content_digest.clone(),
                    "x-provider-address" => provider_address.clone(),
                    _ => String::new(),
                };
                format!("\"{}\": {}", comp, value)
            })
            .collect();
        base_lines.push(format!("\"@signature-params\": {}", sig_params));

        let signature_base = base_lines.join("\n");

        log::debug!(
            "[AUTH] Signature base ({} bytes):\n{}",
            signature_base.len(),
            signature_base
        );

        let sig = self
            .wallet_provider
            .sign_message(signature_base.as_bytes())
            .await
            .map_err(|e| format!("ERC-191 signing failed: {}", e))?;

        // 65-byte signature (r ++ s ++ v)
        let mut sig_bytes = [0u8; 65];
        sig.r.to_big_endian(&mut sig_bytes[0..32]);
        sig.s.to_big_endian(&mut sig_bytes[32..64]);
        sig_bytes[64] = sig.v as u8;

        log::debug!(
            "[AUTH] Issued headers for {} (nonce {})",
            provider_address,
            nonce
        );

        Ok(AuthHeaders::new(vec![
            (HEADER_CONTENT_DIGEST.to_string(), content_digest),
            (HEADER_SIGNATURE_INPUT.to_string(), format!("eth={}", sig_params)),
            (HEADER_SIGNATURE.to_string(), format!("eth=:{}:", BASE64.encode(sig_bytes))),
            (HEADER_PROVIDER_ADDRESS.to_string(), provider_address),
            (HEADER_CALLER_ADDRESS.to_string(), caller),
            (HEADER_REQUEST_NONCE.to_string(), nonce),
        ]))
    }
}
