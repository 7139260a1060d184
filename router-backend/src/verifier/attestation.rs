//! Enclave signature check for attested providers
//!
//! Attested providers sign each completion inside their enclave and publish
//! the signature at `GET {endpoint}/signature/{chatId}` as `{text, signature}`.
//! The signature must recover (ERC-191) to the provider's enclave signer and
//! the signed text must reference the completion id.

use async_trait::async_trait;
use ethers::types::Signature;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

use super::ResponseVerifier;
use crate::registry::Provider;

#[derive(Debug, Deserialize)]
struct SignedCompletion {
    text: String,
    signature: String,
}

pub struct AttestationVerifier {
    client: Client,
}

impl AttestationVerifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseVerifier for AttestationVerifier {
    async fn verify(
        &self,
        provider: &Provider,
        _raw_response: &Value,
        chat_id: Option<&str>,
    ) -> Result<bool, String> {
        let signer = provider
            .tee_signer
            .ok_or_else(|| format!("Provider {} has no enclave signer on record", provider.address))?;

        let chat_id = chat_id.ok_or_else(|| "Completion has no id to verify".to_string())?;

        let url = provider.signature_url(chat_id);
        let response = self
            .client
            .get(&url)
            .query(&[("model", provider.model.as_str())])
            .send()
            .await
            .map_err(|e| format!("Signature fetch failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!(
                "Signature endpoint returned HTTP {}",
                response.status().as_u16()
            ));
        }

        let signed: SignedCompletion = response
            .json()
            .await
            .map_err(|e| format!("Invalid signature response: {}", e))?;

        if !signed.text.contains(chat_id) {
            return Err("Signed text does not reference this completion".to_string());
        }

        let signature = Signature::from_str(signed.signature.trim())
            .map_err(|e| format!("Malformed signature: {}", e))?;

        let recovered = signature
            .recover(signed.text.as_str())
            .map_err(|e| format!("Signature recovery failed: {}", e))?;

        Ok(recovered == signer.0)
    }
}
