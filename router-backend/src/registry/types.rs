//! Provider data types shared by discovery, ordering and execution

use inference_router_types::ProviderView;
use serde::{Deserialize, Serialize};

use crate::domain_types::ProviderAddress;

/// Whether a provider can prove its responses came from an attested enclave
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Verifiability {
    #[default]
    None,
    #[serde(alias = "teeml", alias = "TeeML", alias = "tee")]
    Attested,
}

/// A compute provider as seen for the lifetime of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub address: ProviderAddress,
    pub endpoint: String,
    pub model: String,
    pub verifiability: Verifiability,
    /// Rank from the known-good table; `None` for providers not listed there
    pub priority_rank: Option<u32>,
    /// Enclave signing address used to check attested responses
    pub tee_signer: Option<ProviderAddress>,
}

impl Provider {
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    pub fn signature_url(&self, chat_id: &str) -> String {
        format!(
            "{}/signature/{}",
            self.endpoint.trim_end_matches('/'),
            chat_id
        )
    }

    pub fn is_attested(&self) -> bool {
        self.verifiability == Verifiability::Attested
    }

    pub fn view(&self) -> ProviderView {
        ProviderView {
            address: self.address.to_hex(),
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            verifiability: self.verifiability.to_string(),
            priority_rank: self.priority_rank,
        }
    }
}

/// Provider entry as returned by the discovery service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredProvider {
    #[serde(alias = "provider")]
    pub address: String,
    #[serde(alias = "url")]
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub verifiability: Verifiability,
    #[serde(default, alias = "teeSignerAddress")]
    pub tee_signer: Option<String>,
}

impl DiscoveredProvider {
    /// Validate and convert into a routable [`Provider`]
    pub fn into_provider(self) -> Result<Provider, String> {
        let address = ProviderAddress::parse(&self.address)?;
        let endpoint = validate_endpoint(&self.endpoint)?;

        if self.model.trim().is_empty() {
            return Err(format!("Provider {} has no model", address));
        }

        let tee_signer = match self.tee_signer.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => Some(ProviderAddress::parse(s)?),
            _ => None,
        };

        Ok(Provider {
            address,
            endpoint,
            model: self.model,
            verifiability: self.verifiability,
            priority_rank: None,
            tee_signer,
        })
    }
}

/// Check that an endpoint is an absolute http(s) URL; returns it without a trailing slash
pub fn validate_endpoint(endpoint: &str) -> Result<String, String> {
    let parsed = url::Url::parse(endpoint.trim())
        .map_err(|e| format!("Invalid provider endpoint '{}': {}", endpoint, e))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(format!(
                "Invalid provider endpoint '{}': unsupported scheme {}",
                endpoint, other
            ))
        }
    }

    if parsed.host_str().is_none() {
        return Err(format!("Invalid provider endpoint '{}': missing host", endpoint));
    }

    Ok(endpoint.trim().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovered_provider_aliases() {
        let json = r#"{
            "provider": "0xf07240Efa67755B5311bc75784a061eDB47165Dd",
            "url": "https://provider.example.com/v1/proxy/",
            "model": "llama-3.3-70b-instruct",
            "verifiability": "TeeML",
            "teeSignerAddress": "0x3feE5a4dd5FDb8a32dDA97Bed899830605dBD9D3"
        }"#;
        let discovered: DiscoveredProvider = serde_json::from_str(json).unwrap();
        let provider = discovered.into_provider().unwrap();

        assert_eq!(provider.verifiability, Verifiability::Attested);
        assert_eq!(provider.endpoint, "https://provider.example.com/v1/proxy");
        assert_eq!(
            provider.completions_url(),
            "https://provider.example.com/v1/proxy/chat/completions"
        );
        assert!(provider.tee_signer.is_some());
    }

    #[test]
    fn test_missing_verifiability_defaults_to_none() {
        let json = r#"{"address":"0xf07240Efa67755B5311bc75784a061eDB47165Dd","endpoint":"http://localhost:8080","model":"m"}"#;
        let provider = serde_json::from_str::<DiscoveredProvider>(json)
            .unwrap()
            .into_provider()
            .unwrap();
        assert_eq!(provider.verifiability, Verifiability::None);
        assert!(!provider.is_attested());
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        assert!(validate_endpoint("ftp://example.com").is_err());
        assert!(validate_endpoint("not a url").is_err());
        assert!(validate_endpoint("https://example.com/").is_ok());
    }
}
