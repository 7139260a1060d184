//! Known-good provider table
//!
//! One externally configured table serves two purposes: it ranks discovered
//! providers ahead of unknown ones, and it is the static fallback returned
//! when discovery fails or comes back empty. Lower rank is tried first; equal
//! ranks keep table order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::types::{validate_endpoint, Provider, Verifiability};
use crate::domain_types::ProviderAddress;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownProviderEntry {
    pub address: String,
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub verifiability: Verifiability,
    pub rank: u32,
    #[serde(default)]
    pub tee_signer: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KnownProviderTable {
    providers: Vec<Provider>,
}

impl KnownProviderTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<KnownProviderEntry>) -> Result<Self, String> {
        let mut seen = HashSet::new();
        let mut providers = Vec::with_capacity(entries.len());

        for entry in entries {
            let address = ProviderAddress::parse(&entry.address)?;
            if !seen.insert(address) {
                return Err(format!("Duplicate known provider {}", address));
            }

            let tee_signer = match entry.tee_signer.as_deref() {
                Some(s) if !s.trim().is_empty() => Some(ProviderAddress::parse(s)?),
                _ => None,
            };

            providers.push(Provider {
                address,
                endpoint: validate_endpoint(&entry.endpoint)?,
                model: entry.model,
                verifiability: entry.verifiability,
                priority_rank: Some(entry.rank),
                tee_signer,
            });
        }

        Ok(Self { providers })
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let entries: Vec<KnownProviderEntry> = serde_json::from_str(json)
            .map_err(|e| format!("Failed to parse known provider table: {}", e))?;
        Self::from_entries(entries)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read known provider table {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn rank_of(&self, address: &ProviderAddress) -> Option<u32> {
        self.providers
            .iter()
            .find(|p| &p.address == address)
            .and_then(|p| p.priority_rank)
    }

    /// Table entries as routable providers, best rank first
    pub fn fallback_providers(&self) -> Vec<Provider> {
        let mut providers = self.providers.clone();
        providers.sort_by_key(|p| p.priority_rank.unwrap_or(u32::MAX));
        providers
    }
}
