//! Provider discovery
//!
//! Discovery never fails from the caller's point of view: a timeout, an error
//! or an empty listing degrades to the static known-good table.

mod http_discovery;
pub mod known_good;
pub mod prioritizer;
pub mod types;

pub use http_discovery::HttpDiscovery;
pub use known_good::{KnownProviderEntry, KnownProviderTable};
pub use types::{DiscoveredProvider, Provider, Verifiability};

use async_trait::async_trait;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Source of the currently registered providers
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    async fn list_providers(&self) -> Result<Vec<DiscoveredProvider>, String>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    NotConfigured,
    Timeout,
    Error,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    Discovered,
    Cached,
    Fallback(DegradedReason),
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySource::Discovered => "discovered",
            DiscoverySource::Cached => "cached",
            DiscoverySource::Fallback(_) => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Discovery {
    pub providers: Vec<Provider>,
    pub source: DiscoverySource,
}

pub struct ProviderRegistry {
    service: Option<Arc<dyn DiscoveryService>>,
    known: Arc<KnownProviderTable>,
    timeout: Duration,
    /// Last non-empty discovery result, only when a TTL is configured
    cache: Option<Cache<(), Arc<Vec<Provider>>>>,
}

impl ProviderRegistry {
    pub fn new(
        service: Option<Arc<dyn DiscoveryService>>,
        known: Arc<KnownProviderTable>,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            known,
            timeout,
            cache: None,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = Some(Cache::builder().max_capacity(1).time_to_live(ttl).build());
        self
    }

    pub fn known(&self) -> &KnownProviderTable {
        &self.known
    }

    pub async fn discover(&self) -> Discovery {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&())) {
            log::debug!("[REGISTRY] Using {} cached providers", cached.len());
            return Discovery {
                providers: cached.as_ref().clone(),
                source: DiscoverySource::Cached,
            };
        }

        let Some(service) = self.service.as_ref() else {
            log::debug!("[REGISTRY] No discovery service configured, using known-good table");
            return self.fallback(DegradedReason::NotConfigured);
        };

        let listed = match tokio::time::timeout(self.timeout, service.list_providers()).await {
            Err(_) => {
                log::warn!(
                    "[REGISTRY] {} discovery timed out after {}ms, using known-good table",
                    service.name(),
                    self.timeout.as_millis()
                );
                return self.fallback(DegradedReason::Timeout);
            }
            Ok(Err(e)) => {
                log::warn!(
                    "[REGISTRY] {} discovery failed: {}, using known-good table",
                    service.name(),
                    e
                );
                return self.fallback(DegradedReason::Error);
            }
            Ok(Ok(listed)) => listed,
        };

        let providers: Vec<Provider> = listed
            .into_iter()
            .filter_map(|entry| match entry.into_provider() {
                Ok(p) => Some(p),
                Err(e) => {
                    log::warn!("[REGISTRY] Skipping invalid provider entry: {}", e);
                    None
                }
            })
            .collect();

        if providers.is_empty() {
            log::warn!(
                "[REGISTRY] {} discovery returned no usable providers, using known-good table",
                service.name()
            );
            return self.fallback(DegradedReason::Empty);
        }

        log::info!("[REGISTRY] Discovered {} providers", providers.len());

        if let Some(cache) = &self.cache {
            cache.insert((), Arc::new(providers.clone()));
        }

        Discovery {
            providers,
            source: DiscoverySource::Discovered,
        }
    }

    fn fallback(&self, reason: DegradedReason) -> Discovery {
        let providers = self.known.fallback_providers();
        if providers.is_empty() {
            log::warn!("[REGISTRY] Known-good table is empty; no candidates available");
        }
        Discovery {
            providers,
            source: DiscoverySource::Fallback(reason),
        }
    }
}
