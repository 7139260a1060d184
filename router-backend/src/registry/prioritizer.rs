//! Candidate ordering
//!
//! Output order is the exact sequence the failover loop attempts:
//! the caller's preferred provider (when discovered), then known-good
//! providers by rank, then every other discovered provider in discovery order.

use super::known_good::KnownProviderTable;
use super::types::Provider;
use crate::domain_types::ProviderAddress;

pub fn order(
    discovered: Vec<Provider>,
    preferred: Option<&ProviderAddress>,
    known: &KnownProviderTable,
) -> Vec<Provider> {
    let mut remaining = discovered;
    let mut ordered = Vec::with_capacity(remaining.len());

    if let Some(pref) = preferred {
        if let Some(pos) = remaining.iter().position(|p| &p.address == pref) {
            ordered.push(remaining.remove(pos));
        } else {
            log::debug!("[REGISTRY] Preferred provider {} not among discovered providers", pref);
        }
    }

    let (mut ranked, unranked): (Vec<Provider>, Vec<Provider>) = remaining
        .into_iter()
        .map(|mut p| {
            p.priority_rank = known.rank_of(&p.address);
            p
        })
        .partition(|p| p.priority_rank.is_some());

    // Stable: equal ranks keep discovery order
    ranked.sort_by_key(|p| p.priority_rank.unwrap_or(u32::MAX));

    if let Some(first) = ordered.first_mut() {
        first.priority_rank = known.rank_of(&first.address);
    }

    ordered.extend(ranked);
    ordered.extend(unranked);
    ordered
}

/// Parse a caller-supplied preference, ignoring values that are not addresses
pub fn parse_preference(preferred: Option<&str>) -> Option<ProviderAddress> {
    let raw = preferred?.trim();
    if raw.is_empty() {
        return None;
    }
    match ProviderAddress::parse(raw) {
        Ok(addr) => Some(addr),
        Err(e) => {
            log::warn!("[REGISTRY] Ignoring preferred provider: {}", e);
            None
        }
    }
}
