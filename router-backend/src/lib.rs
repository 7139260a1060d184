//! Decentralized inference routing layer.
//!
//! Routes chat completion requests across pay-per-use compute providers
//! registered on chain: keeps the prepaid ledger funded, discovers and orders
//! candidates, mints single-use request-bound headers per attempt, and fails
//! over sequentially until a provider answers or the list is exhausted.

pub mod auth;
pub mod chain;
pub mod config;
pub mod context;
pub mod domain_types;
pub mod error;
pub mod executor;
pub mod http;
pub mod ledger;
pub mod orchestrator;
pub mod registry;
pub mod routes;
pub mod verifier;
pub mod wallet;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::RouterConfig;
pub use context::RouterContext;
pub use error::RouterError;
pub use orchestrator::FailoverOrchestrator;
