//! Domain-specific wrapper types with serde support

mod provider_address;

pub use provider_address::ProviderAddress;
