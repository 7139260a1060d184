//! ProviderAddress - on-chain identity of a compute provider
//!
//! Wraps an ethers `Address` so that addresses coming from discovery, the
//! known-good table and caller preferences compare equal regardless of hex
//! casing.

use ethers::types::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ProviderAddress(pub Address);

impl ProviderAddress {
    /// Parse a `0x`-prefixed (or bare) 20-byte hex address
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        let with_prefix = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            format!("0x{}", &trimmed[2..])
        } else {
            format!("0x{}", trimmed)
        };
        Address::from_str(&with_prefix)
            .map(Self)
            .map_err(|e| format!("Invalid provider address '{}': {}", input, e))
    }

    /// Lowercase hex with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }

    /// Check a free-form address string against this one
    pub fn matches(&self, other: &str) -> bool {
        Self::parse(other).map(|o| o == *self).unwrap_or(false)
    }
}

impl FromStr for ProviderAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Address> for ProviderAddress {
    fn from(input: Address) -> Self {
        Self(input)
    }
}

impl From<ProviderAddress> for Address {
    fn from(input: ProviderAddress) -> Self {
        input.0
    }
}

impl fmt::Display for ProviderAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Serialize for ProviderAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ProviderAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
