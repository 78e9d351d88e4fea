//! DomainEthAddress - contract and account addresses as they appear in the escrow list
//!
//! Always rendered as full lowercase hex with the 0x prefix so that the
//! rendered form doubles as the lookup key.

use ethers::types::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::EscrowError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct DomainEthAddress(pub Address);

impl DomainEthAddress {
    /// Full hex string with 0x prefix
    pub fn to_string_full(&self) -> String {
        format!("{:?}", self.0)
    }

    /// `0x1234...5678` form for narrow displays
    pub fn short(&self) -> String {
        let full = self.to_string_full();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for DomainEthAddress {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.starts_with("0x") && !trimmed.starts_with("0X") {
            return Err(EscrowError::invalid_input(format!(
                "address '{}' must start with 0x",
                trimmed
            )));
        }
        Address::from_str(&trimmed[2..])
            .map(Self)
            .map_err(|e| EscrowError::invalid_input(format!("invalid address '{}': {}", trimmed, e)))
    }
}

impl From<Address> for DomainEthAddress {
    fn from(input: Address) -> Self {
        Self(input)
    }
}

impl From<DomainEthAddress> for Address {
    fn from(input: DomainEthAddress) -> Self {
        input.0
    }
}

impl std::ops::Deref for DomainEthAddress {
    type Target = Address;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for DomainEthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Serialize for DomainEthAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string_full())
    }
}

impl<'de> Deserialize<'de> for DomainEthAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
