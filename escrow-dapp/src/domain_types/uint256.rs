//! DomainUint256 - escrow amounts and unlock times as arbitrary-precision integers
//!
//! Parsing rules:
//! - Decimal strings: "331157" -> U256(331157)
//! - Hex strings with 0x prefix: "0x50d95" -> U256(331157)
//! - JSON integers: 331157 -> U256(331157)
//!
//! Bare strings are always decimal. ethers' `U256::from_str` treats every
//! string as hex, so "331157" would silently become 0x331157.

use ethers::types::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::EscrowError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct DomainUint256(pub U256);

impl DomainUint256 {
    /// Strict decimal parse: digits only, surrounding whitespace allowed.
    /// Used where the input must be a plain integer (unlock timestamps).
    pub fn parse_decimal(input: &str) -> Result<Self, EscrowError> {
        let cleaned = input.trim();
        if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EscrowError::invalid_input(format!(
                "'{}' is not a valid integer",
                input
            )));
        }
        U256::from_dec_str(cleaned)
            .map(Self)
            .map_err(|e| EscrowError::invalid_input(format!("'{}' is out of range: {}", input, e)))
    }

    /// Decimal string form, the way amounts are kept in the escrow list
    pub fn to_decimal_string(&self) -> String {
        self.0.to_string()
    }
}

fn parse_amount(value: &str) -> Result<U256, String> {
    let cleaned = value.trim().trim_matches('"');

    if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        if hex.is_empty() {
            return Err(format!("empty hex value '{}'", cleaned));
        }
        U256::from_str_radix(hex, 16)
            .map_err(|e| format!("failed to parse hex: {} for value {}", e, cleaned))
    } else {
        DomainUint256::parse_decimal(cleaned)
            .map(|d| d.0)
            .map_err(|e| e.to_string())
    }
}

impl FromStr for DomainUint256 {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_amount(s).map(Self).map_err(EscrowError::InvalidInput)
    }
}

impl Serialize for DomainUint256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for DomainUint256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DomainUint256Visitor;

        impl<'de> Visitor<'de> for DomainUint256Visitor {
            type Value = DomainUint256;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a decimal string, 0x-prefixed hex string or unsigned integer")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                parse_amount(value).map(DomainUint256).map_err(de::Error::custom)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(DomainUint256(U256::from(value)))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(|v| DomainUint256(U256::from(v)))
                    .map_err(|_| de::Error::custom("negative value cannot be converted to U256"))
            }
        }

        deserializer.deserialize_any(DomainUint256Visitor)
    }
}

impl fmt::Display for DomainUint256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<U256> for DomainUint256 {
    fn from(input: U256) -> Self {
        Self(input)
    }
}

impl From<u64> for DomainUint256 {
    fn from(input: u64) -> Self {
        Self(U256::from(input))
    }
}

impl From<DomainUint256> for U256 {
    fn from(input: DomainUint256) -> Self {
        input.0
    }
}

impl std::ops::Deref for DomainUint256 {
    type Target = U256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
