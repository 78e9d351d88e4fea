//! Domain types for escrow records
//!
//! Wrappers around ethers primitives with the serde and parsing rules the
//! escrow list needs: addresses as full hex, amounts as decimal strings.

pub mod eth_address;
pub mod uint256;

pub use eth_address::DomainEthAddress;
pub use uint256::DomainUint256;
