//! Escrow contract ABI encoding/decoding helpers
//!
//! Manual encoding for the handful of calls the app makes, without abigen!.
//!
//! ```text
//! constructor(address arbiter, address beneficiary) payable
//! function approve()
//! function setTimelock(uint256 unlockTime)
//! event Approved(uint256 balance)
//! ```

use ethers::abi::Token;
use ethers::types::{Address, Bytes, Log, TransactionReceipt, H256, U256};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;

use super::ApprovedEvent;
use crate::domain_types::DomainEthAddress;

pub const APPROVE_SIGNATURE: &str = "approve()";
pub const SET_TIMELOCK_SIGNATURE: &str = "setTimelock(uint256)";
pub const APPROVED_EVENT_SIGNATURE: &str = "Approved(uint256)";

static APPROVE_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector(APPROVE_SIGNATURE));
static SET_TIMELOCK_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector(SET_TIMELOCK_SIGNATURE));

/// topic0 of the Approved event
pub static APPROVED_TOPIC: Lazy<H256> =
    Lazy::new(|| H256::from(keccak256(APPROVED_EVENT_SIGNATURE.as_bytes())));

/// First four bytes of keccak256(signature)
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encode an approve() call
pub fn encode_approve() -> Bytes {
    Bytes::from(APPROVE_SELECTOR.to_vec())
}

/// Encode a setTimelock(uint256) call
pub fn encode_set_timelock(unlock_time: U256) -> Bytes {
    let mut data = SET_TIMELOCK_SELECTOR.to_vec();
    data.extend_from_slice(&ethers::abi::encode(&[Token::Uint(unlock_time)]));
    Bytes::from(data)
}

/// ABI-encoded constructor arguments, appended to the creation bytecode
pub fn encode_constructor_args(arbiter: Address, beneficiary: Address) -> Vec<u8> {
    ethers::abi::encode(&[Token::Address(arbiter), Token::Address(beneficiary)])
}

/// Decode the balance carried by an Approved log; None for any other log
pub fn decode_approved(log: &Log) -> Option<U256> {
    if log.topics.first() != Some(&*APPROVED_TOPIC) {
        return None;
    }
    if log.data.len() < 32 {
        log::warn!(
            "[EscrowAbi] Approved log from {:?} too short: {} bytes",
            log.address,
            log.data.len()
        );
        return None;
    }
    Some(U256::from_big_endian(&log.data[..32]))
}

/// Approved events emitted by `escrow` within a receipt
pub fn approved_events(receipt: &TransactionReceipt, escrow: DomainEthAddress) -> Vec<ApprovedEvent> {
    receipt
        .logs
        .iter()
        .filter(|log| log.address == escrow.0)
        .filter_map(|log| {
            decode_approved(log).map(|balance| ApprovedEvent {
                escrow,
                balance,
                tx_hash: Some(receipt.transaction_hash),
            })
        })
        .collect()
}
