use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EscrowError, Result};

/// Environment variable names
pub mod env_vars {
    pub const RPC_URL: &str = "ESCROW_RPC_URL";
    pub const CHAIN_ID: &str = "ESCROW_CHAIN_ID";
    pub const WALLET_PRIVATE_KEY: &str = "ESCROW_WALLET_PRIVATE_KEY";
    pub const ARTIFACT_PATH: &str = "ESCROW_ARTIFACT_PATH";
    pub const APPROVE_COOLDOWN_SECS: &str = "ESCROW_APPROVE_COOLDOWN_SECS";
    pub const TIME_SET_PROMPT_SECS: &str = "ESCROW_TIME_SET_PROMPT_SECS";
    pub const RECEIPT_TIMEOUT_SECS: &str = "ESCROW_RECEIPT_TIMEOUT_SECS";
    pub const APPROVED_EVENT_TIMEOUT_SECS: &str = "ESCROW_APPROVED_EVENT_TIMEOUT_SECS";
    pub const RECEIPT_POLL_MS: &str = "ESCROW_RECEIPT_POLL_MS";
}

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
/// Hardhat / anvil local chain
pub const DEFAULT_CHAIN_ID: u64 = 31337;
pub const DEFAULT_ARTIFACT_PATH: &str = "./artifacts/contracts/Escrow.sol/Escrow.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub chain_id: u64,
    pub artifact_path: PathBuf,
    pub timings: Timings,
}

/// Durations that drive the UI flags and the confirmation waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Global approve cooldown after a confirmed timelock
    pub approve_cooldown: Duration,
    /// How long the "time set successfully" banner stays up
    pub time_set_prompt: Duration,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
    /// Fallback for the one-shot Approved wait after a mined approval
    pub approved_event_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            approve_cooldown: Duration::from_secs(60),
            time_set_prompt: Duration::from_secs(3),
            receipt_timeout: Duration::from_secs(120),
            receipt_poll_interval: Duration::from_millis(1000),
            approved_event_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Timings::default();
        Ok(Self {
            rpc_url: env::var(env_vars::RPC_URL).unwrap_or_else(|_| DEFAULT_RPC_URL.to_string()),
            chain_id: parse_var(env_vars::CHAIN_ID, DEFAULT_CHAIN_ID)?,
            artifact_path: env::var(env_vars::ARTIFACT_PATH)
                .unwrap_or_else(|_| DEFAULT_ARTIFACT_PATH.to_string())
                .into(),
            timings: Timings {
                approve_cooldown: Duration::from_secs(parse_var(
                    env_vars::APPROVE_COOLDOWN_SECS,
                    defaults.approve_cooldown.as_secs(),
                )?),
                time_set_prompt: Duration::from_secs(parse_var(
                    env_vars::TIME_SET_PROMPT_SECS,
                    defaults.time_set_prompt.as_secs(),
                )?),
                receipt_timeout: Duration::from_secs(parse_var(
                    env_vars::RECEIPT_TIMEOUT_SECS,
                    defaults.receipt_timeout.as_secs(),
                )?),
                receipt_poll_interval: Duration::from_millis(parse_var(
                    env_vars::RECEIPT_POLL_MS,
                    defaults.receipt_poll_interval.as_millis() as u64,
                )?),
                approved_event_timeout: Duration::from_secs(parse_var(
                    env_vars::APPROVED_EVENT_TIMEOUT_SECS,
                    defaults.approved_event_timeout.as_secs(),
                )?),
            },
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| EscrowError::Config(format!("{} must be a valid number, got '{}'", name, raw)))
}
