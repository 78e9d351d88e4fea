//! Environment-based wallet session
//!
//! Loads the signing key from ESCROW_WALLET_PRIVATE_KEY. Meant for local
//! chains and scripted runs where the key is configured at launch.

use async_trait::async_trait;
use ethers::core::k256::ecdsa::SigningKey;
use ethers::signers::{LocalWallet, Signer};

use super::WalletSession;
use crate::config::env_vars;
use crate::error::{EscrowError, Result};

/// Wallet session backed by a private key from the environment
pub struct EnvWalletSession {
    wallet: LocalWallet,
    address: String,
}

impl EnvWalletSession {
    /// Requires: ESCROW_WALLET_PRIVATE_KEY
    pub fn from_env(chain_id: u64) -> Result<Self> {
        let private_key = std::env::var(env_vars::WALLET_PRIVATE_KEY)
            .map_err(|_| EscrowError::Config(format!("{} not set", env_vars::WALLET_PRIVATE_KEY)))?;

        Self::from_private_key(&private_key, chain_id)
    }

    /// Create a session from a private key string, with or without 0x prefix
    pub fn from_private_key(private_key: &str, chain_id: u64) -> Result<Self> {
        let key_hex = private_key.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let key_bytes = hex::decode(key_hex)
            .map_err(|e| EscrowError::Wallet(format!("Invalid private key hex: {}", e)))?;

        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| EscrowError::Wallet(format!("Invalid private key: {}", e)))?;

        let wallet = LocalWallet::from(signing_key).with_chain_id(chain_id);
        let address = format!("{:?}", wallet.address()).to_lowercase();

        Ok(Self { wallet, address })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl WalletSession for EnvWalletSession {
    async fn request_accounts(&self) -> Result<Vec<String>> {
        Ok(vec![self.address.clone()])
    }

    async fn signer(&self) -> Result<LocalWallet> {
        Ok(self.wallet.clone())
    }

    fn mode_name(&self) -> &'static str {
        "env"
    }
}
