//! Wallet Session Abstraction
//!
//! The escrow app needs two things from a wallet: the list of authorized
//! accounts and a signer bound to the first of them. How the wallet gets
//! there (key in the environment, hardware device, remote signer) stays
//! behind [`WalletSession`].

mod env_provider;

pub use env_provider::EnvWalletSession;

use async_trait::async_trait;
use ethers::signers::LocalWallet;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;

/// Trait for wallet sessions - account authorization plus signing capability
#[async_trait]
pub trait WalletSession: Send + Sync {
    /// Ask the wallet for authorized accounts; first entry is the active one
    async fn request_accounts(&self) -> Result<Vec<String>>;

    /// Signer bound to the active account
    async fn signer(&self) -> Result<LocalWallet>;

    /// Session name for logging
    fn mode_name(&self) -> &'static str;
}

/// Create the wallet session from the environment
pub fn create_wallet_session(config: &Config) -> Result<Arc<dyn WalletSession>> {
    let session = EnvWalletSession::from_env(config.chain_id)?;
    log::info!(
        "Wallet session initialized ({} mode): {}",
        session.mode_name(),
        session.address()
    );
    Ok(Arc::new(session))
}
