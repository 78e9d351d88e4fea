//! JSON-RPC access for escrow transactions
//!
//! Thin wrapper over an ethers provider: sign-and-send through a
//! `SignerMiddleware`, then poll for the receipt until it is mined or the
//! wait times out.
//!
//! Sends from one account are serialized from nonce lookup until the node
//! has accepted the transaction, so overlapping deploys and approvals never
//! pick the same pending nonce.

use dashmap::DashMap;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockNumber, TransactionReceipt, TransactionRequest, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{EscrowError, Result};

pub struct EvmRpc<P = Http> {
    provider: Provider<P>,
    poll_interval: Duration,
    send_locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl EvmRpc<Http> {
    pub fn new(rpc_url: &str, poll_interval: Duration) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| EscrowError::Config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;
        Ok(Self::with_provider(provider, poll_interval))
    }
}

impl<P: JsonRpcClient + Clone + 'static> EvmRpc<P> {
    pub fn with_provider(provider: Provider<P>, poll_interval: Duration) -> Self {
        Self {
            provider: provider.interval(poll_interval),
            poll_interval,
            send_locks: DashMap::new(),
        }
    }

    fn send_lock(&self, from: Address) -> Arc<Mutex<()>> {
        self.send_locks.entry(from).or_default().clone()
    }

    /// Sign `tx` with `signer` and submit it. Returns once the node accepted it.
    pub async fn send_transaction(&self, signer: &LocalWallet, tx: TransactionRequest) -> Result<H256> {
        self.send_with_nonce(signer, tx).await.map(|(tx_hash, _)| tx_hash)
    }

    /// Like [`send_transaction`](Self::send_transaction), also returning the
    /// nonce the transaction was sent with
    pub async fn send_with_nonce(
        &self,
        signer: &LocalWallet,
        tx: TransactionRequest,
    ) -> Result<(H256, U256)> {
        let from = signer.address();
        let lock = self.send_lock(from);
        let _guard = lock.lock().await;

        let nonce = self
            .provider
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| EscrowError::tx_failed(format!("Failed to fetch nonce for {:?}: {}", from, e)))?;

        let client = SignerMiddleware::new(self.provider.clone(), signer.clone());
        let pending = client
            .send_transaction(tx.nonce(nonce), None)
            .await
            .map_err(|e| EscrowError::tx_failed(format!("Submission from {:?} rejected: {}", from, e)))?;
        let tx_hash = *pending;
        log::info!("[EvmRpc] Transaction sent: {:?} (nonce {})", tx_hash, nonce);
        Ok((tx_hash, nonce))
    }

    /// Poll until the transaction is mined. Provider errors while polling are
    /// treated as transient; only the overall timeout ends the wait.
    pub async fn wait_for_receipt(&self, tx_hash: H256, timeout: Duration) -> Result<TransactionReceipt> {
        let poll = async {
            loop {
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("[EvmRpc] Receipt poll for {:?} failed: {}", tx_hash, e);
                    }
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            EscrowError::tx_failed(format!(
                "Timed out after {:?} waiting for receipt of {:?}",
                timeout, tx_hash
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_signer;
    use ethers::providers::MockProvider;

    fn creation_tx() -> TransactionRequest {
        // gas and price preset so the node is only asked for the nonce and the send
        TransactionRequest::new()
            .data(vec![0x60u8, 0x80])
            .value(1000u64)
            .gas(500_000u64)
            .gas_price(1u64)
    }

    fn mocked_rpc() -> (Arc<EvmRpc<MockProvider>>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        (Arc::new(EvmRpc::with_provider(provider, Duration::from_millis(10))), mock)
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = EvmRpc::new("not a url", Duration::from_millis(100)).err().unwrap();
        assert!(matches!(err, EscrowError::Config(_)));
    }

    #[test]
    fn test_local_url_accepted() {
        assert!(EvmRpc::new("http://127.0.0.1:8545", Duration::from_millis(100)).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_deploys_from_one_signer_use_distinct_nonces() {
        let (rpc, mock) = mocked_rpc();
        // MockProvider answers last-pushed first: nonce 7, hash 1, nonce 8, hash 2
        mock.push::<H256, _>(H256::from_low_u64_be(2)).unwrap();
        mock.push::<U256, _>(U256::from(8u64)).unwrap();
        mock.push::<H256, _>(H256::from_low_u64_be(1)).unwrap();
        mock.push::<U256, _>(U256::from(7u64)).unwrap();

        let signer = test_signer();
        let spawn_deploy = |rpc: Arc<EvmRpc<MockProvider>>, signer: LocalWallet| {
            tokio::spawn(async move { rpc.send_with_nonce(&signer, creation_tx()).await })
        };
        let a = spawn_deploy(rpc.clone(), signer.clone());
        let b = spawn_deploy(rpc.clone(), signer.clone());

        let (hash_a, nonce_a) = a.await.unwrap().unwrap();
        let (hash_b, nonce_b) = b.await.unwrap().unwrap();

        let mut sent = vec![(nonce_a, hash_a), (nonce_b, hash_b)];
        sent.sort();
        assert_eq!(
            sent,
            vec![
                (U256::from(7u64), H256::from_low_u64_be(1)),
                (U256::from(8u64), H256::from_low_u64_be(2)),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_nonce_lookup_is_transaction_failed() {
        let (rpc, _mock) = mocked_rpc();
        let err = rpc
            .send_transaction(&test_signer(), creation_tx())
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::TransactionFailed(msg) if msg.contains("nonce")));
    }
}
