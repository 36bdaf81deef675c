//! [`ChainClient`] over HTTP JSON-RPC.
//!
//! Signing is left to the node: transactions are sent with
//! `eth_sendTransaction` from an account the node has unlocked (Hardhat and
//! Anvil dev accounts, or a node-side signer).

use std::time::Duration;

use alloy_core::primitives::{Address, B256, U64, U256, address};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ChainClient, Confirmation, CreationTx, PendingDeployment};
use crate::{
    error::{ConfirmationError, SubmissionError},
    rpc::{self, RpcError},
};

/// Default local node endpoint.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545/";
/// First Hardhat / Anvil dev account.
pub const DEFAULT_SENDER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Network section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcChainClientConfig {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: Url,
    /// Unlocked sender account.
    pub from: Address,
    /// Interval between `eth_getTransactionReceipt` polls. Must be non-zero.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive failed polls tolerated before the transaction is given up on.
    ///
    /// Unset means failed reads are retried for as long as the run waits, so a
    /// flaky node never ends a run whose transaction may still be mined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_poll_errors: Option<u32>,
    /// Upper bound on the wait for each confirmation. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_timeout_secs: Option<u64>,
}

impl Default for JsonRpcChainClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: Url::parse(DEFAULT_RPC_URL).expect("default RPC URL is valid"),
            from: DEFAULT_SENDER,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_errors: None,
            confirmation_timeout_secs: None,
        }
    }
}

impl JsonRpcChainClientConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.poll_interval_ms > 0,
            "network.poll_interval_ms must be greater than zero"
        );
        Ok(())
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    status: Option<U64>,
    contract_address: Option<Address>,
    block_number: Option<U64>,
}

impl TransactionReceipt {
    fn into_confirmation(self, tx_hash: B256) -> Result<Confirmation, ConfirmationError> {
        if self.status == Some(U64::ZERO) {
            return Err(ConfirmationError::Reverted { tx_hash });
        }

        let address = self
            .contract_address
            .ok_or(ConfirmationError::MissingAddress { tx_hash })?;

        Ok(Confirmation {
            address,
            block_number: self.block_number.map(|n| n.to::<u64>()),
        })
    }
}

/// JSON-RPC backed chain client.
#[derive(Debug, Clone)]
pub struct JsonRpcChainClient {
    http: reqwest::Client,
    url: Url,
    from: Address,
    poll_interval: Duration,
    max_poll_errors: Option<u32>,
}

impl JsonRpcChainClient {
    pub fn new(config: &JsonRpcChainClientConfig) -> anyhow::Result<Self> {
        config.validate()?;

        Ok(Self {
            http: rpc::create_client().context("Failed to create JSON-RPC client")?,
            url: config.rpc_url.clone(),
            from: config.from,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_errors: config.max_poll_errors,
        })
    }

    /// The account transactions are sent from.
    pub fn sender(&self) -> Address {
        self.from
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let chain_id: U64 =
            rpc::json_rpc_call(&self.http, self.url.as_str(), "eth_chainId", vec![]).await?;
        Ok(chain_id.to::<u64>())
    }

    /// Balance of the sender at the latest block.
    pub async fn balance(&self) -> Result<U256, RpcError> {
        rpc::json_rpc_call(
            &self.http,
            self.url.as_str(),
            "eth_getBalance",
            vec![serde_json::json!(self.from), serde_json::json!("latest")],
        )
        .await
    }
}

impl ChainClient for JsonRpcChainClient {
    async fn submit(&self, tx: CreationTx) -> Result<PendingDeployment, SubmissionError> {
        if !tx.value.is_zero() {
            let available = self
                .balance()
                .await
                .map_err(|e| SubmissionError::Rejected(e.to_string()))?;

            if available < tx.value {
                return Err(SubmissionError::InsufficientFunds {
                    required: tx.value,
                    available,
                });
            }
        }

        let tx_hash: B256 = rpc::json_rpc_call(
            &self.http,
            self.url.as_str(),
            "eth_sendTransaction",
            vec![serde_json::json!({
                "from": self.from,
                "data": tx.data,
                "value": format!("{:#x}", tx.value),
            })],
        )
        .await
        .map_err(|e| SubmissionError::Rejected(e.to_string()))?;

        tracing::debug!(contract = %tx.contract, %tx_hash, "Creation transaction accepted by node");

        Ok(PendingDeployment {
            contract: tx.contract,
            tx_hash,
            value: tx.value,
        })
    }

    async fn await_receipt(
        &self,
        pending: &PendingDeployment,
    ) -> Result<Confirmation, ConfirmationError> {
        let tx_hash = pending.tx_hash;
        let mut consecutive_errors = 0u32;

        loop {
            let receipt: Result<Option<TransactionReceipt>, RpcError> = rpc::json_rpc_call(
                &self.http,
                self.url.as_str(),
                "eth_getTransactionReceipt",
                vec![serde_json::json!(tx_hash)],
            )
            .await;

            match receipt {
                Ok(Some(receipt)) => return receipt.into_confirmation(tx_hash),
                Ok(None) => {
                    consecutive_errors = 0;
                    tracing::trace!(contract = %pending.contract, %tx_hash, "Creation transaction not mined yet");
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if self.max_poll_errors.is_some_and(|max| consecutive_errors > max) {
                        return Err(ConfirmationError::Rpc {
                            tx_hash,
                            reason: e.to_string(),
                        });
                    }
                    tracing::debug!(
                        contract = %pending.contract,
                        %tx_hash,
                        error = %e,
                        attempt = consecutive_errors,
                        "Receipt poll failed, retrying..."
                    );
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::Bytes;
    use mockito::Matcher;

    const TX_HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

    fn client_for(server: &mockito::Server) -> JsonRpcChainClient {
        JsonRpcChainClient::new(&JsonRpcChainClientConfig {
            rpc_url: Url::parse(&server.url()).unwrap(),
            poll_interval_ms: 1,
            max_poll_errors: Some(2),
            ..Default::default()
        })
        .unwrap()
    }

    fn method(name: &str) -> Matcher {
        Matcher::PartialJson(serde_json::json!({ "method": name }))
    }

    fn creation(value: u64) -> CreationTx {
        CreationTx {
            contract: "CryptoDevsDAO".to_string(),
            data: Bytes::from(vec![0x60, 0x80]),
            value: U256::from(value),
        }
    }

    #[tokio::test]
    async fn test_submit_returns_pending_handle() {
        let mut server = mockito::Server::new_async().await;
        let send = server
            .mock("POST", "/")
            .match_body(method("eth_sendTransaction"))
            .with_body(format!(r#"{{"jsonrpc":"2.0","id":1,"result":"{TX_HASH}"}}"#))
            .expect(1)
            .create_async()
            .await;

        let pending = client_for(&server).submit(creation(0)).await.unwrap();

        assert_eq!(pending.tx_hash, TX_HASH.parse::<B256>().unwrap());
        assert_eq!(pending.contract, "CryptoDevsDAO");
        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_checks_balance_before_sending_value() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(method("eth_getBalance"))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
            .create_async()
            .await;
        let send = server
            .mock("POST", "/")
            .match_body(method("eth_sendTransaction"))
            .expect(0)
            .create_async()
            .await;

        let err = client_for(&server).submit(creation(17)).await.unwrap_err();

        assert_eq!(
            err,
            SubmissionError::InsufficientFunds {
                required: U256::from(17),
                available: U256::from(16),
            }
        );
        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_node_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(method("eth_sendTransaction"))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#)
            .create_async()
            .await;

        let err = client_for(&server).submit(creation(0)).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected(msg) if msg.contains("nonce too low")));
    }

    fn pending() -> PendingDeployment {
        PendingDeployment {
            contract: "FakeNFTMarketplace".to_string(),
            tx_hash: TX_HASH.parse().unwrap(),
            value: U256::ZERO,
        }
    }

    #[tokio::test]
    async fn test_await_receipt_confirmed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(method("eth_getTransactionReceipt"))
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"result":{"status":"0x1","blockNumber":"0x2a","contractAddress":"0x5fbdb2315678afecb367f032d93f642f64180aa3"}}"#,
            )
            .create_async()
            .await;

        let confirmation = client_for(&server).await_receipt(&pending()).await.unwrap();

        assert_eq!(
            confirmation.address,
            address!("0x5FbDB2315678afecb367f032d93F642f64180aa3")
        );
        assert_eq!(confirmation.block_number, Some(42));
    }

    #[tokio::test]
    async fn test_await_receipt_reverted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(method("eth_getTransactionReceipt"))
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"result":{"status":"0x0","blockNumber":"0x2a","contractAddress":null}}"#,
            )
            .create_async()
            .await;

        let err = client_for(&server).await_receipt(&pending()).await.unwrap_err();
        assert_eq!(
            err,
            ConfirmationError::Reverted {
                tx_hash: TX_HASH.parse().unwrap()
            }
        );
    }

    #[tokio::test]
    async fn test_await_receipt_without_contract_address() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(method("eth_getTransactionReceipt"))
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"result":{"status":"0x1","blockNumber":"0x2a","contractAddress":null}}"#,
            )
            .create_async()
            .await;

        let err = client_for(&server).await_receipt(&pending()).await.unwrap_err();
        assert_eq!(
            err,
            ConfirmationError::MissingAddress {
                tx_hash: TX_HASH.parse().unwrap()
            }
        );
    }

    #[tokio::test]
    async fn test_await_receipt_retries_failed_reads_when_unbounded() {
        let mut server = mockito::Server::new_async().await;
        let failures = server
            .mock("POST", "/")
            .with_status(502)
            .with_body("bad gateway")
            .expect(10)
            .create_async()
            .await;
        let receipt = server
            .mock("POST", "/")
            .match_body(method("eth_getTransactionReceipt"))
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"result":{"status":"0x1","blockNumber":"0x2a","contractAddress":"0x5fbdb2315678afecb367f032d93f642f64180aa3"}}"#,
            )
            .create_async()
            .await;

        let client = JsonRpcChainClient::new(&JsonRpcChainClientConfig {
            rpc_url: Url::parse(&server.url()).unwrap(),
            poll_interval_ms: 1,
            ..Default::default()
        })
        .unwrap();

        let confirmation = client.await_receipt(&pending()).await.unwrap();

        assert_eq!(confirmation.block_number, Some(42));
        failures.assert_async().await;
        receipt.assert_async().await;
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let config = JsonRpcChainClientConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };

        assert!(config.validate().is_err());
        assert!(JsonRpcChainClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_await_receipt_gives_up_after_repeated_poll_errors() {
        let mut server = mockito::Server::new_async().await;
        let polls = server
            .mock("POST", "/")
            .with_status(502)
            .with_body("bad gateway")
            .expect(3)
            .create_async()
            .await;

        let err = client_for(&server).await_receipt(&pending()).await.unwrap_err();

        assert!(matches!(err, ConfirmationError::Rpc { .. }));
        polls.assert_async().await;
    }
}
