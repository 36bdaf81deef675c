//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default timeout for a single RPC request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure of a single JSON-RPC call.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("failed to send {method} request: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} returned error {code}: {message}")]
    Response {
        method: String,
        code: i64,
        message: String,
    },
    #[error("malformed {method} response: {reason}")]
    Malformed { method: String, reason: String },
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    use anyhow::Context;

    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// A `null` result deserializes into `T` as-is, so callers polling for
/// something that may not exist yet should ask for an `Option`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcError> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|source| RpcError::Transport {
            method: method.to_string(),
            source,
        })?;

    let body: Value = response.json().await.map_err(|e| RpcError::Malformed {
        method: method.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(error) = body.get("error") {
        return Err(RpcError::Response {
            method: method.to_string(),
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        });
    }

    let result = body.get("result").cloned().ok_or_else(|| RpcError::Malformed {
        method: method.to_string(),
        reason: "no result in response".to_string(),
    })?;

    serde_json::from_value(result).map_err(|e| RpcError::Malformed {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_json_rpc_call_returns_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(serde_json::json!({ "method": "eth_chainId" })))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x7a69"}"#)
            .create_async()
            .await;

        let client = create_client().unwrap();
        let chain_id: String = json_rpc_call(&client, &server.url(), "eth_chainId", vec![])
            .await
            .unwrap();

        assert_eq!(chain_id, "0x7a69");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_json_rpc_call_surfaces_error_object() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"insufficient funds"}}"#)
            .create_async()
            .await;

        let client = create_client().unwrap();
        let err = json_rpc_call::<String>(&client, &server.url(), "eth_sendTransaction", vec![])
            .await
            .unwrap_err();

        match err {
            RpcError::Response { code, message, .. } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "insufficient funds");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_json_rpc_call_null_result_as_option() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let client = create_client().unwrap();
        let receipt: Option<Value> =
            json_rpc_call(&client, &server.url(), "eth_getTransactionReceipt", vec![])
                .await
                .unwrap();
        assert!(receipt.is_none());
    }
}
