//! Etherscan-compatible verification API.

use std::time::Duration;

use anyhow::Context;
use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use url::Url;

use super::{VerificationConfig, VerificationOutcome, VerificationRequest, Verifier};
use crate::error::VerificationError;

const CODE_FORMAT: &str = "solidity-standard-json-input";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

impl ApiResponse {
    fn is_ok(&self) -> bool {
        self.status == "1"
    }

    fn mentions(&self, needle: &str) -> bool {
        self.result.to_lowercase().contains(needle)
    }
}

/// Why a status poll did not produce an outcome.
enum StatusPoll {
    Pending,
    Error(VerificationError),
}

impl From<reqwest::Error> for StatusPoll {
    fn from(err: reqwest::Error) -> Self {
        Self::Error(err.into())
    }
}

/// Verifies contracts through `verifysourcecode` / `checkverifystatus`.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    http: reqwest::Client,
    api_url: Url,
    api_key: String,
    status_poll_attempts: usize,
    min_poll_delay: Duration,
}

impl EtherscanVerifier {
    pub fn new(api_url: Url, api_key: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            http: crate::rpc::create_client().context("Failed to create explorer client")?,
            api_url,
            api_key: api_key.into(),
            status_poll_attempts: super::DEFAULT_STATUS_POLL_ATTEMPTS,
            min_poll_delay: Duration::from_secs(2),
        })
    }

    pub fn from_config(config: &VerificationConfig) -> anyhow::Result<Self> {
        let api_url = config
            .api_url
            .clone()
            .context("verification is enabled but no explorer API URL is configured")?;
        let api_key = config
            .api_key
            .clone()
            .context("verification is enabled but no explorer API key is configured")?;

        Ok(Self::new(api_url, api_key)?.with_status_poll_attempts(config.status_poll_attempts))
    }

    pub fn with_status_poll_attempts(mut self, attempts: usize) -> Self {
        self.status_poll_attempts = attempts;
        self
    }

    pub fn with_min_poll_delay(mut self, delay: Duration) -> Self {
        self.min_poll_delay = delay;
        self
    }

    /// Submit the source, returning the GUID to poll, or `None` when the
    /// explorer already knows the contract.
    async fn submit_source(&self, request: &VerificationRequest) -> Result<Option<String>, VerificationError> {
        let address = request.address.to_checksum(None);
        let source = request.standard_json_input.to_string();
        let compiler = format!("v{}", request.compiler_version);
        let constructor_args = hex::encode(&request.constructor_args);

        let response: ApiResponse = self
            .http
            .post(self.api_url.clone())
            .form(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "verifysourcecode"),
                ("contractaddress", address.as_str()),
                ("sourceCode", source.as_str()),
                ("codeformat", CODE_FORMAT),
                ("contractname", request.contract_name.as_str()),
                ("compilerversion", compiler.as_str()),
                // Etherscan's spelling.
                ("constructorArguements", constructor_args.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.is_ok() {
            return Ok(Some(response.result));
        }
        if response.mentions("already verified") {
            return Ok(None);
        }

        Err(VerificationError::Rejected(format!(
            "{}: {}",
            response.message, response.result
        )))
    }

    async fn check_status(&self, guid: &str) -> Result<VerificationOutcome, StatusPoll> {
        let response: ApiResponse = self
            .http
            .get(self.api_url.clone())
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.is_ok() {
            Ok(VerificationOutcome::Verified)
        } else if response.mentions("pending") {
            Err(StatusPoll::Pending)
        } else if response.mentions("already verified") {
            Ok(VerificationOutcome::AlreadyVerified)
        } else {
            Err(StatusPoll::Error(VerificationError::Failed(response.result)))
        }
    }
}

impl Verifier for EtherscanVerifier {
    async fn submit_verification(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, VerificationError> {
        let Some(guid) = self.submit_source(request).await? else {
            return Ok(VerificationOutcome::AlreadyVerified);
        };

        tracing::debug!(address = %request.address, %guid, "Verification submitted, polling status");

        let polled = (|| async { self.check_status(&guid).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(self.min_poll_delay)
                    .with_max_times(self.status_poll_attempts),
            )
            .sleep(tokio::time::sleep)
            .when(|e| matches!(e, StatusPoll::Pending))
            .notify(|_, after| {
                tracing::debug!(%guid, ?after, "Verification still pending");
            })
            .await;

        match polled {
            Ok(outcome) => Ok(outcome),
            Err(StatusPoll::Pending) => Ok(VerificationOutcome::Pending { guid }),
            Err(StatusPoll::Error(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{Address, Bytes};
    use mockito::Matcher;

    use super::*;

    fn verifier_for(server: &mockito::Server) -> EtherscanVerifier {
        EtherscanVerifier::new(Url::parse(&format!("{}/api", server.url())).unwrap(), "KEY")
            .unwrap()
            .with_status_poll_attempts(2)
            .with_min_poll_delay(Duration::from_millis(1))
    }

    fn request() -> VerificationRequest {
        VerificationRequest {
            address: Address::with_last_byte(7),
            contract_name: "contracts/CryptoDevsDAO.sol:CryptoDevsDAO".to_string(),
            compiler_version: "0.8.17+commit.8df45f5f".to_string(),
            standard_json_input: serde_json::json!({ "language": "Solidity" }),
            constructor_args: Bytes::from(vec![0xab; 4]),
        }
    }

    fn status_query() -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("action".into(), "checkverifystatus".into()),
            Matcher::UrlEncoded("guid".into(), "guid-123".into()),
        ])
    }

    async fn accept_submission(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", "/api")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("action".into(), "verifysourcecode".into()),
                Matcher::UrlEncoded("constructorArguements".into(), "abababab".into()),
                Matcher::UrlEncoded("compilerversion".into(), "v0.8.17+commit.8df45f5f".into()),
            ]))
            .with_body(r#"{"status":"1","message":"OK","result":"guid-123"}"#)
            .expect(1)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_verified_after_status_poll() {
        let mut server = mockito::Server::new_async().await;
        let submit = accept_submission(&mut server).await;
        server
            .mock("GET", "/api")
            .match_query(status_query())
            .with_body(r#"{"status":"1","message":"OK","result":"Pass - Verified"}"#)
            .create_async()
            .await;

        let outcome = verifier_for(&server).submit_verification(&request()).await.unwrap();

        assert_eq!(outcome, VerificationOutcome::Verified);
        submit.assert_async().await;
    }

    #[tokio::test]
    async fn test_already_verified_on_submission() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api")
            .with_body(r#"{"status":"0","message":"NOTOK","result":"Contract source code already verified"}"#)
            .create_async()
            .await;
        let status = server
            .mock("GET", "/api")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let outcome = verifier_for(&server).submit_verification(&request()).await.unwrap();

        assert_eq!(outcome, VerificationOutcome::AlreadyVerified);
        status.assert_async().await;
    }

    #[tokio::test]
    async fn test_pending_after_poll_budget() {
        let mut server = mockito::Server::new_async().await;
        accept_submission(&mut server).await;
        let status = server
            .mock("GET", "/api")
            .match_query(status_query())
            .with_body(r#"{"status":"0","message":"NOTOK","result":"Pending in queue"}"#)
            .expect(3)
            .create_async()
            .await;

        let outcome = verifier_for(&server).submit_verification(&request()).await.unwrap();

        assert_eq!(
            outcome,
            VerificationOutcome::Pending {
                guid: "guid-123".to_string()
            }
        );
        status.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_verification() {
        let mut server = mockito::Server::new_async().await;
        accept_submission(&mut server).await;
        server
            .mock("GET", "/api")
            .match_query(status_query())
            .with_body(r#"{"status":"0","message":"NOTOK","result":"Fail - Unable to verify"}"#)
            .create_async()
            .await;

        let err = verifier_for(&server).submit_verification(&request()).await.unwrap_err();

        assert_eq!(err, VerificationError::Failed("Fail - Unable to verify".to_string()));
    }

    #[tokio::test]
    async fn test_rejected_submission() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api")
            .with_body(r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#)
            .create_async()
            .await;

        let err = verifier_for(&server).submit_verification(&request()).await.unwrap_err();

        assert_eq!(err, VerificationError::Rejected("NOTOK: Invalid API Key".to_string()));
    }

    #[test]
    fn test_from_config_requires_url_and_key() {
        let config = VerificationConfig {
            enabled: true,
            delay_secs: Some(10),
            ..Default::default()
        };
        assert!(EtherscanVerifier::from_config(&config).is_err());

        let config = VerificationConfig {
            api_url: Some(Url::parse("https://api-sepolia.etherscan.io/api").unwrap()),
            api_key: Some("KEY".to_string()),
            ..config
        };
        assert!(EtherscanVerifier::from_config(&config).is_ok());
    }
}
