//! Source verification against a block explorer.
//!
//! Verification runs after the deployments it describes are confirmed and can
//! never undo them: every failure here is logged and reported, not raised.

mod etherscan;

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub use etherscan::EtherscanVerifier;

use crate::{
    artifacts::{ArtifactSource, ContractFactory},
    error::VerificationError,
    orchestrator::DeploymentResult,
};

/// Default number of `checkverifystatus` polls before reporting a pending GUID.
pub const DEFAULT_STATUS_POLL_ATTEMPTS: usize = 5;

fn default_status_poll_attempts() -> usize {
    DEFAULT_STATUS_POLL_ATTEMPTS
}

/// `[verification]` section of the configuration.
///
/// Disabled unless asked for. When enabled, `delay_secs` must be set: how
/// long the explorer needs to index a new contract depends on the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Wait between confirmation and submitting verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u64>,
    /// Explorer API endpoint, e.g. `https://api-sepolia.etherscan.io/api`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_status_poll_attempts")]
    pub status_poll_attempts: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_secs: None,
            api_url: None,
            api_key: None,
            status_poll_attempts: DEFAULT_STATUS_POLL_ATTEMPTS,
        }
    }
}

impl VerificationConfig {
    /// Delay before verification, required once verification is enabled.
    pub fn delay(&self) -> anyhow::Result<Duration> {
        self.delay_secs.map(Duration::from_secs).ok_or_else(|| {
            anyhow::anyhow!("verification is enabled but no delay is configured (set verification.delay_secs)")
        })
    }
}

/// Everything an explorer needs to verify one deployed contract.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    pub address: Address,
    /// `<source path>:<contract>`.
    pub contract_name: String,
    pub compiler_version: String,
    pub standard_json_input: Value,
    /// ABI-encoded constructor arguments, without bytecode.
    pub constructor_args: Bytes,
}

impl VerificationRequest {
    /// Build the request for a confirmed deployment of `factory`.
    pub fn new(result: &DeploymentResult, factory: &ContractFactory) -> Result<Self, VerificationError> {
        let metadata = factory
            .metadata
            .as_ref()
            .ok_or_else(|| VerificationError::MissingMetadata(factory.name.clone()))?;

        let constructor_args = factory
            .encode_constructor(&result.args)
            .map_err(|e| VerificationError::Failed(e.to_string()))?;

        Ok(Self {
            address: result.address,
            contract_name: metadata.qualified_name(&factory.name),
            compiler_version: metadata.compiler_version.clone(),
            standard_json_input: metadata.standard_json_input.clone(),
            constructor_args,
        })
    }
}

/// What the explorer made of a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified,
    AlreadyVerified,
    /// Accepted but not settled within the polling budget.
    Pending { guid: String },
}

/// An explorer's verification endpoint.
pub trait Verifier: Send + Sync {
    /// Submit one verification request. Called at most once per contract.
    fn submit_verification(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<VerificationOutcome, VerificationError>> + Send;
}

/// Verification result for one deployment, as recorded after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub label: String,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VerificationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Wait `delay`, then submit verification for `result` once.
pub async fn verify<V: Verifier>(
    verifier: &V,
    result: &DeploymentResult,
    factory: &ContractFactory,
    delay: Duration,
) -> Result<VerificationOutcome, VerificationError> {
    let request = VerificationRequest::new(result, factory)?;

    tracing::info!(
        label = %result.label,
        address = %result.address,
        delay_secs = delay.as_secs(),
        "Waiting for the explorer to index the contract before verifying"
    );
    tokio::time::sleep(delay).await;

    verifier.submit_verification(&request).await
}

/// Verify every result in turn.
///
/// Failures are logged and reported, the results themselves are left alone.
pub async fn verify_all<V: Verifier, A: ArtifactSource>(
    verifier: &V,
    artifacts: &A,
    results: &[DeploymentResult],
    delay: Duration,
) -> Vec<VerificationReport> {
    let mut reports = Vec::with_capacity(results.len());

    for result in results {
        let outcome = match artifacts.resolve(&result.contract) {
            Ok(factory) => verify(verifier, result, &factory, delay).await,
            Err(e) => Err(VerificationError::MissingMetadata(e.to_string())),
        };

        let report = match outcome {
            Ok(outcome) => {
                tracing::info!(label = %result.label, address = %result.address, ?outcome, "Verification finished");
                VerificationReport {
                    label: result.label.clone(),
                    address: result.address,
                    outcome: Some(outcome),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(label = %result.label, address = %result.address, error = %e, "Verification failed");
                VerificationReport {
                    label: result.label.clone(),
                    address: result.address,
                    outcome: None,
                    error: Some(e.to_string()),
                }
            }
        };
        reports.push(report);
    }

    reports
}
