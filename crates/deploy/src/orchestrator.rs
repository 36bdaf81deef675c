//! Sequential deployment of a [`DeploymentPlan`].
//!
//! Each spec is resolved, submitted and confirmed before the next one is
//! looked at, so a later spec can only ever see confirmed addresses. The
//! first failure stops the run; contracts already deployed stay deployed.

use std::{fmt, time::Duration};

use alloy_core::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    artifacts::{ArtifactSource, ContractFactory},
    client::{ChainClient, CreationTx, PendingDeployment},
    error::{ConfirmationError, DeployError, SubmissionError},
    plan::{Amount, Constants, DeploymentPlan},
};

/// Lifecycle of a single spec.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    #[display("pending")]
    Pending,
    #[display("submitted")]
    Submitted,
    #[display("confirmed")]
    Confirmed,
    #[display("reverted")]
    Reverted,
    #[display("timed out")]
    TimedOut,
}

/// A confirmed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Label of the deployment spec this result belongs to.
    pub label: String,
    pub contract: String,
    pub address: Address,
    pub tx_hash: B256,
    /// Constructor arguments as submitted, after reference substitution.
    pub args: Vec<String>,
    pub value: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub status: DeploymentStatus,
}

/// The spec a run stopped at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub label: String,
    pub contract: String,
    /// Last state the failing deployment reached.
    pub status: DeploymentStatus,
    /// Set once the node accepted the creation transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
}

/// A run that stopped early.
///
/// `completed` holds every result confirmed before the failure, in plan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub completed: Vec<DeploymentResult>,
    /// `None` when the plan was rejected before anything was submitted.
    pub step: Option<FailedStep>,
    pub error: DeployError,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(
                f,
                "deployment of `{}` failed ({}) after {} confirmed deployment(s): {}",
                step.label,
                step.status,
                self.completed.len(),
                self.error
            ),
            None => write!(f, "invalid deployment plan: {}", self.error),
        }
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs deployment plans against one artifact source and one chain client.
#[derive(Debug, Clone)]
pub struct Orchestrator<A, C> {
    artifacts: A,
    client: C,
    constants: Constants,
    confirmation_timeout: Option<Duration>,
}

impl<A: ArtifactSource, C: ChainClient> Orchestrator<A, C> {
    pub fn new(artifacts: A, client: C, constants: Constants) -> Self {
        Self {
            artifacts,
            client,
            constants,
            confirmation_timeout: None,
        }
    }

    /// Bound the wait for each confirmation. Submission is never bounded.
    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn artifacts(&self) -> &A {
        &self.artifacts
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    pub fn resolve_factory(&self, contract: &str) -> Result<ContractFactory, DeployError> {
        self.artifacts.resolve(contract)
    }

    /// Submit a creation transaction for `factory`.
    pub async fn deploy(
        &self,
        factory: &ContractFactory,
        args: &[String],
        value: U256,
    ) -> Result<PendingDeployment, SubmissionError> {
        let data = factory.deploy_data(args, value)?;

        self.client
            .submit(CreationTx {
                contract: factory.name.clone(),
                data,
                value,
            })
            .await
    }

    /// Wait until `pending` is mined.
    ///
    /// The result is labelled with the bare contract name and carries no
    /// arguments; [`Orchestrator::run`] fills both in from the deployment spec.
    pub async fn await_confirmation(
        &self,
        pending: &PendingDeployment,
    ) -> Result<DeploymentResult, ConfirmationError> {
        let receipt = self.client.await_receipt(pending);

        let confirmation = match self.confirmation_timeout {
            Some(after) => tokio::time::timeout(after, receipt)
                .await
                .map_err(|_| ConfirmationError::TimedOut {
                    tx_hash: pending.tx_hash,
                    after,
                })??,
            None => receipt.await?,
        };

        Ok(DeploymentResult {
            label: pending.contract.clone(),
            contract: pending.contract.clone(),
            address: confirmation.address,
            tx_hash: pending.tx_hash,
            args: Vec::new(),
            value: pending.value.into(),
            block_number: confirmation.block_number,
            status: DeploymentStatus::Confirmed,
        })
    }

    /// Deploy every spec of `plan` in order.
    pub async fn run(&self, plan: &DeploymentPlan) -> Result<Vec<DeploymentResult>, RunFailure> {
        plan.validate(&self.constants).map_err(|e| RunFailure {
            completed: Vec::new(),
            step: None,
            error: e.into(),
        })?;

        tracing::info!(deployments = plan.len(), "Starting deployment run");

        let mut results: Vec<DeploymentResult> = Vec::with_capacity(plan.len());

        for spec in plan.specs() {
            let label = spec.key().to_string();
            let mut step = FailedStep {
                label: label.clone(),
                contract: spec.contract.clone(),
                status: DeploymentStatus::Pending,
                tx_hash: None,
            };

            let outcome: Result<DeploymentResult, DeployError> = async {
                let factory = self.resolve_factory(&spec.contract)?;
                let args = spec.resolve_args(&self.constants, &results)?;
                let value = spec.value_or_zero();

                tracing::info!(
                    label = %label,
                    contract = %spec.contract,
                    args = ?args,
                    value = %value,
                    "Submitting deployment"
                );
                let pending = self.deploy(&factory, &args, *value).await?;

                step.status = DeploymentStatus::Submitted;
                step.tx_hash = Some(pending.tx_hash);
                tracing::info!(label = %label, tx_hash = %pending.tx_hash, "Deployment submitted, awaiting confirmation");

                let result = self.await_confirmation(&pending).await.inspect_err(|e| {
                    step.status = match e {
                        ConfirmationError::Reverted { .. } => DeploymentStatus::Reverted,
                        ConfirmationError::TimedOut { .. } => DeploymentStatus::TimedOut,
                        _ => DeploymentStatus::Submitted,
                    };
                })?;

                Ok::<_, DeployError>(DeploymentResult {
                    label: label.clone(),
                    args,
                    ..result
                })
            }
            .await;

            match outcome {
                Ok(result) => {
                    tracing::info!(
                        label = %result.label,
                        address = %result.address,
                        block_number = ?result.block_number,
                        "Deployment confirmed"
                    );
                    results.push(result);
                }
                Err(error) => {
                    tracing::error!(
                        label = %step.label,
                        status = %step.status,
                        confirmed = results.len(),
                        error = %error,
                        "Deployment failed, aborting remaining plan"
                    );
                    return Err(RunFailure {
                        completed: results,
                        step: Some(step),
                        error,
                    });
                }
            }
        }

        tracing::info!(deployments = results.len(), "Deployment run complete");
        Ok(results)
    }
}
