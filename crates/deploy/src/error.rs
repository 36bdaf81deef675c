//! Error taxonomy for a deployment run.
//!
//! Plan errors are caught before anything touches the chain. Everything in
//! [`DeployError`] is fatal for the run. [`VerificationError`] never is.

use std::time::Duration;

use alloy_core::primitives::{B256, U256};

/// A plan that cannot be executed as written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("deployment plan is empty")]
    Empty,
    #[error("label `{0}` is used by more than one deployment")]
    DuplicateLabel(String),
    #[error("`{spec}` references `{reference}`, which is deployed later in the plan")]
    ForwardReference { spec: String, reference: String },
    #[error("`{spec}` references itself")]
    SelfReference { spec: String },
    #[error("`{spec}` references `{reference}`, which is not part of the plan")]
    UnknownReference { spec: String, reference: String },
    #[error("`{spec}` uses constant `{constant}`, which is not configured")]
    MissingConstant { spec: String, constant: String },
}

/// Failure while building or sending a contract-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("`{contract}` constructor takes {expected} argument(s), got {got}")]
    ArityMismatch {
        contract: String,
        expected: usize,
        got: usize,
    },
    #[error("`{contract}` argument {index} (`{ty}`): cannot use `{value}`: {reason}")]
    InvalidArgument {
        contract: String,
        index: usize,
        ty: String,
        value: String,
        reason: String,
    },
    #[error("`{contract}` constructor is not payable but {value} wei was attached")]
    NonPayable { contract: String, value: U256 },
    #[error("sender balance {available} wei is below the required {required} wei")]
    InsufficientFunds { required: U256, available: U256 },
    #[error("node rejected the creation transaction: {0}")]
    Rejected(String),
}

/// Failure while waiting for a submitted creation transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationError {
    #[error("creation transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },
    #[error("creation transaction {tx_hash} not confirmed after {after:?}")]
    TimedOut { tx_hash: B256, after: Duration },
    #[error("receipt for {tx_hash} carries no contract address")]
    MissingAddress { tx_hash: B256 },
    #[error("lost track of {tx_hash}: {reason}")]
    Rpc { tx_hash: B256, reason: String },
}

/// Fatal failure of a single deployment step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("unknown contract `{0}`: no compiled artifact found")]
    UnknownContract(String),
    #[error("artifact for `{contract}` is unusable: {reason}")]
    InvalidArtifact { contract: String, reason: String },
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
}

/// Failure of the optional explorer verification step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("no verification metadata available for `{0}`")]
    MissingMetadata(String),
    #[error("explorer rejected the verification request: {0}")]
    Rejected(String),
    #[error("explorer could not verify the source: {0}")]
    Failed(String),
    #[error("explorer request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for VerificationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
