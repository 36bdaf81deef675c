//! sequin-deploy - Sequential deployment of interdependent contracts.
//!
//! A [`DeploymentPlan`] is an ordered list of contracts whose constructor
//! arguments may reference the addresses of contracts deployed earlier in the
//! same plan. The [`Orchestrator`] deploys them one at a time, waiting for each
//! to be confirmed before the next is submitted.

mod builder;
pub use builder::{DeployerBuilder, OutDataPath};

mod deployer;
pub use deployer::{Deployer, ENV_PREFIX, SEQUIN_CONFIG_FILENAME};

pub mod artifacts;
pub use artifacts::{ArtifactSource, ArtifactStore, ContractFactory, VerificationMetadata};

pub mod client;
pub use client::{
    ChainClient, Confirmation, CreationTx, JsonRpcChainClient, JsonRpcChainClientConfig,
    PendingDeployment,
};

pub mod error;
pub use error::{ConfirmationError, DeployError, PlanError, SubmissionError, VerificationError};

mod orchestrator;
pub use orchestrator::{DeploymentResult, DeploymentStatus, FailedStep, Orchestrator, RunFailure};

pub mod plan;
pub use plan::{Amount, Constants, ConstructorArg, DeploymentPlan, DeploymentSpec};

pub mod record;
pub use record::{DeploymentRecord, PlanFingerprint};

pub mod rpc;

pub mod verify;
pub use verify::{
    EtherscanVerifier, VerificationConfig, VerificationOutcome, VerificationReport,
    VerificationRequest, Verifier,
};
