//! Chain client seam.
//!
//! Deployment is two-phase: [`ChainClient::submit`] hands back a
//! [`PendingDeployment`], and [`ChainClient::await_receipt`] turns it into a
//! [`Confirmation`]. Keeping them apart lets the caller bound the waiting phase
//! without touching submission.

mod json_rpc;

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes, U256};

pub use json_rpc::{JsonRpcChainClient, JsonRpcChainClientConfig};

use crate::error::{ConfirmationError, SubmissionError};

/// A contract-creation transaction, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationTx {
    /// Contract identifier, for logs and errors.
    pub contract: String,
    /// Bytecode followed by the encoded constructor arguments.
    pub data: Bytes,
    /// Wei transferred to the new contract.
    pub value: U256,
}

/// Handle to a creation transaction the node has accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeployment {
    pub contract: String,
    pub tx_hash: B256,
    pub value: U256,
}

/// A mined, successful creation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub address: Address,
    pub block_number: Option<u64>,
}

/// Connected, authenticated access to the chain.
///
/// Implementations must not resubmit on their own: a dropped or reverted
/// creation is reported, never retried.
pub trait ChainClient: Send + Sync {
    /// Send a creation transaction.
    fn submit(
        &self,
        tx: CreationTx,
    ) -> impl Future<Output = Result<PendingDeployment, SubmissionError>> + Send;

    /// Suspend until `pending` is mined.
    ///
    /// No deadline of its own: bounding the wait is the caller's choice.
    fn await_receipt(
        &self,
        pending: &PendingDeployment,
    ) -> impl Future<Output = Result<Confirmation, ConfirmationError>> + Send;
}
