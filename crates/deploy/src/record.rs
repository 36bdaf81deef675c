use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    orchestrator::{DeploymentResult, FailedStep, RunFailure},
    plan::{Constants, DeploymentPlan},
    verify::VerificationReport,
};

/// File name of the record written under `outdata`.
pub const RECORD_FILE_NAME: &str = "deployments.json";

/// What a run was asked to deploy.
///
/// Two runs with the same fingerprint submitted the same transactions, modulo
/// the addresses produced along the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanFingerprint<'a> {
    pub plan: &'a DeploymentPlan,
    pub constants: &'a Constants,
}

impl<'a> PlanFingerprint<'a> {
    pub fn new(plan: &'a DeploymentPlan, constants: &'a Constants) -> Self {
        Self { plan, constants }
    }

    /// SHA-256 of the JSON form, hex encoded.
    pub fn compute_hash(&self) -> String {
        let json = serde_json::to_string(self).expect("PlanFingerprint serialization should never fail");

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Where a failed run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<FailedStep>,
    pub error: String,
}

/// Summary of one run, written after it ends whether it succeeded or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub plan_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sequin_version: String,
    /// Confirmed deployments, in plan order.
    pub results: Vec<DeploymentResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RecordedFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verifications: Vec<VerificationReport>,
}

impl DeploymentRecord {
    /// Record of a run that has just started.
    pub fn new(plan_hash: String, chain_id: Option<u64>) -> Self {
        let now = Utc::now();
        Self {
            plan_hash,
            chain_id,
            started_at: now,
            finished_at: now,
            sequin_version: env!("CARGO_PKG_VERSION").to_string(),
            results: Vec::new(),
            failure: None,
            verifications: Vec::new(),
        }
    }

    /// Fill in the outcome of the run and stamp the end time.
    pub fn finish(mut self, outcome: &std::result::Result<Vec<DeploymentResult>, RunFailure>) -> Self {
        match outcome {
            Ok(results) => self.results = results.clone(),
            Err(failure) => {
                self.results = failure.completed.clone();
                self.failure = Some(RecordedFailure {
                    step: failure.step.clone(),
                    error: failure.error.to_string(),
                });
            }
        }
        self.finished_at = Utc::now();
        self
    }

    pub fn with_verifications(mut self, verifications: Vec<VerificationReport>) -> Self {
        self.verifications = verifications;
        self
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Write the record as pretty JSON, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize deployment record")?;

        std::fs::write(path, json)
            .with_context(|| format!("Failed to write deployment record to {}", path.display()))?;

        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment record does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment record from {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse deployment record JSON")
    }
}
