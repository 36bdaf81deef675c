use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    ArtifactStore, EtherscanVerifier, JsonRpcChainClient, JsonRpcChainClientConfig, Orchestrator,
    VerificationConfig,
    plan::{Constants, DeploymentPlan},
    record::{DeploymentRecord, PlanFingerprint, RECORD_FILE_NAME},
    verify,
};

/// The default name for the sequin configuration file.
pub const SEQUIN_CONFIG_FILENAME: &str = "Sequin.toml";

/// Prefix of environment variables overriding the configuration file.
///
/// Nested keys are separated by `__`, e.g. `SEQUIN_NETWORK__RPC_URL`.
pub const ENV_PREFIX: &str = "SEQUIN_";

fn default_plan() -> DeploymentPlan {
    DeploymentPlan::marketplace_dao()
}

/// Everything needed to run a deployment plan, serializable to/from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployer {
    /// Root of the compiled artifact tree.
    pub artifacts_dir: PathBuf,
    /// Where the configuration and the deployment record are written.
    pub outdata: PathBuf,

    /// Node and sender account.
    pub network: JsonRpcChainClientConfig,
    /// Externally fixed constructor argument values.
    #[serde(default)]
    pub constants: Constants,
    /// Specs to deploy, in order.
    #[serde(default = "default_plan", rename = "deployments")]
    pub plan: DeploymentPlan,
    #[serde(default)]
    pub verification: VerificationConfig,
}

impl Default for Deployer {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            outdata: PathBuf::from("deployments"),
            network: JsonRpcChainClientConfig::default(),
            constants: Constants::new(),
            plan: default_plan(),
            verification: VerificationConfig::default(),
        }
    }
}

impl Deployer {
    /// Load the configuration: defaults, then the TOML file (if any), then
    /// `SEQUIN_*` environment variables.
    ///
    /// `path` may point at the file itself or at a directory holding
    /// [`SEQUIN_CONFIG_FILENAME`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("Configuration file or directory not found: {}", path.display());
            }

            let config_path = if path.is_dir() {
                path.join(SEQUIN_CONFIG_FILENAME)
            } else {
                path.to_path_buf()
            };

            figment = figment.merge(Toml::file(&config_path));
            tracing::info!(path = %config_path.display(), "Configuration loaded");
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to parse configuration")
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployer config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Save the configuration next to the deployment record.
    pub fn save_config(&self) -> Result<PathBuf> {
        let config_path = self.outdata.join(SEQUIN_CONFIG_FILENAME);
        self.save_to_file(&config_path)?;
        Ok(config_path)
    }

    pub fn record_path(&self) -> PathBuf {
        self.outdata.join(RECORD_FILE_NAME)
    }

    /// Explorer verifier and pre-verification delay, when verification is on.
    fn verifier(&self) -> Result<Option<(EtherscanVerifier, std::time::Duration)>> {
        if !self.verification.enabled {
            return Ok(None);
        }

        let delay = self.verification.delay()?;
        let verifier = EtherscanVerifier::from_config(&self.verification)?;
        Ok(Some((verifier, delay)))
    }

    /// Run the plan, verify the results if configured, and write the record.
    ///
    /// The record is written whether or not the run succeeds. A failed run is
    /// returned as an error wrapping the [`crate::RunFailure`].
    pub async fn deploy(&self) -> Result<DeploymentRecord> {
        let verifier = self.verifier().context("Invalid verification configuration")?;

        self.plan
            .validate(&self.constants)
            .context("Invalid deployment plan")?;

        let client = JsonRpcChainClient::new(&self.network)?;

        let chain_id = match client.chain_id().await {
            Ok(chain_id) => Some(chain_id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch chain id, it will be missing from the record");
                None
            }
        };

        tracing::info!(
            rpc_url = %self.network.rpc_url,
            from = %self.network.from,
            chain_id = ?chain_id,
            artifacts = %self.artifacts_dir.display(),
            deployments = self.plan.len(),
            "Deploying contracts..."
        );

        let orchestrator = Orchestrator::new(
            ArtifactStore::new(&self.artifacts_dir),
            client,
            self.constants.clone(),
        )
        .with_confirmation_timeout(self.network.confirmation_timeout());

        let plan_hash = PlanFingerprint::new(&self.plan, &self.constants).compute_hash();
        let record = DeploymentRecord::new(plan_hash, chain_id);

        let outcome = orchestrator.run(&self.plan).await;
        let mut record = record.finish(&outcome);

        if let (Ok(results), Some((verifier, delay))) = (&outcome, &verifier) {
            let reports = verify::verify_all(verifier, orchestrator.artifacts(), results, *delay).await;
            record = record.with_verifications(reports);
        }

        let record_path = self.record_path();
        record
            .save_to_file(&record_path)
            .context("Failed to write deployment record")?;
        tracing::info!(path = %record_path.display(), "Deployment record written");

        match outcome {
            Ok(_) => Ok(record),
            Err(failure) => Err(anyhow::Error::new(failure).context(format!(
                "Deployment aborted, partial record written to {}",
                record_path.display()
            ))),
        }
    }
}
