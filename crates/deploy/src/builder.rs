//! Builder for a [`Deployer`] assembled from command-line input.
//!
//! Starts from a loaded (or default) configuration and applies overrides on
//! top, then prepares the output directory.

use std::path::PathBuf;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use url::Url;

use crate::{Deployer, EtherscanVerifier, plan::NFT_REGISTRY_CONSTANT};

/// Specifies how the output data directory should be created.
#[derive(Debug, Clone)]
pub enum OutDataPath {
    /// A fresh directory under the system temp dir, kept after the run.
    TempDir,
    /// Use a specific path.
    Path(PathBuf),
}

/// Builder for creating a [`Deployer`].
///
/// ```no_run
/// use sequin_deploy::DeployerBuilder;
///
/// # async fn example() -> anyhow::Result<()> {
/// let deployer = DeployerBuilder::new()
///     .rpc_url("http://127.0.0.1:8545".parse()?)
///     .nft_registry("0x0000000000000000000000000000000000000042")
///     .build()?;
/// let record = deployer.deploy().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeployerBuilder {
    base: Deployer,
    rpc_url: Option<Url>,
    from: Option<Address>,
    artifacts_dir: Option<PathBuf>,
    outdata: Option<OutDataPath>,
    nft_registry: Option<String>,
    confirmation_timeout_secs: Option<u64>,
    verify: Option<bool>,
    verify_delay_secs: Option<u64>,
    explorer_api_url: Option<Url>,
    explorer_api_key: Option<String>,
}

impl DeployerBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, typically [`Deployer::load`]ed.
    pub fn from_deployer(base: Deployer) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    pub fn rpc_url(mut self, url: Url) -> Self {
        self.rpc_url = Some(url);
        self
    }

    /// Set the unlocked account transactions are sent from.
    pub fn sender(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn artifacts_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(path.into());
        self
    }

    pub fn outdata(mut self, outdata: OutDataPath) -> Self {
        self.outdata = Some(outdata);
        self
    }

    pub fn outdata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.outdata = Some(OutDataPath::Path(path.into()));
        self
    }

    /// Set the pre-existing NFT registry address the DAO is built against.
    pub fn nft_registry(mut self, address: impl Into<String>) -> Self {
        self.nft_registry = Some(address.into());
        self
    }

    pub fn confirmation_timeout_secs(mut self, secs: u64) -> Self {
        self.confirmation_timeout_secs = Some(secs);
        self
    }

    /// Turn explorer verification on or off.
    pub fn verify(mut self, enabled: bool) -> Self {
        self.verify = Some(enabled);
        self
    }

    pub fn verify_delay_secs(mut self, secs: u64) -> Self {
        self.verify_delay_secs = Some(secs);
        self
    }

    pub fn explorer_api_url(mut self, url: Url) -> Self {
        self.explorer_api_url = Some(url);
        self
    }

    pub fn explorer_api_key(mut self, key: impl Into<String>) -> Self {
        self.explorer_api_key = Some(key.into());
        self
    }

    /// Apply the overrides, check the result, and create the output directory.
    pub fn build(self) -> Result<Deployer> {
        let mut deployer = self.base;

        if let Some(url) = self.rpc_url {
            deployer.network.rpc_url = url;
        }
        if let Some(from) = self.from {
            deployer.network.from = from;
        }
        if let Some(secs) = self.confirmation_timeout_secs {
            deployer.network.confirmation_timeout_secs = Some(secs);
        }
        if let Some(path) = self.artifacts_dir {
            deployer.artifacts_dir = path;
        }
        if let Some(registry) = self.nft_registry {
            deployer.constants.insert(NFT_REGISTRY_CONSTANT, registry);
        }

        let verification = &mut deployer.verification;
        if let Some(enabled) = self.verify {
            verification.enabled = enabled;
        }
        if let Some(secs) = self.verify_delay_secs {
            verification.delay_secs = Some(secs);
        }
        if let Some(url) = self.explorer_api_url {
            verification.api_url = Some(url);
        }
        if let Some(key) = self.explorer_api_key {
            verification.api_key = Some(key);
        }

        deployer
            .plan
            .validate(&deployer.constants)
            .context("Invalid deployment plan")?;

        deployer.network.validate().context("Invalid network configuration")?;

        if deployer.verification.enabled {
            deployer.verification.delay()?;
            EtherscanVerifier::from_config(&deployer.verification)?;
        }

        let outdata_path = match self.outdata {
            None => deployer.outdata.clone(),
            Some(OutDataPath::TempDir) => tempdir::TempDir::new("sequin-")
                .context("Failed to create temporary directory")?
                .into_path(),
            Some(OutDataPath::Path(path)) => path,
        };

        if !outdata_path.try_exists().with_context(|| {
            format!(
                "Failed to check if output data directory exists at path {}. Ensure you provided valid permissions to the directory.",
                outdata_path.display()
            )
        })? {
            std::fs::create_dir_all(&outdata_path).context("Failed to create output data directory")?;
        }

        deployer.outdata = outdata_path
            .canonicalize()
            .context("Failed to canonicalize output data directory path")?;

        tracing::info!(
            rpc_url = %deployer.network.rpc_url,
            from = %deployer.network.from,
            outdata = %deployer.outdata.display(),
            verify = deployer.verification.enabled,
            "Built deployer configuration"
        );

        Ok(deployer)
    }
}
