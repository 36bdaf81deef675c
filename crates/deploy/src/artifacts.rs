//! Compiled contract artifacts.
//!
//! The compiler toolchain is external: this module only reads what it left on
//! disk. [`ArtifactStore`] understands the Hardhat layout:
//!
//! ```text
//! artifacts/
//!   build-info/<hash>.json
//!   contracts/FakeNFTMarketplace.sol/FakeNFTMarketplace.json
//!   contracts/FakeNFTMarketplace.sol/FakeNFTMarketplace.dbg.json
//! ```

use std::path::{Path, PathBuf};

use alloy_core::{
    dyn_abi::{DynSolValue, Specifier},
    json_abi::{JsonAbi, StateMutability},
    primitives::{Bytes, U256},
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{DeployError, SubmissionError};

/// Anything that can turn a contract identifier into a deployable factory.
pub trait ArtifactSource: Send + Sync {
    /// Look up the compiled template for `contract`.
    fn resolve(&self, contract: &str) -> Result<ContractFactory, DeployError>;
}

/// What an explorer needs to reproduce the compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationMetadata {
    /// Source path as seen by the compiler, e.g. `contracts/CryptoDevsDAO.sol`.
    pub source_name: String,
    /// Full compiler version, e.g. `0.8.17+commit.8df45f5f`.
    pub compiler_version: String,
    /// Standard JSON input handed to solc.
    pub standard_json_input: Value,
}

impl VerificationMetadata {
    /// Fully qualified name, `<source>:<contract>`.
    pub fn qualified_name(&self, contract: &str) -> String {
        format!("{}:{}", self.source_name, contract)
    }
}

/// A deployable contract template.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractFactory {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
    pub metadata: Option<VerificationMetadata>,
}

impl ContractFactory {
    pub fn new(name: impl Into<String>, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self {
            name: name.into(),
            abi,
            bytecode,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: VerificationMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether the constructor accepts a value transfer.
    pub fn is_payable(&self) -> bool {
        self.abi
            .constructor()
            .is_some_and(|c| c.state_mutability == StateMutability::Payable)
    }

    /// ABI-encode `args` against the constructor parameters.
    ///
    /// Each argument is coerced from its string form to the declared type.
    pub fn encode_constructor(&self, args: &[String]) -> Result<Bytes, SubmissionError> {
        let inputs = self
            .abi
            .constructor()
            .map(|c| c.inputs.as_slice())
            .unwrap_or_default();

        if inputs.len() != args.len() {
            return Err(SubmissionError::ArityMismatch {
                contract: self.name.clone(),
                expected: inputs.len(),
                got: args.len(),
            });
        }

        if inputs.is_empty() {
            return Ok(Bytes::new());
        }

        let values = inputs
            .iter()
            .zip(args)
            .enumerate()
            .map(|(index, (param, value))| {
                let invalid = |reason: String| SubmissionError::InvalidArgument {
                    contract: self.name.clone(),
                    index,
                    ty: param.ty.clone(),
                    value: value.clone(),
                    reason,
                };
                let ty = param.resolve().map_err(|e| invalid(e.to_string()))?;
                ty.coerce_str(value).map_err(|e| invalid(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DynSolValue::Tuple(values).abi_encode_params().into())
    }

    /// Creation calldata: bytecode followed by the encoded constructor args.
    pub fn deploy_data(&self, args: &[String], value: U256) -> Result<Bytes, SubmissionError> {
        if !value.is_zero() && !self.is_payable() {
            return Err(SubmissionError::NonPayable {
                contract: self.name.clone(),
                value,
            });
        }

        let encoded = self.encode_constructor(args)?;
        let mut data = Vec::with_capacity(self.bytecode.len() + encoded.len());
        data.extend_from_slice(&self.bytecode);
        data.extend_from_slice(&encoded);
        Ok(data.into())
    }
}

/// Hardhat contract artifact, reduced to what deployment needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    contract_name: String,
    source_name: Option<String>,
    abi: JsonAbi,
    bytecode: Bytes,
}

/// Hardhat debug file pointing at the build info.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    solc_long_version: String,
    input: Value,
}

/// Reads factories from a Hardhat `artifacts/` directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every `<contract>.json` below the root, ignoring build info, sorted.
    fn find_artifacts(&self, contract: &str) -> std::io::Result<Vec<PathBuf>> {
        let file_name = format!("{contract}.json");
        let mut pending = vec![self.root.clone()];
        let mut found = Vec::new();

        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    if path.file_name().is_some_and(|n| n != "build-info") {
                        pending.push(path);
                    }
                } else if path.file_name().is_some_and(|n| n == file_name.as_str()) {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    /// Path of the artifact for `contract`.
    ///
    /// A bare name must match exactly one artifact in the tree. A fully
    /// qualified `<source>:<name>` identifier, e.g.
    /// `contracts/mocks/Token.sol:Token`, points at one directly.
    fn locate(&self, contract: &str) -> Result<PathBuf, DeployError> {
        let invalid = |reason: String| DeployError::InvalidArtifact {
            contract: contract.to_string(),
            reason,
        };

        if let Some((source, name)) = contract.rsplit_once(':') {
            let path = self.root.join(source).join(format!("{name}.json"));
            return match path.try_exists() {
                Ok(true) => Ok(path),
                Ok(false) => Err(DeployError::UnknownContract(contract.to_string())),
                Err(e) => Err(invalid(format!("cannot read {}: {e}", path.display()))),
            };
        }

        let mut matches = self
            .find_artifacts(contract)
            .map_err(|e| invalid(format!("cannot scan {}: {e}", self.root.display())))?;

        match matches.len() {
            0 => Err(DeployError::UnknownContract(contract.to_string())),
            1 => Ok(matches.remove(0)),
            _ => {
                let paths = matches
                    .iter()
                    .map(|p| p.strip_prefix(&self.root).unwrap_or(p).display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(invalid(format!(
                    "ambiguous name, {} artifacts match ({paths}); use a fully qualified `<source>:{contract}` identifier",
                    matches.len()
                )))
            }
        }
    }

    fn load_metadata(artifact_path: &Path, source_name: &str) -> anyhow::Result<VerificationMetadata> {
        use anyhow::Context;

        let dbg_path = artifact_path.with_extension("dbg.json");
        let dbg: DebugFile = serde_json::from_str(
            &std::fs::read_to_string(&dbg_path)
                .with_context(|| format!("Failed to read {}", dbg_path.display()))?,
        )
        .context("Failed to parse debug file")?;

        let build_info_path = artifact_path
            .parent()
            .context("Artifact path has no parent directory")?
            .join(dbg.build_info);
        let build_info: BuildInfo = serde_json::from_str(
            &std::fs::read_to_string(&build_info_path)
                .with_context(|| format!("Failed to read {}", build_info_path.display()))?,
        )
        .context("Failed to parse build info")?;

        Ok(VerificationMetadata {
            source_name: source_name.to_string(),
            compiler_version: build_info.solc_long_version,
            standard_json_input: build_info.input,
        })
    }
}

impl ArtifactSource for ArtifactStore {
    fn resolve(&self, contract: &str) -> Result<ContractFactory, DeployError> {
        let invalid = |reason: String| DeployError::InvalidArtifact {
            contract: contract.to_string(),
            reason,
        };

        let path = self.locate(contract)?;

        let content = std::fs::read_to_string(&path)
            .map_err(|e| invalid(format!("cannot read {}: {e}", path.display())))?;
        let artifact: HardhatArtifact =
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;

        if artifact.bytecode.is_empty() {
            return Err(invalid(format!(
                "`{}` has no creation bytecode (abstract contract or interface?)",
                artifact.contract_name
            )));
        }

        let mut factory = ContractFactory::new(artifact.contract_name, artifact.abi, artifact.bytecode);

        if let Some(source_name) = artifact.source_name {
            match Self::load_metadata(&path, &source_name) {
                Ok(metadata) => factory = factory.with_metadata(metadata),
                Err(e) => {
                    tracing::debug!(contract, error = %e, "No verification metadata for artifact");
                }
            }
        }

        tracing::debug!(contract, path = %path.display(), "Resolved contract artifact");
        Ok(factory)
    }
}
