//! Deployment plan model.
//!
//! A plan is an ordered list of [`DeploymentSpec`]s. A spec may read the
//! confirmed address of any spec before it, never one after it. The order of
//! the list is the execution order; no sorting happens.

use std::{collections::BTreeMap, collections::HashSet, fmt, str::FromStr};

use alloy_core::primitives::{U256, utils::parse_units};
use derive_more::{Deref, From};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{error::PlanError, orchestrator::DeploymentResult};

/// Contract identifier of the marketplace in the standard plan.
pub const MARKETPLACE_CONTRACT: &str = "FakeNFTMarketplace";
/// Contract identifier of the DAO in the standard plan.
pub const DAO_CONTRACT: &str = "CryptoDevsDAO";
/// Name of the constant holding the pre-existing NFT registry address.
pub const NFT_REGISTRY_CONSTANT: &str = "nft_registry";

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// A wei amount.
///
/// Parses from `"<number> <unit>"` (`"1 ether"`, `"250 gwei"`); a bare number
/// is wei. Serialized as a decimal wei string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deref, From)]
pub struct Amount(U256);

impl Amount {
    pub const ZERO: Self = Self(U256::ZERO);

    /// Whole ether.
    pub fn ether(ether: u64) -> Self {
        Self(U256::from(ether) * U256::from(WEI_PER_ETHER))
    }

    pub fn wei(wei: u128) -> Self {
        Self(U256::from(wei))
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An amount string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount `{input}`: {reason}")]
pub struct AmountParseError {
    pub input: String,
    pub reason: String,
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let split = input
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(input.len());
        let (number, unit) = input.split_at(split);
        let (number, unit) = (number.trim(), unit.trim().to_ascii_lowercase());
        let unit = if unit.is_empty() { "wei".to_string() } else { unit };

        if number.is_empty() {
            return Err(AmountParseError {
                input: s.to_string(),
                reason: "missing number".to_string(),
            });
        }
        if number.starts_with('-') {
            return Err(AmountParseError {
                input: s.to_string(),
                reason: "amounts cannot be negative".to_string(),
            });
        }

        let parsed = parse_units(number, unit.as_str()).map_err(|e| AmountParseError {
            input: s.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self(parsed.into()))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Wei(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Repr::Wei(wei) => Ok(Self(U256::from(wei))),
        }
    }
}

/// A single constructor argument.
///
/// In TOML a bare string is a literal; the other forms are inline tables:
/// `{ constant = "nft_registry" }`, `{ address_of = "FakeNFTMarketplace" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[serde(from = "ArgRepr")]
pub enum ConstructorArg {
    /// A literal, coerced to the constructor parameter type at submission.
    Literal(String),
    /// An externally configured constant, looked up by name.
    Constant(String),
    /// The confirmed address of an earlier spec, looked up by label.
    AddressOf(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArgRepr {
    Bare(String),
    Tagged(TaggedArg),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum TaggedArg {
    Literal(String),
    Constant(String),
    AddressOf(String),
}

impl From<ArgRepr> for ConstructorArg {
    fn from(repr: ArgRepr) -> Self {
        match repr {
            ArgRepr::Bare(value) | ArgRepr::Tagged(TaggedArg::Literal(value)) => {
                Self::Literal(value)
            }
            ArgRepr::Tagged(TaggedArg::Constant(name)) => Self::Constant(name),
            ArgRepr::Tagged(TaggedArg::AddressOf(label)) => Self::AddressOf(label),
        }
    }
}

impl ConstructorArg {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn constant(name: impl Into<String>) -> Self {
        Self::Constant(name.into())
    }

    pub fn address_of(label: impl Into<String>) -> Self {
        Self::AddressOf(label.into())
    }
}

/// Externally fixed values consumed as constructor arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref, From)]
#[serde(transparent)]
pub struct Constants(BTreeMap<String, String>);

impl Constants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

/// One contract to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// Contract identifier, as known to the artifact source.
    pub contract: String,
    /// Name other specs use to reference this one. Defaults to `contract`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Ordered constructor arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ConstructorArg>,
    /// Value sent along with the creation transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Amount>,
}

impl DeploymentSpec {
    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            label: None,
            args: Vec::new(),
            value: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn arg(mut self, arg: ConstructorArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn value(mut self, value: Amount) -> Self {
        self.value = Some(value);
        self
    }

    /// The name this spec is referenced by.
    pub fn key(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.contract)
    }

    /// Attached value, zero when unset.
    pub fn value_or_zero(&self) -> Amount {
        self.value.unwrap_or(Amount::ZERO)
    }

    /// Replace constants and backward references with concrete strings.
    ///
    /// `confirmed` holds the results of the deployments before this one.
    pub fn resolve_args(
        &self,
        constants: &Constants,
        confirmed: &[DeploymentResult],
    ) -> Result<Vec<String>, PlanError> {
        self.args
            .iter()
            .map(|arg| match arg {
                ConstructorArg::Literal(value) => Ok(value.clone()),
                ConstructorArg::Constant(name) => {
                    constants
                        .get(name)
                        .cloned()
                        .ok_or_else(|| PlanError::MissingConstant {
                            spec: self.key().to_string(),
                            constant: name.clone(),
                        })
                }
                ConstructorArg::AddressOf(label) => confirmed
                    .iter()
                    .find(|result| &result.label == label)
                    .map(|result| result.address.to_checksum(None))
                    .ok_or_else(|| PlanError::UnknownReference {
                        spec: self.key().to_string(),
                        reference: label.clone(),
                    }),
            })
            .collect()
    }
}

/// An ordered, backward-referencing sequence of deployments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentPlan {
    specs: Vec<DeploymentSpec>,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a spec. It may reference any spec already in the plan.
    pub fn then(mut self, spec: DeploymentSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn specs(&self) -> &[DeploymentSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Check the plan against `constants` without touching the chain.
    pub fn validate(&self, constants: &Constants) -> Result<(), PlanError> {
        if self.specs.is_empty() {
            return Err(PlanError::Empty);
        }

        let all: HashSet<&str> = self.specs.iter().map(DeploymentSpec::key).collect();
        let mut seen: HashSet<&str> = HashSet::new();

        for spec in &self.specs {
            let key = spec.key();
            if seen.contains(key) {
                return Err(PlanError::DuplicateLabel(key.to_string()));
            }

            for arg in &spec.args {
                match arg {
                    ConstructorArg::Literal(_) => {}
                    ConstructorArg::Constant(name) if !constants.contains_key(name) => {
                        return Err(PlanError::MissingConstant {
                            spec: key.to_string(),
                            constant: name.clone(),
                        });
                    }
                    ConstructorArg::Constant(_) => {}
                    ConstructorArg::AddressOf(label) if label == key => {
                        return Err(PlanError::SelfReference {
                            spec: key.to_string(),
                        });
                    }
                    ConstructorArg::AddressOf(label) if seen.contains(label.as_str()) => {}
                    ConstructorArg::AddressOf(label) if all.contains(label.as_str()) => {
                        return Err(PlanError::ForwardReference {
                            spec: key.to_string(),
                            reference: label.clone(),
                        });
                    }
                    ConstructorArg::AddressOf(label) => {
                        return Err(PlanError::UnknownReference {
                            spec: key.to_string(),
                            reference: label.clone(),
                        });
                    }
                }
            }

            seen.insert(key);
        }

        Ok(())
    }

    /// The marketplace then DAO plan.
    ///
    /// The DAO takes the marketplace address and the NFT registry address
    /// (constant [`NFT_REGISTRY_CONSTANT`]) and is funded with 1 ether.
    pub fn marketplace_dao() -> Self {
        Self::new()
            .then(DeploymentSpec::new(MARKETPLACE_CONTRACT))
            .then(
                DeploymentSpec::new(DAO_CONTRACT)
                    .arg(ConstructorArg::address_of(MARKETPLACE_CONTRACT))
                    .arg(ConstructorArg::constant(NFT_REGISTRY_CONSTANT))
                    .value(Amount::ether(1)),
            )
    }
}

impl FromIterator<DeploymentSpec> for DeploymentPlan {
    fn from_iter<I: IntoIterator<Item = DeploymentSpec>>(iter: I) -> Self {
        Self {
            specs: iter.into_iter().collect(),
        }
    }
}
