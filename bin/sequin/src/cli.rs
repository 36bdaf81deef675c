use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Chain {
    Localhost,
    Sepolia,
    Mainnet,
}

impl Chain {
    pub fn rpc_url(&self) -> Url {
        let url = match self {
            Chain::Localhost => "http://127.0.0.1:8545",
            Chain::Sepolia => "https://ethereum-sepolia-rpc.publicnode.com",
            Chain::Mainnet => "https://ethereum-mainnet-rpc.publicnode.com",
        };
        Url::parse(url).expect("chain RPC URLs are valid")
    }

    /// Etherscan API endpoint, if the chain has a public explorer.
    pub fn explorer_api_url(&self) -> Option<Url> {
        let url = match self {
            Chain::Localhost => return None,
            Chain::Sepolia => "https://api-sepolia.etherscan.io/api",
            Chain::Mainnet => "https://api.etherscan.io/api",
        };
        Some(Url::parse(url).expect("explorer URLs are valid"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutData {
    TempDir,
    #[strum(default)]
    Path(String),
}

#[derive(Parser)]
#[command(name = "sequin")]
#[command(
    author,
    version,
    about = "Deploy a chain of interdependent contracts, one confirmed step at a time"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SEQUIN_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Sequin.toml file, or a directory containing one.
    ///
    /// Flags below override values from the file.
    #[arg(short, long, env = "SEQUIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Preset chain, choosing the default RPC and explorer endpoints.
    #[arg(long, env = "SEQUIN_CHAIN")]
    pub chain: Option<Chain>,

    /// JSON-RPC endpoint of the node. Takes precedence over `--chain`.
    #[arg(long, alias = "rpc", env = "SEQUIN_RPC_URL")]
    pub rpc_url: Option<Url>,

    /// Unlocked account on the node to deploy from.
    #[arg(long, env = "SEQUIN_FROM")]
    pub from: Option<Address>,

    /// Root of the compiled artifact tree (Hardhat `artifacts/`).
    #[arg(long, env = "SEQUIN_ARTIFACTS")]
    pub artifacts: Option<PathBuf>,

    /// Output directory for the configuration and the deployment record.
    ///
    /// Either a path or `temp-dir`.
    #[arg(long, env = "SEQUIN_OUTDATA")]
    pub outdata: Option<OutData>,

    /// Address of the pre-existing NFT registry the DAO is built against.
    #[arg(long, env = "SEQUIN_REGISTRY")]
    pub registry: Option<String>,

    /// Give up on a deployment if it is not confirmed within this many seconds.
    ///
    /// Unbounded when unset.
    #[arg(long, env = "SEQUIN_CONFIRMATION_TIMEOUT_SECS")]
    pub confirmation_timeout_secs: Option<u64>,

    /// Verify the deployed contracts on the block explorer.
    #[arg(long, env = "SEQUIN_VERIFY")]
    pub verify: bool,

    /// Seconds to wait before verifying, giving the explorer time to index.
    #[arg(long, env = "SEQUIN_VERIFY_DELAY_SECS")]
    pub verify_delay_secs: Option<u64>,

    /// Explorer API endpoint. Defaults to the `--chain` explorer.
    #[arg(long, env = "SEQUIN_EXPLORER_API_URL")]
    pub explorer_api_url: Option<Url>,

    /// Explorer API key.
    #[arg(long, env = "SEQUIN_EXPLORER_API_KEY")]
    pub explorer_api_key: Option<String>,
}
