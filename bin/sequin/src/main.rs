//! sequin deploys a chain of interdependent contracts, waiting for each one to
//! be confirmed before the next is submitted.

mod cli;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, OutData};
use sequin_deploy::{Deployer, DeployerBuilder, OutDataPath, RunFailure};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let deployer = build_deployer(cli)?;

    // Save the effective configuration before deploying, so a run can be replayed.
    deployer.save_config()?;

    match deployer.deploy().await {
        Ok(record) => {
            println!("{}", output::results_table(&record.results));
            if !record.verifications.is_empty() {
                println!("{}", output::verification_table(&record.verifications));
            }
            Ok(())
        }
        Err(err) => {
            if let Some(failure) = err.downcast_ref::<RunFailure>() {
                println!("{}", output::failure_table(failure));
            }
            Err(err)
        }
    }
}

fn build_deployer(cli: Cli) -> Result<Deployer> {
    let base = Deployer::load(cli.config.as_deref())?;

    if let Some(config_path) = &cli.config {
        tracing::info!(
            config_path = %config_path.display(),
            outdata_path = %base.outdata.display(),
            deployments = base.plan.len(),
            "Loading deployment from config file..."
        );
    }

    let mut builder = DeployerBuilder::from_deployer(base);

    // The flag can only turn verification on; the config file may already have.
    if cli.verify {
        builder = builder.verify(true);
    }

    if let Some(chain) = cli.chain {
        builder = builder.rpc_url(chain.rpc_url());
        if let Some(url) = chain.explorer_api_url() {
            builder = builder.explorer_api_url(url);
        }
    }

    if let Some(url) = cli.rpc_url {
        builder = builder.rpc_url(url);
    }

    if let Some(from) = cli.from {
        builder = builder.sender(from);
    }

    if let Some(artifacts) = cli.artifacts {
        builder = builder.artifacts_dir(artifacts);
    }

    if let Some(outdata) = cli.outdata {
        let outdata_path = match outdata {
            OutData::TempDir => OutDataPath::TempDir,
            OutData::Path(path) => OutDataPath::Path(PathBuf::from(path)),
        };
        builder = builder.outdata(outdata_path);
    }

    if let Some(registry) = cli.registry {
        builder = builder.nft_registry(registry);
    }

    if let Some(secs) = cli.confirmation_timeout_secs {
        builder = builder.confirmation_timeout_secs(secs);
    }

    if let Some(secs) = cli.verify_delay_secs {
        builder = builder.verify_delay_secs(secs);
    }

    if let Some(url) = cli.explorer_api_url {
        builder = builder.explorer_api_url(url);
    }

    if let Some(key) = cli.explorer_api_key {
        builder = builder.explorer_api_key(key);
    }

    builder.build()
}
