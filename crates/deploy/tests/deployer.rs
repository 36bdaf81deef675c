//! End-to-end tests for [`Deployer::deploy`] against a mocked JSON-RPC node
//! and a Hardhat artifact tree on disk.
//!
//! Run with: cargo test --test deployer

use std::path::Path;

use mockito::{Matcher, Mock, Server};
use sequin_deploy::{
    Amount, Constants, Deployer, DeploymentRecord, DeploymentStatus, JsonRpcChainClientConfig,
    RunFailure, plan::NFT_REGISTRY_CONSTANT,
};
use tempdir::TempDir;

const REGISTRY: &str = "0x0000000000000000000000000000000000000042";
const MARKETPLACE_ADDRESS: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
const DAO_ADDRESS: &str = "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512";
const MARKETPLACE_TX: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
const DAO_TX: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";
const ONE_ETHER_HEX: &str = "0xde0b6b3a7640000";

fn write_artifact(root: &Path, contract: &str, abi: &str) {
    let dir = root.join("contracts").join(format!("{contract}.sol"));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(format!("{contract}.json")),
        format!(
            r#"{{
                "_format": "hh-sol-artifact-1",
                "contractName": "{contract}",
                "sourceName": "contracts/{contract}.sol",
                "abi": {abi},
                "bytecode": "0x6080",
                "deployedBytecode": "0x6080"
            }}"#
        ),
    )
    .unwrap();
}

fn write_artifacts(root: &Path) {
    write_artifact(root, "FakeNFTMarketplace", "[]");
    write_artifact(
        root,
        "CryptoDevsDAO",
        r#"[{ "type": "constructor", "stateMutability": "payable", "inputs": [
            { "name": "_nftMarketplace", "type": "address", "internalType": "address" },
            { "name": "_cryptoDevsNFT", "type": "address", "internalType": "address" }
        ] }]"#,
    );
}

fn rpc_method(method: &str) -> Matcher {
    Matcher::Regex(format!(r#""method":"{method}""#))
}

fn rpc_result(result: &str) -> String {
    format!(r#"{{"jsonrpc":"2.0","id":1,"result":{result}}}"#)
}

fn receipt(status: &str, address: &str) -> String {
    rpc_result(&format!(
        r#"{{"status":"{status}","blockNumber":"0x1","contractAddress":"{address}"}}"#
    ))
}

/// Mocks a node on which both deployments go through. Returns the DAO send
/// mock, which only matches calldata carrying the marketplace address.
async fn mock_node(server: &mut Server, dao_status: &str) -> Mock {
    server
        .mock("POST", "/")
        .match_body(rpc_method("eth_chainId"))
        .with_body(rpc_result(r#""0x7a69""#))
        .create_async()
        .await;
    server
        .mock("POST", "/")
        .match_body(rpc_method("eth_getBalance"))
        .with_body(rpc_result(r#""0x56bc75e2d63100000""#))
        .create_async()
        .await;
    server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            rpc_method("eth_sendTransaction"),
            Matcher::Regex(r#""value":"0x0""#.to_string()),
        ]))
        .with_body(rpc_result(&format!(r#""{MARKETPLACE_TX}""#)))
        .expect(1)
        .create_async()
        .await;
    let dao_send = server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            rpc_method("eth_sendTransaction"),
            Matcher::Regex(format!(r#""value":"{ONE_ETHER_HEX}""#)),
            Matcher::Regex(format!(
                r#""data":"0x6080[0-9a-f]{{24}}{}"#,
                MARKETPLACE_ADDRESS.trim_start_matches("0x")
            )),
        ]))
        .with_body(rpc_result(&format!(r#""{DAO_TX}""#)))
        .expect(1)
        .create_async()
        .await;
    server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            rpc_method("eth_getTransactionReceipt"),
            Matcher::Regex(MARKETPLACE_TX.to_string()),
        ]))
        .with_body(receipt("0x1", MARKETPLACE_ADDRESS))
        .create_async()
        .await;
    server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            rpc_method("eth_getTransactionReceipt"),
            Matcher::Regex(DAO_TX.to_string()),
        ]))
        .with_body(receipt(dao_status, DAO_ADDRESS))
        .create_async()
        .await;

    dao_send
}

fn deployer(server: &Server, temp_dir: &TempDir) -> Deployer {
    let artifacts_dir = temp_dir.path().join("artifacts");
    write_artifacts(&artifacts_dir);

    Deployer {
        artifacts_dir,
        outdata: temp_dir.path().join("out"),
        network: JsonRpcChainClientConfig {
            rpc_url: server.url().parse().unwrap(),
            poll_interval_ms: 1,
            ..Default::default()
        },
        constants: Constants::new().with(NFT_REGISTRY_CONSTANT, REGISTRY),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_deploys_marketplace_then_funded_dao() {
    let mut server = Server::new_async().await;
    let dao_send = mock_node(&mut server, "0x1").await;
    let temp_dir = TempDir::new("sequin-test").expect("Failed to create temp dir");
    let deployer = deployer(&server, &temp_dir);

    let record = deployer.deploy().await.expect("Deployment failed");

    dao_send.assert_async().await;
    assert!(record.is_success());
    assert_eq!(record.chain_id, Some(31337));
    assert_eq!(record.results.len(), 2);

    let (marketplace, dao) = (&record.results[0], &record.results[1]);
    assert_eq!(marketplace.address, MARKETPLACE_ADDRESS.parse::<alloy_core::primitives::Address>().unwrap());
    assert_eq!(dao.address, DAO_ADDRESS.parse::<alloy_core::primitives::Address>().unwrap());
    assert_eq!(dao.args[0], marketplace.address.to_checksum(None));
    assert_eq!(dao.args[1], REGISTRY);
    assert_eq!(dao.value, Amount::ether(1));

    let stored = DeploymentRecord::load_from_file(&deployer.record_path()).unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn test_reverted_dao_keeps_marketplace_in_record() {
    let mut server = Server::new_async().await;
    mock_node(&mut server, "0x0").await;
    let temp_dir = TempDir::new("sequin-test").expect("Failed to create temp dir");
    let deployer = deployer(&server, &temp_dir);

    let err = deployer.deploy().await.unwrap_err();

    let failure = err.downcast_ref::<RunFailure>().expect("error should carry the run failure");
    assert_eq!(failure.completed.len(), 1);
    assert_eq!(
        failure.step.as_ref().map(|step| step.status),
        Some(DeploymentStatus::Reverted)
    );

    let stored = DeploymentRecord::load_from_file(&deployer.record_path()).unwrap();
    assert!(!stored.is_success());
    assert_eq!(stored.results, failure.completed);
    assert_eq!(stored.failure.unwrap().step.unwrap().label, "CryptoDevsDAO");
}
