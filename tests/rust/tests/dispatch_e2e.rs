//! Full dispatch runs against a three-node fleet on loopback

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use anyhow::Result;
use common::Fleet;
use director::{DispatchController, NodeClient, PollPolicy};
use fleet_core::{Error, SearchState, Shutdown};
use seq_shard::parse_fasta;
use wire::Request;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_dispatch() -> Result<()> {
    let fleet = Fleet::start(3).await?;

    let mut controller = DispatchController::from_manifest(&fleet.manifest).await?;
    let outcome = controller.run(&fleet.fasta).await?;

    // The fake search copies each shard to its output, so both pile-ups are
    // the shards concatenated in manifest order.
    let results = std::fs::read_to_string(&outcome.results_path)?;
    let fasta = std::fs::read_to_string(&outcome.fasta_path)?;
    assert_eq!(results, fasta);
    assert_eq!(outcome.results_path, fleet.path("out/quick.txt"));
    assert_eq!(outcome.fasta_path, fleet.path("out/quick.fasta"));

    let headers: Vec<String> = parse_fasta(&fasta)?.into_iter().map(|r| r.header).collect();
    assert_eq!(
        headers,
        vec!["seq0", "seq2", "seq6", "seq4", "seq3", "seq1", "seq5"]
    );

    // Shared storage carries everything the nodes coordinated through.
    assert!(fleet.path("cfg/fleet.toml").exists());
    assert!(fleet.path("staging/sequences.fasta").exists());
    for i in 0..3 {
        assert!(fleet.path(&format!("results/ready{}", i)).exists());
    }
    assert_eq!(std::fs::read_to_string(fleet.path("results/result.fasta"))?, fasta);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_return_results_length_matches_shard_files() -> Result<()> {
    let fleet = Fleet::start(3).await?;
    let mut controller = DispatchController::from_manifest(&fleet.manifest).await?;
    controller.run(&fleet.fasta).await?;

    let config = fleet.config()?;
    let mut expected_results = 0;
    let mut expected_fasta = 0;
    for i in 0..config.node_count() {
        expected_results += std::fs::metadata(config.shard_result_path(i))?.len() as usize;
        expected_fasta += std::fs::metadata(config.shard_path(i))?.len() as usize;
    }

    // Any node can answer: the files live on shared storage.
    let mut client = NodeClient::connect(&fleet.address(2), &config.dispatch.client_config()).await?;
    client
        .expect_ack(&Request::LoadConfig {
            path: config.shared_manifest_path().display().to_string(),
            replicate: false,
        })
        .await?;
    let bundle = client.receive_results().await?;
    client.bye().await?;
    client.close().await;

    assert_eq!(bundle.results.len(), expected_results);
    assert_eq!(bundle.results_fa.len(), expected_fasta);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_search_status_is_local_to_the_launching_node() -> Result<()> {
    let fleet = Fleet::start(2).await?;
    let mut controller = DispatchController::from_manifest(&fleet.manifest).await?;
    controller.run(&fleet.fasta).await?;

    let client_config = fleet.config()?.dispatch.client_config();

    let mut client = NodeClient::connect(&fleet.address(1), &client_config).await?;
    assert_eq!(client.search_status(1).await?.state, SearchState::Succeeded);
    assert_eq!(client.search_status(0).await?.state, SearchState::Unknown);
    client.bye().await?;
    client.close().await;
    Ok(())
}

#[tokio::test]
async fn test_liveness_passes_on_first_attempt() -> Result<()> {
    let fleet = Fleet::start(3).await?;
    let mut controller = DispatchController::from_manifest(&fleet.manifest)
        .await?
        .with_liveness_policy(PollPolicy::liveness());

    // A retry would wait the full 15 second interval.
    let started = Instant::now();
    controller.check_liveness().await?;
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_liveness_waits_for_late_node() -> Result<()> {
    let mut fleet = Fleet::new(2)?;
    fleet.start_node(0).await?;

    let mut controller = DispatchController::from_manifest(&fleet.manifest).await?;
    let liveness = tokio::spawn(async move { controller.check_liveness().await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!liveness.is_finished());

    fleet.start_node(1).await?;
    tokio::time::timeout(Duration::from_secs(5), liveness).await???;
    Ok(())
}

#[tokio::test]
async fn test_readiness_wait_can_be_cancelled() -> Result<()> {
    let fleet = Fleet::start(2).await?;
    let shutdown = Shutdown::new();

    let mut controller = DispatchController::from_manifest(&fleet.manifest)
        .await?
        .with_shutdown(shutdown.subscribe());
    controller.check_liveness().await?;
    controller.provision(&fleet.fasta).await?;

    // Nothing was launched, so the barrier never opens.
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.trigger();
    });

    let err = controller.await_readiness().await.unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }));
    Ok(())
}
