//! Node command protocol over real TCP

mod common;

use std::time::Duration;

use anyhow::Result;
use common::Fleet;
use director::{DispatchController, NodeClient};
use fleet_core::{ClientConfig, Error};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use wire::{codec, read_control_reply, ControlReply, Message, Request};

const LIMIT: usize = 1024 * 1024;

fn client_config() -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_secs(1),
        io_timeout: Duration::from_secs(5),
        max_message_size: LIMIT,
    }
}

#[tokio::test]
async fn test_unknown_command_gets_error_and_connection_survives() -> Result<()> {
    let fleet = Fleet::start(1).await?;
    let mut stream = TcpStream::connect(fleet.address(0)).await?;

    let rogue = Message::new("rm_rf", vec!["/".to_string()])?;
    codec::write_frame(&mut stream, &rogue).await?;
    match read_control_reply(&mut stream, LIMIT).await {
        Err(Error::Remote { message }) => assert!(message.contains("rm_rf")),
        other => panic!("expected an error reply, got {:?}", other),
    }

    for _ in 0..3 {
        codec::write_frame(&mut stream, &Request::Ping.to_message()?).await?;
        assert_eq!(read_control_reply(&mut stream, LIMIT).await?, ControlReply::Ack);
    }
    Ok(())
}

#[tokio::test]
async fn test_garbage_frame_closes_only_that_connection() -> Result<()> {
    let fleet = Fleet::start(1).await?;

    let mut bad = TcpStream::connect(fleet.address(0)).await?;
    let body = b"not json at all";
    bad.write_all(&(body.len() as u32).to_be_bytes()).await?;
    bad.write_all(body).await?;
    let next: Option<Message> = codec::try_read_frame(&mut bad, LIMIT).await?;
    assert!(next.is_none());

    let mut client = NodeClient::connect(&fleet.address(0), &client_config()).await?;
    client.expect_ack(&Request::Ping).await?;
    client.bye().await?;
    Ok(())
}

#[tokio::test]
async fn test_commands_before_load_config_are_refused() -> Result<()> {
    let fleet = Fleet::start(1).await?;
    let mut client = NodeClient::connect(&fleet.address(0), &client_config()).await?;

    let err = client.send_command(&Request::IsInstanceReady).await.unwrap_err();
    assert!(matches!(err, Error::Remote { .. }));

    let err = client.receive_results().await.unwrap_err();
    assert!(matches!(err, Error::Remote { .. }));

    // Still usable afterwards.
    client.expect_ack(&Request::Ping).await?;
    Ok(())
}

#[tokio::test]
async fn test_readiness_is_monotonic_until_clean() -> Result<()> {
    let fleet = Fleet::start(3).await?;
    let mut controller = DispatchController::from_manifest(&fleet.manifest).await?;
    controller.check_liveness().await?;
    controller.provision(&fleet.fasta).await?;

    let config = fleet.config()?;
    let mut client = NodeClient::connect(&fleet.address(0), &client_config()).await?;
    client
        .expect_ack(&Request::LoadConfig {
            path: config.shared_manifest_path().display().to_string(),
            replicate: false,
        })
        .await?;

    assert_eq!(client.send_command(&Request::IsInstanceReady).await?, ControlReply::NotReady);

    std::fs::create_dir_all(&config.settings.result_dir)?;
    for i in [2, 0] {
        std::fs::write(config.sentinel_path(i), "")?;
        assert_eq!(client.send_command(&Request::IsInstanceReady).await?, ControlReply::NotReady);
    }

    std::fs::write(config.sentinel_path(1), "")?;
    for _ in 0..3 {
        assert_eq!(client.send_command(&Request::IsInstanceReady).await?, ControlReply::Ack);
    }

    client.expect_ack(&Request::Clean).await?;
    assert_eq!(client.send_command(&Request::IsInstanceReady).await?, ControlReply::NotReady);
    assert!(config.settings.result_dir.is_dir());
    Ok(())
}

#[tokio::test]
async fn test_provision_splits_for_every_node() -> Result<()> {
    let fleet = Fleet::start(3).await?;
    let mut controller = DispatchController::from_manifest(&fleet.manifest).await?;
    controller.check_liveness().await?;
    controller.provision(&fleet.fasta).await?;

    let config = fleet.config()?;
    let mut total = 0;
    for i in 0..3 {
        let shard = std::fs::read_to_string(config.shard_path(i))?;
        total += seq_shard::parse_fasta(&shard)?.len();
    }
    assert_eq!(total, common::SCENARIO_LENGTHS.len());

    // The pushed copies land where the dispatch settings say.
    assert!(fleet.path("incoming/fleet.toml").exists());
    assert!(fleet.path("incoming/sequences.fasta").exists());
    assert!(config.shared_manifest_path().exists());
    Ok(())
}

#[tokio::test]
async fn test_connection_table_tracks_open_connections() -> Result<()> {
    let fleet = Fleet::start(1).await?;
    let state = fleet.states[0].clone().expect("node started");

    let mut client = NodeClient::connect(&fleet.address(0), &client_config()).await?;
    client.expect_ack(&Request::Ping).await?;
    assert_eq!(state.connections().len(), 1);

    client.bye().await?;
    client.close().await;

    tokio::time::timeout(Duration::from_secs(2), async {
        while !state.connections().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}
