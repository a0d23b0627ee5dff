//! Tests for the file-exchange channel

use serde_json::json;
use shared::{ChannelKind, Message, MessageKind, ENV_IPC_FILE};
use std::time::Duration;
use tempfile::TempDir;

use super::common::{sample_command, EMPTY_TIMEOUT, RECEIVE_TIMEOUT};
use crate::channels::FileChannel;
use crate::error::SupervisorError;
use crate::traits::Channel;

fn setup_channel() -> (TempDir, FileChannel) {
    let dir = tempfile::tempdir().unwrap();
    let channel = FileChannel::new(dir.path().join("ipc").join("ipc_worker.json"), "worker", "supervisor")
        .with_poll_interval(Duration::from_millis(10));
    (dir, channel)
}

#[tokio::test]
async fn test_initialize_creates_directory() {
    let (dir, channel) = setup_channel();

    channel.initialize().await.unwrap();
    assert!(dir.path().join("ipc").is_dir());
    assert_eq!(channel.response_path(), dir.path().join("ipc").join("ipc_worker.json.response"));
}

#[tokio::test]
async fn test_send_overwrites_pending_command() {
    let (_dir, channel) = setup_channel();
    channel.initialize().await.unwrap();

    channel.send(&sample_command("worker")).await.unwrap();
    let second = Message::command("supervisor", "worker", "reload", json!(null));
    channel.send(&second).await.unwrap();

    let written = tokio::fs::read_to_string(channel.command_path()).await.unwrap();
    let parsed = Message::from_json(&written).unwrap();
    assert_eq!(parsed.command, "reload");
    assert_eq!(parsed.id, second.id);
}

/// A bare JSON reply is wrapped into a response message and consumed
#[tokio::test]
async fn test_round_trip_with_bare_reply() {
    let (_dir, channel) = setup_channel();
    channel.initialize().await.unwrap();
    channel.send(&sample_command("worker")).await.unwrap();

    tokio::fs::write(channel.response_path(), r#"{"success":true}"#).await.unwrap();

    let reply = channel.receive(RECEIVE_TIMEOUT).await.unwrap().expect("reply expected");
    assert_eq!(reply.kind, MessageKind::Response);
    assert_eq!(reply.source, "worker");
    assert_eq!(reply.target, "supervisor");
    assert_eq!(reply.data["success"], json!(true));
    assert!(!channel.response_path().exists(), "response file must be consumed");
}

#[tokio::test]
async fn test_full_envelope_reply_is_kept() {
    let (_dir, channel) = setup_channel();
    channel.initialize().await.unwrap();

    let request = sample_command("worker");
    let response = Message::response_to(&request, json!({ "load": 3 }));
    tokio::fs::write(channel.response_path(), response.to_json().unwrap()).await.unwrap();

    let received = channel.receive(RECEIVE_TIMEOUT).await.unwrap().unwrap();
    assert_eq!(received, response);
}

#[tokio::test]
async fn test_reply_written_while_waiting() {
    let (_dir, channel) = setup_channel();
    channel.initialize().await.unwrap();

    let response_path = channel.response_path().to_path_buf();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::fs::write(response_path, r#"{"ok":1}"#).await.unwrap();
    });

    let reply = channel.receive(RECEIVE_TIMEOUT).await.unwrap();
    writer.await.unwrap();
    assert_eq!(reply.unwrap().data["ok"], json!(1));
}

#[tokio::test]
async fn test_receive_times_out_empty() {
    let (_dir, channel) = setup_channel();
    channel.initialize().await.unwrap();

    assert!(channel.receive(EMPTY_TIMEOUT).await.unwrap().is_none());

    // An empty response file is still being written by the worker
    tokio::fs::write(channel.response_path(), "").await.unwrap();
    assert!(channel.receive(EMPTY_TIMEOUT).await.unwrap().is_none());
}

#[tokio::test]
async fn test_malformed_reply_is_an_error() {
    let (_dir, channel) = setup_channel();
    channel.initialize().await.unwrap();

    tokio::fs::write(channel.response_path(), "not json").await.unwrap();
    let result = channel.receive(RECEIVE_TIMEOUT).await;
    assert!(matches!(result, Err(SupervisorError::SharedError(_))));
    assert!(!channel.response_path().exists());
}

#[tokio::test]
async fn test_close_is_idempotent_and_final() {
    let (_dir, channel) = setup_channel();
    channel.initialize().await.unwrap();
    channel.send(&sample_command("worker")).await.unwrap();
    tokio::fs::write(channel.response_path(), "{}").await.unwrap();

    channel.close().await;
    channel.close().await;

    assert!(!channel.command_path().exists());
    assert!(!channel.response_path().exists());
    assert!(matches!(
        channel.send(&sample_command("worker")).await,
        Err(SupervisorError::ChannelClosed { kind: ChannelKind::File })
    ));
    assert!(matches!(
        channel.receive(EMPTY_TIMEOUT).await,
        Err(SupervisorError::ChannelClosed { .. })
    ));
}

#[test]
fn test_child_env_points_at_command_file() {
    let (_dir, channel) = setup_channel();
    let env = channel.child_env();

    assert_eq!(env.len(), 1);
    assert_eq!(env[0].0, ENV_IPC_FILE);
    assert!(env[0].1.ends_with("ipc_worker.json"));
    assert!(!channel.wants_stdio());
}
