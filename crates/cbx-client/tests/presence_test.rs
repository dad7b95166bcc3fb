//! Presence is the notification channel's lifetime: connect marks the
//! worker online and publishes its wrapped key; any disconnect marks it
//! offline and withdraws the key.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::mpsc;

use cbx_client::{CbxClient, MemoryStore, RemoteStore, WorkerClient};
use cbx_core::types::WorkerInfo;

#[tokio::test]
async fn test_channel_lifetime_drives_presence() {
    let store = MemoryStore::new();
    let arc: Arc<dyn RemoteStore> = Arc::new(store.clone());
    let client = CbxClient::new(arc.clone());

    let password = SecretString::from("pw");
    let session = client.account.register("alice", &password).await.unwrap();
    let minted = client.tokens.create_token(&session, "t").await.unwrap();
    let worker = WorkerClient::register(arc, &minted.token, "w").await.unwrap();

    // Registered but never connected: offline, no key.
    let workers = client.tasks.query_workers(&session).await.unwrap();
    assert!(matches!(workers[0], WorkerInfo::Offline { .. }));

    let (ping_tx, _ping_rx) = mpsc::unbounded_channel();
    let channel = worker
        .connect(&store, &session.public_key, ping_tx)
        .await
        .unwrap();

    // Online, and the owner can recover the worker's actual public key.
    let workers = client.tasks.query_workers(&session).await.unwrap();
    match &workers[0] {
        WorkerInfo::Online { public_key, .. } => {
            assert_eq!(public_key, worker.public_key());
        }
        other => panic!("expected online worker, got {other:?}"),
    }

    channel.close();
    // Closing aborts the forwarder task; give its drop a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let workers = client.tasks.query_workers(&session).await.unwrap();
    assert!(
        matches!(workers[0], WorkerInfo::Offline { .. }),
        "disconnect must flip the worker offline"
    );
}

#[tokio::test]
async fn test_reconnect_restores_presence() {
    let store = MemoryStore::new();
    let arc: Arc<dyn RemoteStore> = Arc::new(store.clone());
    let client = CbxClient::new(arc.clone());

    let password = SecretString::from("pw");
    let session = client.account.register("bob", &password).await.unwrap();
    let minted = client.tokens.create_token(&session, "t").await.unwrap();
    let worker = WorkerClient::register(arc, &minted.token, "w").await.unwrap();

    for _ in 0..2 {
        let (ping_tx, _ping_rx) = mpsc::unbounded_channel();
        let channel = worker
            .connect(&store, &session.public_key, ping_tx)
            .await
            .unwrap();
        let workers = client.tasks.query_workers(&session).await.unwrap();
        assert!(workers[0].is_online());
        channel.close();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let workers = client.tasks.query_workers(&session).await.unwrap();
    assert!(!workers[0].is_online());
}
