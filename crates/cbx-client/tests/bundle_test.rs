//! Offline bundles: a worker seals an item for the owner without a session,
//! uploads it in one pass, and the owner reads it back like any other item.

use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use cbx_client::bundle::BundleBuilder;
use cbx_client::item::typed_meta;
use cbx_client::{CbxClient, MemoryStore, RemoteStore, WorkerClient};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Meta {
    title: String,
    source: String,
}

#[tokio::test]
async fn test_bundle_upload_and_owner_read() {
    let store = MemoryStore::new();
    let arc: Arc<dyn RemoteStore> = Arc::new(store.clone());
    let client = CbxClient::new(arc.clone());

    let password = SecretString::from("pw");
    let session = client.account.register("alice", &password).await.unwrap();
    let minted = client.tokens.create_token(&session, "t").await.unwrap();
    let worker = WorkerClient::register(arc, &minted.token, "archiver")
        .await
        .unwrap();

    // The worker only needs the owner's public key to seal a bundle.
    let owner_pk = worker.owner_public_key().await.unwrap();
    assert_eq!(owner_pk, session.public_key);

    let meta = Meta {
        title: "snapshot".into(),
        source: "http://x".into(),
    };
    let mut builder = BundleBuilder::new(&meta, &["archive".to_string()]).unwrap();
    builder.add_file("page.html", b"<html>body</html>".to_vec());
    builder.add_file("notes.txt", b"fetched ok".to_vec());
    let bundle = builder.build(&owner_pk).unwrap();
    assert_eq!(bundle.files.len(), 2);

    let item_id = worker.upload_bundle(bundle).await.unwrap();

    // Owner-side read: normal item decryption path.
    let item = client
        .items
        .get_item(&session, item_id, typed_meta::<Meta>)
        .await
        .unwrap();
    assert_eq!(item.meta, meta);
    assert_eq!(item.tags.len(), 1);
    assert_eq!(item.tags[0].tag, "archive");

    let map = client
        .files
        .get_file_map(&session, item_id, &item.key)
        .await
        .unwrap();
    assert_eq!(map.len(), 2);
    let page = client
        .files
        .get_file_data(&session, item_id, &map["page.html"], &item.key)
        .await
        .unwrap();
    assert_eq!(page, b"<html>body</html>");
    let notes = client
        .files
        .get_file_data(&session, item_id, &map["notes.txt"], &item.key)
        .await
        .unwrap();
    assert_eq!(notes, b"fetched ok");
}

#[tokio::test]
async fn test_worker_direct_item_upload() {
    let store = MemoryStore::new();
    let arc: Arc<dyn RemoteStore> = Arc::new(store.clone());
    let client = CbxClient::new(arc.clone());

    let password = SecretString::from("pw");
    let session = client.account.register("bob", &password).await.unwrap();
    let minted = client.tokens.create_token(&session, "t").await.unwrap();
    let worker = WorkerClient::register(arc, &minted.token, "w").await.unwrap();
    let owner_pk = worker.owner_public_key().await.unwrap();

    let meta = Meta {
        title: "direct".into(),
        source: "http://y".into(),
    };
    let (item_id, key) = worker.create_item(&owner_pk, &meta, &[]).await.unwrap();
    worker
        .upload_file(item_id, "result.bin", &key, b"\x00\x01\x02")
        .await
        .unwrap();

    let item = client
        .items
        .get_item(&session, item_id, typed_meta::<Meta>)
        .await
        .unwrap();
    assert_eq!(item.meta.title, "direct");
    let map = client
        .files
        .get_file_map(&session, item_id, &item.key)
        .await
        .unwrap();
    let data = client
        .files
        .get_file_data(&session, item_id, &map["result.bin"], &item.key)
        .await
        .unwrap();
    assert_eq!(data, b"\x00\x01\x02");
}
