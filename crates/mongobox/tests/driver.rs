//! Against a real mongod. Run with
//! `MONGOBOX_MONGOD_PATH=/path/to/mongod cargo test --features driver -- --ignored`.
#![cfg(feature = "driver")]

use mongobox::{LifecycleState, ReapPolicy, Server, ServerOptions};
use mongodb::bson::{Document, doc};

fn options(root: &std::path::Path) -> ServerOptions {
    ServerOptions::from_env()
        .root_dir(root)
        .reap(ReapPolicy::Orphaned)
}

#[tokio::test]
#[ignore = "needs a mongod binary"]
async fn writes_and_reads_a_document() {
    let root = tempfile::tempdir().unwrap();
    let server = Server::new(options(root.path())).await.unwrap();
    assert_eq!(server.state(), LifecycleState::Active);

    let client = server.client().await.unwrap();
    let coll = client.database("test").collection::<Document>("TestCollection");
    coll.insert_one(doc! { "_id": 12345, "test_value": "Hello world." })
        .await
        .unwrap();

    let found = coll.find_one(doc! { "_id": 12345 }).await.unwrap().unwrap();
    assert_eq!(found.get_str("test_value").unwrap(), "Hello world.");

    let workspace = server.workspace().to_path_buf();
    server.shutdown().await;
    assert!(!workspace.exists());
}

async fn round_trip(server: &Server, value: &str) -> Vec<Document> {
    let coll = server
        .client()
        .await
        .unwrap()
        .database("test")
        .collection::<Document>("TestCollection");
    coll.insert_one(doc! { "_id": 12345, "test_value": value })
        .await
        .unwrap();

    let mut cursor = coll.find(doc! {}).await.unwrap();
    let mut docs = Vec::new();
    while cursor.advance().await.unwrap() {
        docs.push(cursor.deserialize_current().unwrap());
    }
    docs
}

#[tokio::test]
#[ignore = "needs a mongod binary"]
async fn simultaneous_instances_are_isolated() {
    let root = tempfile::tempdir().unwrap();
    let (first, second) = tokio::join!(
        Server::new(options(root.path())),
        Server::new(options(root.path()))
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_ne!(first.port(), second.port());
    assert_ne!(first.workspace(), second.workspace());

    let (seen_first, seen_second) = tokio::join!(
        round_trip(&first, "from first"),
        round_trip(&second, "from second")
    );
    assert_eq!(seen_first.len(), 1);
    assert_eq!(seen_first[0].get_str("test_value").unwrap(), "from first");
    assert_eq!(seen_second.len(), 1);
    assert_eq!(seen_second[0].get_str("test_value").unwrap(), "from second");

    first.shutdown().await;
    second.shutdown().await;
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}
