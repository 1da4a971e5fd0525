//! Integration tests for the WebSocket store.
//!
//! These tests start a real server and connect real clients, verifying the
//! full request / push pipeline and the controller on top of it.

use bingo_core::{EntryKind, RoomCode, RoomId, WordEntry};
use bingo_sync::client::{ClientConfig, StoreClient};
use bingo_sync::controller::{Outcome, RoomSyncController};
use bingo_sync::protocol::Row;
use bingo_sync::remote::{Backend, PushEvent, RemoteCollection, RemoteError, RoomDirectory};
use bingo_sync::server::{ServerConfig, StoreServer};
use bingo_sync::settings::SettingsStore;
use bingo_sync::storage::{KeyValueStore, MemoryStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{timeout, Duration};

/// Start a server on a free port, return it with its URL.
async fn start_test_server() -> (StoreServer, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let server = StoreServer::new(ServerConfig::for_testing());
    let running = server.clone();
    tokio::spawn(async move {
        running.serve(listener).await.unwrap();
    });
    (server, url)
}

async fn connect(url: &str) -> StoreClient {
    StoreClient::connect(url, ClientConfig::for_testing())
        .await
        .expect("client should connect")
}

fn code(s: &str) -> RoomCode {
    RoomCode::parse(s).unwrap()
}

fn player(client: &StoreClient, seed: &str) -> RoomSyncController {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let settings = SettingsStore::new(kv);
    settings.save_seed(seed).unwrap();
    RoomSyncController::new(Backend::remote(client.clone()), settings).unwrap()
}

#[tokio::test]
async fn test_ping() {
    let (server, url) = start_test_server().await;
    let client = connect(&url).await;
    assert!(client.is_connected());
    client.ping().await.unwrap();

    let stats = server.stats().await;
    assert_eq!(stats.total_connections, 1);
    assert!(stats.total_requests >= 1);
}

#[tokio::test]
async fn test_room_resolution() {
    let (_server, url) = start_test_server().await;
    let client = connect(&url).await;
    let lobby = code("lobby");

    assert_eq!(client.find_room(&lobby).await.unwrap(), None);
    let room = client.resolve(&lobby).await.unwrap();
    assert_eq!(client.find_room(&lobby).await.unwrap(), Some(room.clone()));

    // A second client resolves to the same room.
    let other = connect(&url).await;
    assert_eq!(other.resolve(&lobby).await.unwrap(), room);
}

#[tokio::test]
async fn test_insert_unknown_room_rejected() {
    let (_server, url) = start_test_server().await;
    let client = connect(&url).await;

    let result = client
        .insert_row(EntryKind::Word, RoomId::new(), "CAT".into())
        .await;
    assert!(matches!(result, Err(RemoteError::Rejected(_))));
}

#[tokio::test]
async fn test_push_reaches_other_client() {
    let (_server, url) = start_test_server().await;
    let writer = connect(&url).await;
    let reader = connect(&url).await;
    let room = writer.resolve(&code("pushes")).await.unwrap();

    let mut feed = reader.table::<WordEntry>().subscribe(room.id).await.unwrap();
    assert_eq!(reader.live_subscriptions(), 1);

    let inserted = writer
        .table::<WordEntry>()
        .insert(room.id, "CAT".into())
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(2), feed.next()).await.unwrap();
    assert_eq!(event, Some(PushEvent::Insert(inserted.clone())));

    writer.delete_rows(EntryKind::Word, room.id).await.unwrap();
    let event = timeout(Duration::from_secs(2), feed.next()).await.unwrap();
    assert_eq!(event, Some(PushEvent::Delete(inserted.id)));

    feed.unsubscribe();
    assert_eq!(reader.live_subscriptions(), 0);
}

#[tokio::test]
async fn test_subscription_filters_collection() {
    let (_server, url) = start_test_server().await;
    let client = connect(&url).await;
    let room = client.resolve(&code("filters")).await.unwrap();

    let mut words = client.table::<WordEntry>().subscribe(room.id).await.unwrap();
    client
        .insert_row(EntryKind::Call, room.id, "IGNORED".into())
        .await
        .unwrap();
    let row = client
        .insert_row(EntryKind::Word, room.id, "SEEN".into())
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(2), words.next()).await.unwrap();
    match (event, row) {
        (Some(PushEvent::Insert(entry)), Row::Word(expected)) => assert_eq!(entry, expected),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_controllers_share_room_over_network() {
    let (_server, url) = start_test_server().await;
    let alice = player(&connect(&url).await, "Alice");
    let bob = player(&connect(&url).await, "Bob");

    assert_eq!(alice.select_room(code("net")).await, Outcome::Applied);
    assert_eq!(bob.select_room(code("net")).await, Outcome::Applied);

    alice.add_word("CAT").await;
    bob.add_word("DOG").await;
    alice.call_word("DOG").await;

    let synced = timeout(Duration::from_secs(2), async {
        loop {
            let (a, b) = (alice.state().await, bob.state().await);
            if a.pool.len() == 2 && b.pool.len() == 2 && b.is_called("DOG") {
                break (a, b);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    let (a, b) = synced.expect("clients should converge");
    assert_eq!(a.pool, b.pool);
    assert_eq!(a.called, vec!["DOG"]);
    assert_eq!(b.called, vec!["DOG"]);
}

#[tokio::test]
async fn test_request_timeout() {
    // Accepts the handshake and then never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let config = ClientConfig {
        request_timeout: Duration::from_millis(100),
    };
    let client = StoreClient::connect(&url, config).await.unwrap();
    assert_eq!(client.ping().await, Err(RemoteError::Timeout));
}

#[tokio::test]
async fn test_connection_loss_closes_client() {
    // Accepts the handshake and hangs up right away.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);
    });

    let client = connect(&url).await;
    let closed = timeout(Duration::from_secs(2), async {
        while client.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(closed.is_ok(), "client should notice the hang-up");
    assert_eq!(client.ping().await, Err(RemoteError::Closed));
}
