//! WebSocket front end for a shared [`MemoryBackend`].
//!
//! Architecture:
//! ```text
//! Client A ──┐                        ┌── rooms / words / calls
//!            ├── StoreServer ── MemoryBackend
//! Client B ──┘        ▲               └── RoomManager (push per room)
//!                     │                          │
//!                     └──── ServerFrame::Push ◄──┘
//! ```
//!
//! Each connection runs one loop that answers requests in order and
//! interleaves pushes from its subscriptions. A push for an insert is
//! published before the insert's reply is written, but travels through the
//! subscription task, so a writer may see either one first.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::memory::MemoryBackend;
use crate::protocol::{ClientFrame, Push, Request, Response, ServerFrame};
use crate::remote::RemoteError;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Per-room push buffer
    pub broadcast_capacity: usize,
    /// Connections beyond this are closed right after accept
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9191".to_string(),
            broadcast_capacity: 256,
            max_connections: 1024,
        }
    }
}

impl ServerConfig {
    pub fn for_testing() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            broadcast_capacity: 64,
            max_connections: 16,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub rejected_connections: u64,
    pub total_requests: u64,
    pub total_pushes: u64,
}

/// The store server. Clones share the store and statistics.
#[derive(Clone)]
pub struct StoreServer {
    config: ServerConfig,
    store: MemoryBackend,
    stats: Arc<RwLock<ServerStats>>,
}

impl StoreServer {
    pub fn new(config: ServerConfig) -> Self {
        let store = MemoryBackend::new(config.broadcast_capacity);
        Self::with_store(config, store)
    }

    /// Serve an existing store, e.g. one that in-process clients also use.
    pub fn with_store(config: ServerConfig, store: MemoryBackend) -> Self {
        Self {
            config,
            store,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    pub fn store(&self) -> &MemoryBackend {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Bind the configured address and serve until an accept fails.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::info!("Store server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            {
                let mut s = self.stats.write().await;
                if s.active_connections as usize >= self.config.max_connections {
                    s.rejected_connections += 1;
                    log::warn!("Rejecting {addr}: {} connections open", s.active_connections);
                    continue;
                }
                s.total_connections += 1;
                s.active_connections += 1;
            }

            let store = self.store.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, store, stats.clone()).await {
                    log::error!("Connection error from {addr}: {e}");
                }
                stats.write().await.active_connections -= 1;
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        store: MemoryBackend,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        log::info!("WebSocket connection established from {addr}");

        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<ServerFrame>();
        let mut subscriptions: HashMap<u64, JoinHandle<()>> = HashMap::new();

        let result = loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let frame = match ClientFrame::decode(&data) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    log::warn!("Undecodable frame from {addr}: {e}");
                                    continue;
                                }
                            };
                            stats.write().await.total_requests += 1;

                            let result =
                                Self::handle_request(&store, frame.request, &push_tx, &mut subscriptions).await;
                            let reply = match ServerFrame::reply(frame.request_id, result).encode() {
                                Ok(bytes) => bytes,
                                Err(e) => break Err(e.into()),
                            };
                            if let Err(e) = ws_sender.send(Message::Binary(reply.into())).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if let Err(e) = ws_sender.send(Message::Pong(payload)).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Err(e.into()),
                    }
                }
                Some(frame) = push_rx.recv() => {
                    let bytes = match frame.encode() {
                        Ok(bytes) => bytes,
                        Err(e) => break Err(e.into()),
                    };
                    stats.write().await.total_pushes += 1;
                    if let Err(e) = ws_sender.send(Message::Binary(bytes.into())).await {
                        break Err(e.into());
                    }
                }
            }
        };

        for (_, task) in subscriptions.drain() {
            task.abort();
        }
        log::info!("Connection from {addr} closed");
        result
    }

    async fn handle_request(
        store: &MemoryBackend,
        request: Request,
        push_tx: &mpsc::UnboundedSender<ServerFrame>,
        subscriptions: &mut HashMap<u64, JoinHandle<()>>,
    ) -> Result<Response, RemoteError> {
        match request {
            Request::FindRoom { code } => store.find_room(&code).await.map(Response::Room),
            Request::CreateRoom { code } => {
                store.create_room(&code).await.map(|room| Response::Room(Some(room)))
            }
            Request::FetchAll { kind, room_id } => {
                store.fetch_rows(kind, room_id).await.map(Response::Rows)
            }
            Request::Insert {
                kind,
                room_id,
                value,
            } => store.insert_row(kind, room_id, value).await.map(Response::Inserted),
            Request::DeleteAll { kind, room_id } => store
                .delete_rows(kind, room_id)
                .await
                .map(|ids| Response::Deleted(ids.len())),
            Request::Subscribe {
                subscription,
                kind,
                room_id,
            } => {
                let (group, mut rx) = store.watch(room_id).await?;
                let tx = push_tx.clone();
                let task = tokio::spawn(async move {
                    loop {
                        match rx.recv().await {
                            Ok(push) if push.kind() == kind => {
                                let frame = ServerFrame::Push {
                                    subscription,
                                    push: Push::clone(&push),
                                };
                                if tx.send(frame).is_err() {
                                    break;
                                }
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                log::warn!("Subscription {subscription} lagged, {skipped} pushes lost");
                                group.record_dropped(skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
                if let Some(previous) = subscriptions.insert(subscription, task) {
                    previous.abort();
                }
                log::debug!("Subscription {subscription}: {kind} in room {room_id}");
                Ok(Response::Subscribed)
            }
            Request::Unsubscribe { subscription } => {
                if let Some(task) = subscriptions.remove(&subscription) {
                    task.abort();
                }
                Ok(Response::Unsubscribed)
            }
            Request::Ping => Ok(Response::Pong),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9191");
        assert_eq!(config.broadcast_capacity, 256);
    }

    #[tokio::test]
    async fn test_handle_request_roundtrip() {
        let store = MemoryBackend::default();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel();
        let mut subs = HashMap::new();
        let code = bingo_core::RoomCode::parse("srv").unwrap();

        let room = match StoreServer::handle_request(
            &store,
            Request::CreateRoom { code: code.clone() },
            &push_tx,
            &mut subs,
        )
        .await
        {
            Ok(Response::Room(Some(room))) => room,
            other => panic!("unexpected {other:?}"),
        };

        let subscribed = StoreServer::handle_request(
            &store,
            Request::Subscribe {
                subscription: 9,
                kind: bingo_core::EntryKind::Word,
                room_id: room.id,
            },
            &push_tx,
            &mut subs,
        )
        .await;
        assert_eq!(subscribed, Ok(Response::Subscribed));

        let inserted = StoreServer::handle_request(
            &store,
            Request::Insert {
                kind: bingo_core::EntryKind::Word,
                room_id: room.id,
                value: "CAT".into(),
            },
            &push_tx,
            &mut subs,
        )
        .await;
        let row = match inserted {
            Ok(Response::Inserted(row)) => row,
            other => panic!("unexpected {other:?}"),
        };

        match push_rx.recv().await {
            Some(ServerFrame::Push { subscription, push }) => {
                assert_eq!(subscription, 9);
                assert_eq!(push, Push::Insert(row));
            }
            other => panic!("unexpected {other:?}"),
        }

        let pong = StoreServer::handle_request(&store, Request::Ping, &push_tx, &mut subs).await;
        assert_eq!(pong, Ok(Response::Pong));
    }
}
