//! WebSocket client for a [`StoreServer`](crate::server::StoreServer).
//!
//! One writer task drains outgoing frames, one reader task routes replies to
//! the waiting request and pushes to their subscription. When the connection
//! drops, every in-flight request fails with [`RemoteError::Closed`] and every
//! subscription feed ends.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use bingo_core::{CallEntry, EntryKind, Room, RoomCode, RoomId, WordEntry};

use crate::protocol::{expect_row, ClientFrame, Push, Record, Request, Response, Row, ServerFrame};
use crate::remote::{Backend, BackendMode, RemoteCollection, RemoteError, RoomDirectory, Subscription};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a request waits for its reply
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(2),
        }
    }
}

type Reply = oneshot::Sender<Result<Response, RemoteError>>;

/// Delivers one push; returns false once the receiving side is gone.
type Route = Box<dyn Fn(Push) -> bool + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with the reader task.
#[derive(Default)]
struct Routing {
    pending: Mutex<HashMap<u64, Reply>>,
    routes: Mutex<HashMap<u64, Route>>,
    connected: AtomicBool,
}

impl Routing {
    fn dispatch(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Reply { request_id, result } => {
                match lock(&self.pending).remove(&request_id) {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => log::trace!("Reply {request_id} has no waiter"),
                }
            }
            ServerFrame::Push { subscription, push } => {
                let mut routes = lock(&self.routes);
                let delivered = match routes.get(&subscription) {
                    Some(route) => route(push),
                    None => {
                        log::trace!("Push for released subscription {subscription}");
                        true
                    }
                };
                if !delivered {
                    routes.remove(&subscription);
                }
            }
        }
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let failed: Vec<Reply> = lock(&self.pending).drain().map(|(_, reply)| reply).collect();
        for reply in failed {
            let _ = reply.send(Err(RemoteError::Closed));
        }
        lock(&self.routes).clear();
    }
}

struct Shared {
    routing: Arc<Routing>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    next_id: AtomicU64,
    config: ClientConfig,
}

/// Connection to a store server. Clones share the connection, which closes
/// once every clone and every subscription is dropped.
#[derive(Clone)]
pub struct StoreClient {
    shared: Arc<Shared>,
}

impl StoreClient {
    pub async fn connect(url: &str, config: ClientConfig) -> Result<Self, RemoteError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        log::info!("Connected to store at {url}");

        let routing = Arc::new(Routing::default());
        routing.connected.store(true, Ordering::SeqCst);

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            while let Some(bytes) = outgoing_rx.recv().await {
                if let Err(e) = ws_sender.send(Message::Binary(bytes.into())).await {
                    log::warn!("Send failed: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        let reader_routing = routing.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Binary(data)) => match ServerFrame::decode(&data) {
                        Ok(frame) => reader_routing.dispatch(frame),
                        Err(e) => log::warn!("Undecodable frame from server: {e}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Connection error: {e}");
                        break;
                    }
                }
            }
            log::info!("Store connection closed");
            reader_routing.disconnect();
        });

        Ok(Self {
            shared: Arc::new(Shared {
                routing,
                outgoing,
                next_id: AtomicU64::new(1),
                config,
            }),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.shared.routing.connected.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.shared.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, request_id: u64, request: Request) -> Result<(), RemoteError> {
        let bytes = ClientFrame::new(request_id, request).encode()?;
        self.shared.outgoing.send(bytes).map_err(|_| RemoteError::Closed)
    }

    async fn request(&self, request: Request) -> Result<Response, RemoteError> {
        if !self.is_connected() {
            return Err(RemoteError::Closed);
        }
        let request_id = self.next_id();
        let (reply, rx) = oneshot::channel();
        lock(&self.shared.routing.pending).insert(request_id, reply);
        if !self.is_connected() {
            lock(&self.shared.routing.pending).remove(&request_id);
            return Err(RemoteError::Closed);
        }

        if let Err(e) = self.send(request_id, request) {
            lock(&self.shared.routing.pending).remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.shared.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RemoteError::Closed),
            Err(_) => {
                lock(&self.shared.routing.pending).remove(&request_id);
                log::warn!("Request {request_id} timed out");
                Err(RemoteError::Timeout)
            }
        }
    }

    pub async fn ping(&self) -> Result<(), RemoteError> {
        match self.request(Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected("Pong", &other)),
        }
    }

    pub async fn find_room(&self, code: &RoomCode) -> Result<Option<Room>, RemoteError> {
        match self.request(Request::FindRoom { code: code.clone() }).await? {
            Response::Room(room) => Ok(room),
            other => Err(unexpected("Room", &other)),
        }
    }

    pub async fn create_room(&self, code: &RoomCode) -> Result<Room, RemoteError> {
        match self.request(Request::CreateRoom { code: code.clone() }).await? {
            Response::Room(Some(room)) => Ok(room),
            other => Err(unexpected("Room", &other)),
        }
    }

    pub async fn fetch_rows(&self, kind: EntryKind, room_id: RoomId) -> Result<Vec<Row>, RemoteError> {
        match self.request(Request::FetchAll { kind, room_id }).await? {
            Response::Rows(rows) => Ok(rows),
            other => Err(unexpected("Rows", &other)),
        }
    }

    pub async fn insert_row(
        &self,
        kind: EntryKind,
        room_id: RoomId,
        value: String,
    ) -> Result<Row, RemoteError> {
        match self.request(Request::Insert { kind, room_id, value }).await? {
            Response::Inserted(row) => Ok(row),
            other => Err(unexpected("Inserted", &other)),
        }
    }

    pub async fn delete_rows(&self, kind: EntryKind, room_id: RoomId) -> Result<usize, RemoteError> {
        match self.request(Request::DeleteAll { kind, room_id }).await? {
            Response::Deleted(count) => Ok(count),
            other => Err(unexpected("Deleted", &other)),
        }
    }

    /// Subscribe to `T`'s collection in `room_id`. The route is registered
    /// before the request goes out, so no push after the reply is missed.
    pub async fn subscribe<T: Record>(&self, room_id: RoomId) -> Result<Subscription<T>, RemoteError> {
        let subscription = self.next_id();
        let (tx, events) = mpsc::unbounded_channel();
        let route: Route = Box::new(move |push: Push| {
            if push.room_id() != room_id {
                return true;
            }
            match push.into_event::<T>() {
                Some(event) => tx.send(event).is_ok(),
                None => true,
            }
        });
        lock(&self.shared.routing.routes).insert(subscription, route);

        let request = Request::Subscribe {
            subscription,
            kind: T::KIND,
            room_id,
        };
        match self.request(request).await {
            Ok(Response::Subscribed) => {}
            Ok(other) => {
                self.release(subscription);
                return Err(unexpected("Subscribed", &other));
            }
            Err(e) => {
                self.release(subscription);
                return Err(e);
            }
        }

        log::debug!("{}: subscription {subscription} on room {room_id}", T::KIND);
        let client = self.clone();
        Ok(Subscription::new(events, move || client.release(subscription)))
    }

    /// Drop the route and tell the server, without waiting for the reply.
    fn release(&self, subscription: u64) {
        if lock(&self.shared.routing.routes).remove(&subscription).is_none() {
            return;
        }
        if !self.is_connected() {
            return;
        }
        let request_id = self.next_id();
        if let Err(e) = self.send(request_id, Request::Unsubscribe { subscription }) {
            log::debug!("Unsubscribe {subscription} not sent: {e}");
        }
    }

    /// Number of subscriptions this client still routes pushes for.
    pub fn live_subscriptions(&self) -> usize {
        lock(&self.shared.routing.routes).len()
    }

    /// Typed view of one collection.
    pub fn table<T: Record>(&self) -> RemoteTable<T> {
        RemoteTable {
            client: self.clone(),
            _entry: PhantomData,
        }
    }
}

fn unexpected(expected: &str, got: &Response) -> RemoteError {
    RemoteError::Protocol(format!("expected {expected} response, got {}", got.variant_name()))
}

#[async_trait]
impl RoomDirectory for StoreClient {
    async fn find_by_code(&self, code: &RoomCode) -> Result<Option<Room>, RemoteError> {
        self.find_room(code).await
    }

    async fn create(&self, code: &RoomCode) -> Result<Room, RemoteError> {
        self.create_room(code).await
    }
}

/// [`RemoteCollection`] served over a [`StoreClient`].
pub struct RemoteTable<T> {
    client: StoreClient,
    _entry: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Record> RemoteCollection<T> for RemoteTable<T> {
    async fn fetch_all(&self, room: RoomId) -> Result<Vec<T>, RemoteError> {
        self.client
            .fetch_rows(T::KIND, room)
            .await?
            .into_iter()
            .map(expect_row::<T>)
            .collect()
    }

    async fn insert(&self, room: RoomId, value: String) -> Result<T, RemoteError> {
        expect_row(self.client.insert_row(T::KIND, room, value).await?)
    }

    async fn delete_all(&self, room: RoomId) -> Result<(), RemoteError> {
        self.client.delete_rows(T::KIND, room).await.map(|_| ())
    }

    async fn subscribe(&self, room: RoomId) -> Result<Subscription<T>, RemoteError> {
        self.client.subscribe::<T>(room).await
    }
}

impl Backend {
    /// Clients sharing a store server over the network.
    pub fn remote(client: StoreClient) -> Self {
        Backend::new(
            Arc::new(client.clone()),
            Arc::new(client.table::<WordEntry>()),
            Arc::new(client.table::<CallEntry>()),
            BackendMode::Remote,
        )
    }
}
