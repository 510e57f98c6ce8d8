//! One websocket session to one ledger node
//!
//! A session goes `Connecting -> Handshaking -> Ready | Rejected | Errored`
//! and ends `Closed` when a ready session is closed by either side. Once a
//! session is closed its state is frozen.

use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, USER_AGENT};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::message::{
    classify_tx_response, complete_ledgers, correlation_id, is_full_history, server_info_request,
    stream_tx_hash, subscribe_request, tx_request, Answer,
};
use crate::endpoints::{EndpointPool, EndpointStatus};
use crate::types::{StreamEvent, TxRecord};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Ready,
    /// Answered, but without the required ledger history
    Rejected,
    Errored,
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Ready
    }

    pub fn is_closed(self) -> bool {
        matches!(
            self,
            ConnectionState::Rejected | ConnectionState::Errored | ConnectionState::Closed
        )
    }
}

/// Transport failures; logged, never surfaced to callers
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    Request(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("socket error: {0}")]
    Socket(String),
    #[error("closed by remote")]
    Closed,
}

/// Why a lookup on one session produced no answer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("resolved non-open")]
    NotOpen,
    #[error("node unavailable: {0}")]
    Unavailable(String),
    #[error("connection closed")]
    Closed,
}

/// An authoritative answer and the node that gave it
#[derive(Debug, Clone)]
pub struct QueryAnswer {
    pub record: TxRecord,
    pub host: String,
}

pub struct Connection {
    index: usize,
    url: String,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: DashMap<u64, oneshot::Sender<Value>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("index", &self.index)
            .field("url", &self.url)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(index: usize, url: String) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            index,
            url,
            state,
            outbound: Mutex::new(None),
            pending: DashMap::new(),
            reader: Mutex::new(None),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Number of lookups awaiting a correlated response
    pub fn pending_queries(&self) -> usize {
        self.pending.len()
    }

    /// Move to `next` unless the session is already closed
    pub(crate) fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if state.is_closed() || *state == next {
                return false;
            }
            trace!(url = %self.url, from = ?*state, to = ?next, "Connection state");
            *state = next;
            true
        });
    }

    fn send_frame(&self, message: Message) -> bool {
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    fn send_json(&self, value: &Value) -> bool {
        self.send_frame(Message::Text(value.to_string()))
    }

    /// Close the session, ending in `state` (if not already closed)
    pub(crate) fn shutdown(&self, state: ConnectionState) {
        self.set_state(state);
        if let Some(tx) = self.outbound.lock().take() {
            let _ = tx.send(Message::Close(None));
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.pending.clear();
    }

    pub fn close(&self) {
        self.shutdown(ConnectionState::Closed);
    }

    fn dispatch(&self, message: Value, events: &broadcast::Sender<StreamEvent>) {
        if let Some(id) = correlation_id(&message) {
            if let Some((_, waiter)) = self.pending.remove(&id) {
                let _ = waiter.send(message.clone());
            }
        }

        let validated = message.get("validated").and_then(Value::as_bool) == Some(true);
        if validated {
            if let Some(hash) = stream_tx_hash(&message).map(str::to_string) {
                trace!(url = %self.url, hash = %hash, "Validated transaction seen");
                let _ = events.send(StreamEvent {
                    hash,
                    validated,
                    message: Arc::new(message),
                    host: self.url.clone(),
                });
            }
        }
    }

    /// Look up `hash` on this session
    ///
    /// Resolves on the id-correlated response once it is validated (or an
    /// error), or on a validated stream push for the same hash, whichever
    /// comes first.
    pub async fn query(
        &self,
        id: u64,
        hash: &str,
        mut live: broadcast::Receiver<StreamEvent>,
    ) -> Result<QueryAnswer, QueryError> {
        if !self.is_open() {
            return Err(QueryError::NotOpen);
        }

        let (tx, mut response) = oneshot::channel();
        self.pending.insert(id, tx);
        let _pending = scopeguard::guard(id, |id| {
            self.pending.remove(&id);
        });
        let mut state = self.state.subscribe();

        if !self.send_json(&tx_request(id, hash)) {
            return Err(QueryError::Closed);
        }
        debug!(url = %self.url, id, hash = %hash, "Lookup sent");

        let mut awaiting_response = true;
        loop {
            tokio::select! {
                reply = &mut response, if awaiting_response => {
                    awaiting_response = false;
                    let Ok(message) = reply else {
                        return Err(QueryError::Closed);
                    };
                    match classify_tx_response(&message) {
                        Answer::Authoritative(record) => {
                            return Ok(QueryAnswer { record, host: self.url.clone() });
                        }
                        Answer::Unavailable(error) => return Err(QueryError::Unavailable(error)),
                        Answer::Pending => {
                            debug!(url = %self.url, id, "Transaction not validated yet");
                        }
                    }
                }
                event = live.recv() => match event {
                    Ok(event) if event.validated && event.hash.eq_ignore_ascii_case(hash) => {
                        if let Some(record) = TxRecord::from_stream(&event.message) {
                            return Ok(QueryAnswer { record, host: event.host });
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return Err(QueryError::Closed),
                },
                _ = state.wait_for(|s| s.is_closed()) => return Err(QueryError::Closed),
            }
        }
    }
}

fn build_request(
    url: &str,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Request(e.to_string()))?;
    let agent = HeaderValue::from_str(&format!("XrplTxData/{}", env!("CARGO_PKG_VERSION")))
        .map_err(|e| TransportError::Request(e.to_string()))?;
    request.headers_mut().insert(USER_AGENT, agent);
    Ok(request)
}

/// Open the session behind `conn` and validate the node
///
/// Always completes: with `Ready`, or with a closed state after the
/// endpoint has been invalidated.
pub(crate) async fn open(
    conn: Arc<Connection>,
    pool: Arc<EndpointPool>,
    events: broadcast::Sender<StreamEvent>,
    allow_no_full_history: bool,
) -> Arc<Connection> {
    info!(url = %conn.url, index = conn.index, "Connecting");

    let socket = match build_request(&conn.url) {
        Ok(request) => connect_async(request)
            .await
            .map(|(socket, _)| socket)
            .map_err(|e| TransportError::Connect(e.to_string())),
        Err(e) => Err(e),
    };
    let socket = match socket {
        Ok(socket) => socket,
        Err(e) => {
            warn!(url = %conn.url, error = %e, "Connection error");
            pool.invalidate(conn.index, EndpointStatus::Unreachable);
            conn.set_state(ConnectionState::Errored);
            return conn;
        }
    };
    if conn.state().is_closed() {
        return conn;
    }

    conn.set_state(ConnectionState::Handshaking);
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    *conn.outbound.lock() = Some(tx);
    tokio::spawn(write_loop(sink, rx, conn.url.clone()));
    conn.send_json(&server_info_request());

    let ranges = match handshake(&conn, &mut stream).await {
        Ok(ranges) => ranges,
        Err(e) => {
            warn!(url = %conn.url, error = %e, "Connection error during handshake");
            pool.invalidate(conn.index, EndpointStatus::Unreachable);
            conn.shutdown(ConnectionState::Errored);
            return conn;
        }
    };

    if !is_full_history(&ranges) && !allow_no_full_history {
        warn!(url = %conn.url, complete_ledgers = %ranges, "Closed connection, incomplete history");
        pool.invalidate(conn.index, EndpointStatus::InvalidHistory);
        conn.shutdown(ConnectionState::Rejected);
        return conn;
    }

    conn.set_state(ConnectionState::Ready);
    if !conn.is_open() {
        return conn;
    }
    info!(url = %conn.url, complete_ledgers = %ranges, "Ready");
    conn.send_json(&subscribe_request());

    let reader = tokio::spawn(read_loop(conn.clone(), stream, pool, events));
    *conn.reader.lock() = Some(reader);
    conn
}

async fn handshake(
    conn: &Connection,
    stream: &mut SplitStream<Socket>,
) -> Result<String, TransportError> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let Ok(message) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if let Some(ranges) = complete_ledgers(&message) {
                    return Ok(ranges);
                }
            }
            Ok(Message::Ping(data)) => {
                conn.send_frame(Message::Pong(data));
            }
            Ok(Message::Close(_)) => return Err(TransportError::Closed),
            Ok(_) => {}
            Err(e) => return Err(TransportError::Socket(e.to_string())),
        }
    }
    Err(TransportError::Closed)
}

async fn read_loop(
    conn: Arc<Connection>,
    mut stream: SplitStream<Socket>,
    pool: Arc<EndpointPool>,
    events: broadcast::Sender<StreamEvent>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(message) => conn.dispatch(message, &events),
                Err(_) => trace!(url = %conn.url, "Dropping unparsable frame"),
            },
            Ok(Message::Ping(data)) => {
                conn.send_frame(Message::Pong(data));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(url = %conn.url, error = %e, "Connection error");
                pool.invalidate(conn.index, EndpointStatus::Unreachable);
                conn.set_state(ConnectionState::Errored);
                break;
            }
        }
    }

    debug!(url = %conn.url, "Connection closed");
    conn.set_state(ConnectionState::Closed);
    conn.outbound.lock().take();
    conn.pending.clear();
}

async fn write_loop(
    mut sink: SplitSink<Socket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    url: String,
) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!(url = %url, error = %e, "Write failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}
