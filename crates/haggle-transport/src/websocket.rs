//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, Transport, TransportError, wait_closed};

/// The client side of a WebSocket, as returned by
/// [`WebSocketConnection::connect`].
pub type ClientConnection = WebSocketConnection<MaybeTlsStream<TcpStream>>;

/// Deadline for a new peer to complete the WebSocket upgrade.
pub const DEFAULT_UPGRADE_TIMEOUT: Duration = Duration::from_secs(10);

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// Upgrades run concurrently, each under a deadline, so a peer that opens
/// a socket and goes quiet never holds up the next accept.
pub struct WebSocketTransport {
    listener: TcpListener,
    upgrades: JoinSet<Option<WebSocketConnection>>,
    upgrade_timeout: Duration,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            upgrades: JoinSet::new(),
            upgrade_timeout: DEFAULT_UPGRADE_TIMEOUT,
        })
    }

    /// Sets how long a new peer has to complete the WebSocket upgrade.
    pub fn with_upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_timeout = timeout;
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

enum Accepted {
    Socket(TcpStream, SocketAddr),
    Upgraded(Option<WebSocketConnection>),
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        loop {
            let accepted = tokio::select! {
                socket = self.listener.accept() => {
                    let (stream, addr) = socket.map_err(TransportError::AcceptFailed)?;
                    Accepted::Socket(stream, addr)
                }
                Some(done) = self.upgrades.join_next(), if !self.upgrades.is_empty() => {
                    Accepted::Upgraded(done.unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "upgrade task failed");
                        None
                    }))
                }
            };

            match accepted {
                Accepted::Socket(stream, addr) => {
                    self.upgrades.spawn(upgrade(stream, addr, self.upgrade_timeout));
                }
                Accepted::Upgraded(Some(conn)) => return Ok(conn),
                Accepted::Upgraded(None) => {}
            }
        }
    }
}

async fn upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    timeout: Duration,
) -> Option<WebSocketConnection> {
    match tokio::time::timeout(timeout, tokio_tungstenite::accept_async(stream)).await {
        Ok(Ok(ws)) => {
            let conn = WebSocketConnection::from_stream(ws);
            tracing::debug!(id = %conn.id, %addr, "accepted WebSocket connection");
            Some(conn)
        }
        Ok(Err(e)) => {
            tracing::debug!(%addr, error = %e, "WebSocket upgrade failed");
            None
        }
        Err(_) => {
            tracing::debug!(%addr, "WebSocket upgrade timed out");
            None
        }
    }
}

/// A single WebSocket connection.
///
/// The socket is split into independently locked halves so an outbound
/// request can be written while the reader is parked on the next frame.
pub struct WebSocketConnection<S = TcpStream> {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    closed: watch::Sender<bool>,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn from_stream(ws: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws.split();
        let (closed, _) = watch::channel(false);
        Self {
            id: ConnectionId::next(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed,
        }
    }
}

impl ClientConnection {
    /// Opens a WebSocket to `url` (`ws://` or `wss://`).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            TransportError::ConnectFailed(format!("{url}: {e}"))
        })?;
        let conn = Self::from_stream(ws);
        tracing::debug!(id = %conn.id, url, "WebSocket connected");
        Ok(conn)
    }
}

impl<S> Connection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::ConnectionClosed(
                "closed locally".into(),
            ));
        }
        // JSON peers expect text frames.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut closed = self.closed.subscribe();
        let mut stream = self.stream.lock().await;
        loop {
            let msg = tokio::select! {
                msg = stream.next() => msg,
                _ = wait_closed(&mut closed) => return Ok(None),
            };
            match msg {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.send_replace(true) {
            return Ok(());
        }
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
