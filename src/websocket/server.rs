//! WebSocket server: listener, opening handshake and connection lifecycle.

use crate::config::{ConfigError, WebSocketConfig};
use crate::websocket::connection::{read_http_head, Connection, ConnectionHandle, Events};
use crate::websocket::error::{Rejection, WebSocketError, WebSocketResult};
use crate::websocket::frame::{CloseCode, Role};
use crate::websocket::registry::{ConnectionId, RegisteredSession, SessionRegistry};
use crate::websocket::upgrade::{build_accept_response, rejection_response, UpgradeRequest};
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A connection that completed the opening handshake.
#[derive(Debug)]
pub struct Accepted {
    /// Connection identifier, also the registry key.
    pub id: ConnectionId,
    /// Remote address.
    pub peer_addr: SocketAddr,
    /// Request path.
    pub path: String,
    /// Handle for sending on the connection.
    pub handle: ConnectionHandle,
    /// Events from the connection.
    pub events: Events,
}

/// Statistics for server operations.
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Total TCP connections accepted.
    connections_total: AtomicU64,
    /// Currently open TCP connections.
    connections_active: AtomicU64,
    /// Total upgrade requests.
    upgrades_total: AtomicU64,
    /// Successful upgrades.
    upgrades_success: AtomicU64,
    /// Rejected or failed upgrades.
    upgrades_failed: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Total TCP connections accepted.
    pub connections_total: u64,
    /// Currently open TCP connections.
    pub connections_active: u64,
    /// Total upgrade requests.
    pub upgrades_total: u64,
    /// Successful upgrades.
    pub upgrades_success: u64,
    /// Rejected or failed upgrades.
    pub upgrades_failed: u64,
}

impl ServerStats {
    fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    fn upgrade_attempt(&self) {
        self.upgrades_total.fetch_add(1, Ordering::Relaxed);
    }

    fn upgrade_success(&self) {
        self.upgrades_success.fetch_add(1, Ordering::Relaxed);
    }

    fn upgrade_failed(&self) {
        self.upgrades_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            upgrades_total: self.upgrades_total.load(Ordering::Relaxed),
            upgrades_success: self.upgrades_success.load(Ordering::Relaxed),
            upgrades_failed: self.upgrades_failed.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the listener and its connection tasks.
#[derive(Clone)]
struct Shared {
    config: Arc<WebSocketConfig>,
    registry: SessionRegistry,
    stats: Arc<ServerStats>,
    next_id: Arc<AtomicU64>,
    accepted: mpsc::Sender<Accepted>,
}

/// WebSocket server.
///
/// Upgraded connections are handed out through [`WebSocketServer::accept`].
/// A connection's task waits until it has been accepted, so the owner must
/// keep calling `accept` while the server runs.
pub struct WebSocketServer {
    config: Arc<WebSocketConfig>,
    registry: SessionRegistry,
    stats: Arc<ServerStats>,
    next_id: Arc<AtomicU64>,
    accepted_tx: Option<mpsc::Sender<Accepted>>,
    accepted_rx: mpsc::Receiver<Accepted>,
    listener: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl WebSocketServer {
    /// Create a stopped server.
    pub fn new(config: WebSocketConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.limits.event_buffer.max(1));
        Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
            stats: Arc::new(ServerStats::default()),
            next_id: Arc::new(AtomicU64::new(1)),
            accepted_tx: Some(tx),
            accepted_rx: rx,
            listener: None,
            local_addr: None,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Live connections.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Server statistics.
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether the listener is running.
    pub fn is_running(&self) -> bool {
        self.listener.is_some()
    }

    /// Bind the configured address and start accepting connections.
    ///
    /// Returns the bound address, which differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Fails if the server is already running, the address is invalid, or
    /// binding fails.
    pub async fn start(&mut self) -> WebSocketResult<SocketAddr> {
        if self.is_running() {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "server already running").into());
        }

        let addr = self.config.server.socket_addr().ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "invalid listen address '{}:{}'",
                self.config.server.address, self.config.server.port
            ))
        })?;

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let accepted = match &self.accepted_tx {
            Some(tx) => tx.clone(),
            None => {
                let (tx, rx) = mpsc::channel(self.config.limits.event_buffer.max(1));
                self.accepted_rx = rx;
                self.accepted_tx = Some(tx.clone());
                tx
            },
        };

        let shared = Shared {
            config: Arc::clone(&self.config),
            registry: self.registry.clone(),
            stats: Arc::clone(&self.stats),
            next_id: Arc::clone(&self.next_id),
            accepted,
        };

        info!(addr = %local_addr, "WebSocket listener started");
        self.listener = Some(tokio::spawn(Self::accept_loop(listener, shared)));
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Wait for the next upgraded connection.
    ///
    /// Returns `None` once the server has been stopped and every pending
    /// handshake has finished.
    pub async fn accept(&mut self) -> Option<Accepted> {
        self.accepted_rx.recv().await
    }

    /// Stop listening and close every session with 1001.
    pub async fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.accepted_tx = None;
        self.local_addr = None;
        self.registry
            .close_all(CloseCode::GoingAway, "server shutting down")
            .await;
        info!("WebSocket server stopped");
    }

    async fn accept_loop(listener: TcpListener, shared: Shared) {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        Self::handle_connection(stream, peer_addr, shared).await;
                    });
                },
                Err(e) => {
                    debug!(error = %e, "Accept error");
                },
            }
        }
    }

    async fn handle_connection(mut stream: TcpStream, peer_addr: SocketAddr, shared: Shared) {
        let Shared {
            config,
            registry,
            stats,
            next_id,
            accepted,
        } = shared;
        stats.connection_opened();
        stats.upgrade_attempt();

        let negotiated = match Self::negotiate(&mut stream, &config).await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                stats.upgrade_failed();
                Self::refuse(&mut stream, peer_addr, e).await;
                stats.connection_closed();
                return;
            },
        };

        let id = next_id.fetch_add(1, Ordering::Relaxed);
        let (mut connection, handle, events) = Connection::new(id, stream, Role::Server, &config);
        let registered = RegisteredSession {
            handle: handle.clone(),
            peer_addr,
            path: negotiated.path.clone(),
            connected_at: Instant::now(),
        };

        if !registry
            .try_insert(id, registered, config.server.max_connections)
            .await
        {
            stats.upgrade_failed();
            let rejection = Rejection::ServiceUnavailable(format!(
                "connection limit of {} reached",
                config.server.max_connections
            ));
            Self::refuse(connection.get_mut(), peer_addr, rejection.into()).await;
            stats.connection_closed();
            return;
        }

        let response = build_accept_response(&negotiated.key, &config.handshake.guid);
        if let Err(e) = connection.get_mut().write_all(&response).await {
            registry.remove(id).await;
            stats.upgrade_failed();
            debug!(addr = %peer_addr, error = %e, "Failed to send upgrade response");
            stats.connection_closed();
            return;
        }

        stats.upgrade_success();
        info!(
            addr = %peer_addr,
            id = id,
            path = %negotiated.path,
            "WebSocket connection established"
        );

        connection.prime(&negotiated.leftover);
        let accepted_connection = Accepted {
            id,
            peer_addr,
            path: negotiated.path,
            handle,
            events,
        };
        if let Err(mpsc::error::SendError(unclaimed)) = accepted.send(accepted_connection).await {
            debug!(addr = %peer_addr, id = id, "Server stopped before accept, closing");
            let _ = unclaimed
                .handle
                .close(CloseCode::GoingAway, "server shutting down")
                .await;
        }
        drop(accepted);

        connection.run().await;

        registry.remove(id).await;
        stats.connection_closed();
        info!(addr = %peer_addr, id = id, "WebSocket connection closed");
    }

    /// Read and validate the upgrade request.
    async fn negotiate(
        stream: &mut TcpStream,
        config: &WebSocketConfig,
    ) -> WebSocketResult<Negotiated> {
        let (head, leftover) = match read_http_head(
            stream,
            config.handshake.max_handshake_size,
            config.server.handshake_timeout,
        )
        .await
        {
            Ok(read) => read,
            Err(WebSocketError::HeadTooLarge { max }) => {
                return Err(
                    Rejection::BadRequest(format!("request head exceeds {max} bytes")).into(),
                );
            },
            Err(e) => return Err(e),
        };

        let request = UpgradeRequest::parse(&head)?;
        let key = request.validate()?;
        let path = request.request_line.target;

        if let Some(prefix) = &config.server.path_prefix {
            if !path.starts_with(prefix.as_str()) {
                return Err(Rejection::Forbidden(path).into());
            }
        }

        Ok(Negotiated {
            path,
            key,
            leftover,
        })
    }

    /// Answer a failed upgrade and release the transport.
    async fn refuse<S>(stream: &mut S, peer_addr: SocketAddr, error: WebSocketError)
    where
        S: AsyncWrite + Unpin,
    {
        match &error {
            WebSocketError::Rejected(rejection) => {
                warn!(
                    addr = %peer_addr,
                    status = rejection.status_code(),
                    error = %rejection,
                    "Upgrade rejected"
                );
                let _ = stream.write_all(&rejection_response(rejection)).await;
            },
            _ => debug!(addr = %peer_addr, error = %error, "Handshake failed"),
        }
        let _ = stream.shutdown().await;
    }
}

/// A validated upgrade request.
struct Negotiated {
    path: String,
    key: String,
    leftover: BytesMut,
}
