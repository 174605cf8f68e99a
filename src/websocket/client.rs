//! WebSocket client.

use crate::config::{ClientConfig, WebSocketConfig};
use crate::websocket::connection::{read_http_head, Connection, ConnectionHandle, Events};
use crate::websocket::error::{WebSocketError, WebSocketResult};
use crate::websocket::frame::{CloseCode, Message, Role};
use crate::websocket::registry::ConnectionId;
use crate::websocket::session::Event;
use crate::websocket::upgrade::{build_upgrade_request, verify_accept_response};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// An established client connection.
#[derive(Debug)]
pub struct WebSocketClient {
    handle: ConnectionHandle,
    events: Events,
    task: JoinHandle<()>,
}

impl WebSocketClient {
    /// Connect to the server described by `client`.
    ///
    /// Handshake, protocol and limit settings come from `config`.
    ///
    /// # Errors
    ///
    /// Fails on connect or handshake timeout, I/O errors, or a handshake
    /// response that does not verify.
    pub async fn connect(client: &ClientConfig, config: &WebSocketConfig) -> WebSocketResult<Self> {
        let addr = format!("{}:{}", client.address, client.port);
        let stream = tokio::time::timeout(client.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| WebSocketError::Timeout)??;
        stream.set_nodelay(true)?;
        debug!(addr = %addr, "TCP connection established");

        Self::handshake(stream, client, config).await
    }

    /// Run the opening handshake over an already connected stream.
    ///
    /// # Errors
    ///
    /// See [`WebSocketClient::connect`].
    pub async fn handshake<S>(
        mut stream: S,
        client: &ClientConfig,
        config: &WebSocketConfig,
    ) -> WebSocketResult<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (request, key) = build_upgrade_request(&client.host_header(), &client.path);
        stream.write_all(&request).await?;
        stream.flush().await?;

        let (head, leftover) = read_http_head(
            &mut stream,
            config.handshake.max_handshake_size,
            client.handshake_timeout,
        )
        .await?;
        verify_accept_response(&key, &head, &config.handshake.guid)?;

        let id: ConnectionId = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        info!(id = id, path = %client.path, "WebSocket client connected");

        let (mut connection, handle, events) = Connection::new(id, stream, Role::Client, config);
        connection.prime(&leftover);
        let task = connection.spawn();

        Ok(Self {
            handle,
            events,
            task,
        })
    }

    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// A cloneable sending handle.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Send a message.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::ConnectionClosed`] once the connection is gone.
    pub async fn send(&self, message: Message) -> WebSocketResult<()> {
        self.handle.send(message).await
    }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// See [`WebSocketClient::send`].
    pub async fn send_text(&self, text: impl Into<String>) -> WebSocketResult<()> {
        self.handle.send_text(text).await
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// See [`WebSocketClient::send`].
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> WebSocketResult<()> {
        self.handle.send_binary(data).await
    }

    /// Send a ping.
    ///
    /// # Errors
    ///
    /// See [`ConnectionHandle::ping`].
    pub async fn ping(&self, payload: impl Into<Bytes>) -> WebSocketResult<()> {
        self.handle.ping(payload).await
    }

    /// Start the closing handshake.
    ///
    /// # Errors
    ///
    /// See [`ConnectionHandle::close`].
    pub async fn close(&self, code: CloseCode, reason: &str) -> WebSocketResult<()> {
        self.handle.close(code, reason).await
    }

    /// Next event; `None` once the connection task has finished.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Next application message, skipping other events.
    ///
    /// Returns `None` once the connection has ended.
    pub async fn recv(&mut self) -> Option<Message> {
        while let Some(event) = self.events.recv().await {
            match event {
                Event::Message(message) => return Some(message),
                Event::ConnectionEnded { .. } => return None,
                Event::TransportError(e) => debug!(error = %e, "transport error"),
            }
        }
        None
    }

    /// Wait until the connection task has released the transport.
    pub async fn closed(self) {
        let _ = self.task.await;
    }

    /// Split into the sending handle, the event stream and the task.
    pub fn into_parts(self) -> (ConnectionHandle, Events, JoinHandle<()>) {
        (self.handle, self.events, self.task)
    }
}
