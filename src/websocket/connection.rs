//! Async driver that runs a [`Session`] over a byte stream.
//!
//! One task per connection owns the stream and the session. The application
//! talks to it through a cloneable [`ConnectionHandle`] and receives
//! [`Event`]s from a bounded channel.

use crate::config::WebSocketConfig;
use crate::websocket::codec::MAX_CONTROL_PAYLOAD;
use crate::websocket::error::{ProtocolViolation, WebSocketError, WebSocketResult};
use crate::websocket::frame::{CloseCode, Message, Role};
use crate::websocket::registry::ConnectionId;
use crate::websocket::session::{Event, Session};
use crate::websocket::upgrade::find_head_end;
use bytes::{Bytes, BytesMut};
use std::future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Initial buffer for reading an HTTP head.
const HEAD_READ_CAPACITY: usize = 4096;

/// Receiving side of a connection's event channel.
pub type Events = mpsc::Receiver<Event>;

/// Requests from the application to the connection task.
#[derive(Debug)]
enum Command {
    Send(Message),
    Ping(Bytes),
    Close { code: CloseCode, reason: String },
}

/// Cloneable handle for sending on a running connection.
///
/// When every handle is dropped the connection closes with 1000.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Command>,
}

impl ConnectionHandle {
    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the connection task has finished.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn command(&self, command: Command) -> WebSocketResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| WebSocketError::ConnectionClosed)
    }

    /// Send a message as a single frame.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::ConnectionClosed`] if the task has finished.
    pub async fn send(&self, message: Message) -> WebSocketResult<()> {
        self.command(Command::Send(message)).await
    }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// See [`ConnectionHandle::send`].
    pub async fn send_text(&self, text: impl Into<String>) -> WebSocketResult<()> {
        self.send(Message::text(text)).await
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// See [`ConnectionHandle::send`].
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> WebSocketResult<()> {
        self.send(Message::binary(data)).await
    }

    /// Send a ping.
    ///
    /// # Errors
    ///
    /// Fails if the payload exceeds 125 bytes or the task has finished.
    pub async fn ping(&self, payload: impl Into<Bytes>) -> WebSocketResult<()> {
        let payload = payload.into();
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::ControlPayloadTooLarge(payload.len()));
        }
        self.command(Command::Ping(payload)).await
    }

    /// Start the closing handshake.
    ///
    /// # Errors
    ///
    /// Fails if the code may not be sent, the reason is too long, or the
    /// task has finished.
    pub async fn close(&self, code: CloseCode, reason: &str) -> WebSocketResult<()> {
        if !code.is_valid() {
            return Err(ProtocolViolation::InvalidCloseCode(code.into()).into());
        }
        if 2 + reason.len() > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::ControlPayloadTooLarge(2 + reason.len()));
        }
        self.command(Command::Close {
            code,
            reason: reason.to_string(),
        })
        .await
    }
}

/// What woke the connection loop.
enum Wake {
    Read(io::Result<usize>),
    Command(Option<Command>),
    EventSlot,
    PingDue,
    CloseTimedOut,
}

/// A running WebSocket connection.
///
/// Events are handed to the owner without waiting on the event channel, so
/// an owner that answers each message through its handle never stalls the
/// task. While an event is waiting for channel capacity the transport is
/// not read, which bounds the backlog to what a single read produced.
#[derive(Debug)]
pub struct Connection<S> {
    id: ConnectionId,
    stream: S,
    session: Session,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<Event>,
    pending: Option<Event>,
    ping_interval: Duration,
    close_timeout: Duration,
    read_buffer_size: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an upgraded stream.
    pub fn new(
        id: ConnectionId,
        stream: S,
        role: Role,
        config: &WebSocketConfig,
    ) -> (Self, ConnectionHandle, Events) {
        let capacity = config.limits.event_buffer.max(1);
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);

        let connection = Self {
            id,
            stream,
            session: Session::new(role, &config.protocol, &config.limits),
            commands: command_rx,
            events: event_tx,
            pending: None,
            ping_interval: config.protocol.ping_interval,
            close_timeout: config.protocol.close_timeout,
            read_buffer_size: config.limits.read_buffer_size.max(1),
        };
        let handle = ConnectionHandle { id, tx: command_tx };
        (connection, handle, event_rx)
    }

    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Mutable access to the underlying stream, for writing before [`run`](Self::run).
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Feed bytes that arrived together with the handshake.
    pub fn prime(&mut self, data: &[u8]) {
        if !data.is_empty() {
            self.session.receive(data);
        }
    }

    /// Run the connection on a new task.
    pub fn spawn(self) -> JoinHandle<()>
    where
        S: Send + 'static,
    {
        tokio::spawn(self.run())
    }

    /// Drive the connection until the transport is released.
    pub async fn run(mut self) {
        let mut buf = vec![0u8; self.read_buffer_size];
        let mut ping_timer = (!self.ping_interval.is_zero()).then(|| {
            let mut timer = time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
        let mut close_deadline: Option<Instant> = None;
        let mut commands_open = true;

        loop {
            if let Err(e) = self.flush().await {
                self.session.transport_error(e);
                break;
            }
            self.forward_ready_events();

            if self.session.should_release_transport() {
                break;
            }
            if self.session.close_sent() && close_deadline.is_none() {
                close_deadline = Some(Instant::now() + self.close_timeout);
            }

            let backlogged = self.pending.is_some();
            let wake = tokio::select! {
                read = self.stream.read(&mut buf), if !backlogged => Wake::Read(read),
                permit = self.events.reserve(), if backlogged => {
                    match (permit, self.pending.take()) {
                        (Ok(permit), Some(event)) => permit.send(event),
                        (Err(_), _) => debug!(id = self.id, "event receiver dropped"),
                        (Ok(_), None) => {},
                    }
                    Wake::EventSlot
                },
                command = self.commands.recv(), if commands_open => Wake::Command(command),
                _ = next_tick(ping_timer.as_mut()) => Wake::PingDue,
                _ = wait_until(close_deadline) => Wake::CloseTimedOut,
            };

            match wake {
                Wake::Read(Ok(0)) => {
                    debug!(id = self.id, "peer closed transport");
                    break;
                },
                Wake::Read(Ok(n)) => self.session.receive(&buf[..n]),
                Wake::Read(Err(e)) => {
                    self.session.transport_error(e);
                    break;
                },
                Wake::EventSlot => {},
                Wake::Command(Some(command)) => self.apply(command),
                Wake::Command(None) => {
                    commands_open = false;
                    if self.session.is_open() {
                        debug!(id = self.id, "all handles dropped, closing");
                        let _ = self.session.close(CloseCode::Normal, "");
                    }
                },
                Wake::PingDue => {
                    if self.session.is_open() {
                        let _ = self.session.ping(Bytes::new());
                    }
                },
                Wake::CloseTimedOut => {
                    debug!(id = self.id, "close handshake timed out");
                    break;
                },
            }
        }

        // Senders blocked on a full command channel fail instead of waiting
        // on a task that no longer reads it.
        self.commands.close();
        if let Err(e) = self.stream.shutdown().await {
            debug!(id = self.id, error = %e, "transport shutdown failed");
        }
        self.session.transport_closed();
        self.drain_events().await;
    }

    fn apply(&mut self, command: Command) {
        let result = match command {
            Command::Send(message) => self.session.send_message(message.kind, message.payload),
            Command::Ping(payload) => self.session.ping(payload),
            Command::Close { code, reason } => self.session.close(code, &reason),
        };
        if let Err(e) = result {
            debug!(id = self.id, error = %e, "command dropped");
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        if let Some(bytes) = self.session.take_outbound() {
            self.stream.write_all(&bytes).await?;
            self.stream.flush().await?;
        }
        Ok(())
    }

    /// Hand over queued events until the channel is full.
    fn forward_ready_events(&mut self) {
        while let Some(event) = self.pending.take().or_else(|| self.session.poll_event()) {
            match self.events.try_send(event) {
                Ok(()) => {},
                Err(TrySendError::Full(event)) => {
                    self.pending = Some(event);
                    break;
                },
                // The owner dropped its receiver; the connection still
                // completes its close handshake.
                Err(TrySendError::Closed(_)) => {},
            }
        }
    }

    /// Deliver every remaining event once the transport is released.
    async fn drain_events(&mut self) {
        while let Some(event) = self.pending.take().or_else(|| self.session.poll_event()) {
            if self.events.send(event).await.is_err() {
                break;
            }
        }
    }
}

async fn next_tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        },
        None => future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// Read an HTTP head from `stream`.
///
/// Returns the head (terminator included) and any bytes read past it.
///
/// # Errors
///
/// Fails on I/O errors, EOF before the head is complete, a head larger
/// than `max_size`, or when `timeout` elapses.
pub async fn read_http_head<S>(
    stream: &mut S,
    max_size: usize,
    timeout: Duration,
) -> WebSocketResult<(Bytes, BytesMut)>
where
    S: AsyncRead + Unpin,
{
    time::timeout(timeout, read_head(stream, max_size))
        .await
        .map_err(|_| WebSocketError::Timeout)?
}

async fn read_head<S>(stream: &mut S, max_size: usize) -> WebSocketResult<(Bytes, BytesMut)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(HEAD_READ_CAPACITY);
    loop {
        if let Some(end) = find_head_end(&buf) {
            if end > max_size {
                return Err(WebSocketError::HeadTooLarge { max: max_size });
            }
            let head = buf.split_to(end).freeze();
            return Ok((head, buf));
        }
        if buf.len() >= max_size {
            return Err(WebSocketError::HeadTooLarge { max: max_size });
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed during handshake",
            )
            .into());
        }
    }
}
