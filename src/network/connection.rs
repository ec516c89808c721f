use std::fmt;
use std::ops::ControlFlow;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Instant};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::core::{Config, Error, Result};
use crate::protocol::{Dispatcher, Event, Frame, FrameCodec, Request};
use super::{ClientHandle, Command, Query};

type AppServerStream = Framed<TcpStream, FrameCodec>;

/// Lifecycle of the app server connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not running
    Disconnected,
    /// TCP connect in progress
    Connecting,
    /// Socket up, frames flowing
    Connected,
    /// Socket failed; waiting for the reconnect timer
    ReconnectPending,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ReconnectPending => "reconnect-pending",
        };
        f.write_str(label)
    }
}

/// Single-shot reconnect timer
///
/// At most one deadline is pending; arming an armed timer is a no-op.
#[derive(Debug)]
pub struct ReconnectTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl ReconnectTimer {
    pub fn new(delay: Duration) -> Self {
        ReconnectTimer { delay, deadline: None }
    }

    /// Arms the timer; returns `false` if it was already pending
    pub fn arm(&mut self) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Instant::now() + self.delay);
        true
    }

    /// Clears a pending deadline
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves once the pending deadline passes; never resolves when disarmed
    ///
    /// Dropping the future keeps the deadline, so a later call waits for the
    /// same instant.
    pub async fn expired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

enum Flow {
    Reconnect,
    Shutdown,
}

/// Owns the app server socket and all protocol state
///
/// Inbound frames and presentation-layer commands are serialized through one
/// loop, so the dispatcher never sees concurrent mutation.
pub struct ConnectionManager {
    config: Config,
    dispatcher: Dispatcher,
    timer: ReconnectTimer,
    command_rx: mpsc::Receiver<Command>,
    event_tx: broadcast::Sender<Event>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    /// Creates a connection manager and the handle used to talk to it
    pub fn new(config: Config) -> (Self, ClientHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let handle = ClientHandle {
            command_tx,
            event_tx: event_tx.clone(),
            state_rx,
        };
        let manager = ConnectionManager {
            timer: ReconnectTimer::new(config.reconnect_delay),
            config,
            dispatcher: Dispatcher::new(),
            command_rx,
            event_tx,
            state_tx,
        };

        (manager, handle)
    }

    /// Runs until shutdown is requested or every handle is dropped
    ///
    /// Socket failures never end the loop; they start the reconnect sequence.
    pub async fn run(mut self) -> Result<()> {
        info!(peer = %self.config.peer_addr(), "starting app server client");

        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = match self.establish().await {
                ControlFlow::Continue(attempt) => attempt,
                ControlFlow::Break(()) => break,
            };
            match attempt {
                Ok(stream) => {
                    self.timer.cancel();
                    self.set_state(ConnectionState::Connected);
                    match self.serve(stream).await {
                        Ok(Flow::Shutdown) => break,
                        Ok(Flow::Reconnect) => {}
                        Err(e) => warn!(error = %e, "connection to app server lost"),
                    }
                }
                Err(e) => warn!(error = %e, peer = %self.config.peer_addr(), "failed to connect to app server"),
            }

            self.set_state(ConnectionState::ReconnectPending);
            if self.timer.arm() {
                debug!(delay_ms = self.config.reconnect_delay.as_millis() as u64, "reconnect scheduled");
            }
            if let Flow::Shutdown = self.wait_for_reconnect().await {
                break;
            }
        }

        self.timer.cancel();
        self.set_state(ConnectionState::Disconnected);
        info!("app server client stopped");
        Ok(())
    }

    /// Connects while still serving queries and shutdown from the handle
    ///
    /// Breaks when shutdown is requested before the attempt finishes.
    async fn establish(&mut self) -> ControlFlow<(), Result<AppServerStream>> {
        let peer = self.config.peer_addr();
        let limit = self.config.connect_timeout;
        let attempt = time::timeout(limit, connect(peer.clone(), self.config.keepalive));
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => {
                    let result = result.unwrap_or_else(|_| {
                        Err(Error::connection(format!(
                            "connect to {} timed out after {} ms",
                            peer,
                            limit.as_millis()
                        )))
                    });
                    return ControlFlow::Continue(result);
                }
                command = self.command_rx.recv() => {
                    if self.handle_offline(command).is_break() {
                        return ControlFlow::Break(());
                    }
                }
            }
        }
    }

    async fn serve(&mut self, mut stream: AppServerStream) -> Result<Flow> {
        // The peer's network and devices may have changed while we were away.
        self.send(&mut stream, Request::GetNetworkInfo).await?;

        loop {
            tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(frame)) => {
                        if let Some(follow_up) = self.handle_frame(&frame) {
                            self.send(&mut stream, follow_up).await?;
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(Error::connection("app server closed the connection")),
                },
                command = self.command_rx.recv() => match command {
                    Some(Command::Action(action)) => match self.dispatcher.build_request(action) {
                        Ok(request) => self.send(&mut stream, request).await?,
                        Err(e) => warn!(error = %e, ?action, "dropping request"),
                    },
                    Some(Command::Query(query)) => self.answer(query),
                    Some(Command::Shutdown) | None => return Ok(Flow::Shutdown),
                },
            }
        }
    }

    async fn wait_for_reconnect(&mut self) -> Flow {
        loop {
            tokio::select! {
                _ = self.timer.expired() => return Flow::Reconnect,
                command = self.command_rx.recv() => {
                    if self.handle_offline(command).is_break() {
                        return Flow::Shutdown;
                    }
                }
            }
        }
    }

    /// Handles a command while no socket is up; breaks on shutdown
    fn handle_offline(&self, command: Option<Command>) -> ControlFlow<()> {
        match command {
            Some(Command::Action(action)) => {
                warn!(?action, "not connected to app server, dropping request");
            }
            Some(Command::Query(query)) => self.answer(query),
            Some(Command::Shutdown) | None => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn handle_frame(&mut self, frame: &Frame) -> Option<Request> {
        match self.dispatcher.dispatch(frame) {
            Ok(outcome) => {
                if let Some(event) = outcome.event {
                    self.publish(event);
                }
                outcome.follow_up
            }
            Err(e) => {
                warn!(error = %e, command = frame.command, "skipping inbound frame");
                None
            }
        }
    }

    async fn send(&self, stream: &mut AppServerStream, request: Request) -> Result<()> {
        debug!(%request, "sending request");
        match stream.send(request.to_frame()).await {
            Err(e) if !e.is_connection_fatal() => {
                warn!(error = %e, %request, "dropping request");
                Ok(())
            }
            other => other,
        }
    }

    fn answer(&self, query: Query) {
        // A dropped reply receiver means the caller stopped waiting.
        match query {
            Query::NetworkInfo(reply) => {
                let _ = reply.send(self.dispatcher.network_info().cloned());
            }
            Query::Devices(reply) => {
                let _ = reply.send(self.dispatcher.registry().snapshot());
            }
        }
    }

    fn publish(&self, event: Event) {
        if self.event_tx.send(event).is_err() {
            debug!("no event subscribers");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(%state, "connection state");
        self.state_tx.send_replace(state);
    }
}

async fn connect(peer: String, keepalive: Duration) -> Result<AppServerStream> {
    let stream = TcpStream::connect(&peer).await?;
    stream.set_nodelay(true)?;
    let keepalive = TcpKeepalive::new().with_time(keepalive);
    SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;

    info!(%peer, "connected to app server");
    Ok(Framed::new(stream, FrameCodec::new()))
}
