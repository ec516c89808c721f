//! App server connection and client handle
//!
//! A [`ConnectionManager`] task owns the TCP socket and the protocol state.
//! Everything else talks to it through a cloneable [`ClientHandle`].

mod connection;

pub use self::connection::{ConnectionManager, ConnectionState, ReconnectTimer};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::core::{Config, Error, Result};
use crate::device::Device;
use crate::protocol::{Action, Event, NetworkInfo};
use crate::util;

/// Snapshot queries answered from the manager's cache
#[derive(Debug)]
pub enum Query {
    NetworkInfo(oneshot::Sender<Option<NetworkInfo>>),
    Devices(oneshot::Sender<Vec<Device>>),
}

/// Messages accepted by the connection manager
#[derive(Debug)]
pub enum Command {
    /// Build and send a request to the app server
    Action(Action),
    /// Read cached state
    Query(Query),
    /// Stop the manager
    Shutdown,
}

/// Handle for driving the gateway client
#[derive(Clone)]
pub struct ClientHandle {
    command_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<Event>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ClientHandle {
    /// Subscribes to network and device events
    ///
    /// Only events published after the call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Asks the app server for the current network info
    pub async fn request_network_info(&self) -> Result<()> {
        self.act(Action::RequestNetworkInfo).await
    }

    /// Asks the app server for the full device list
    pub async fn request_device_array(&self) -> Result<()> {
        self.act(Action::RequestDeviceArray).await
    }

    /// Opens or closes the network for joining
    pub async fn set_join_permit(&self, open: bool) -> Result<()> {
        self.act(Action::SetJoinPermit { open }).await
    }

    /// Toggles the LED on a known device
    ///
    /// Requests for devices the gateway has not seen are logged and dropped
    /// by the manager.
    pub async fn send_toggle(&self, short_address: u16) -> Result<()> {
        self.act(Action::SendToggle { short_address }).await
    }

    /// Sends new reporting and polling intervals to a known device
    pub async fn send_config(
        &self,
        short_address: u16,
        reporting_interval_ms: u32,
        polling_interval_ms: u32,
    ) -> Result<()> {
        self.act(Action::SendConfig {
            short_address,
            reporting_interval_ms,
            polling_interval_ms,
        })
        .await
    }

    /// Like [`send_toggle`](Self::send_toggle), taking a textual address such as `"0x0001"`
    pub async fn send_toggle_to(&self, address: &str) -> Result<()> {
        let short_address = util::parse_short_address(address)
            .map_err(|e| Error::unknown_device(format!("{}: {}", address, e)))?;
        self.send_toggle(short_address).await
    }

    /// Last network info received from the app server
    pub async fn network_info(&self) -> Result<Option<NetworkInfo>> {
        let (reply, rx) = oneshot::channel();
        self.query(Query::NetworkInfo(reply)).await?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Snapshot of every known device
    pub async fn devices(&self) -> Result<Vec<Device>> {
        let (reply, rx) = oneshot::channel();
        self.query(Query::Devices(reply)).await?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Waits until the connection reaches `state`
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<()> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|current| *current == state)
            .await
            .map_err(|_| Error::ChannelClosed)?;
        Ok(())
    }

    /// Stops the connection manager and closes the socket
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    async fn act(&self, action: Action) -> Result<()> {
        self.command_tx
            .send(Command::Action(action))
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    async fn query(&self, query: Query) -> Result<()> {
        self.command_tx
            .send(Command::Query(query))
            .await
            .map_err(|_| Error::ChannelClosed)
    }
}

/// Spawns a connection manager on the current runtime
pub fn spawn(config: Config) -> (ClientHandle, JoinHandle<Result<()>>) {
    let (manager, handle) = ConnectionManager::new(config);
    let task = tokio::spawn(manager.run());
    (handle, task)
}
