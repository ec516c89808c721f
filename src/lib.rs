//! LPWAN Gateway: client for a sensor-network app server
//!
//! Connects to the app server over TCP, speaks its framed protobuf protocol,
//! and keeps a live model of the network and its devices. Consumers drive the
//! client through a [`ClientHandle`] and receive changes as [`Event`]s.
pub mod core;
pub mod device;
pub mod network;
pub mod protocol;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Config, DeviceDescriptor, Error, Result};
pub use crate::device::{Device, DeviceRegistry, PollingInterval};
pub use crate::network::{spawn, ClientHandle, ConnectionManager, ConnectionState};
pub use crate::protocol::{Event, NetworkInfo, NetworkMode, NetworkState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
