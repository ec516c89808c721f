use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::core::{DeviceDescriptor, Error, Result};
use super::schema::AppsrvNwkInfo;

/// Raw coordinator state values reported by the app server
pub mod raw_state {
    pub const INIT_WAITING: u32 = 0;
    pub const STARTING_COORDINATOR: u32 = 1;
    pub const INIT_RESTORING_COORDINATOR: u32 = 2;
    pub const STARTED: u32 = 3;
    pub const RESTORED: u32 = 4;
    pub const JOINING_ALLOWED: u32 = 5;
    pub const JOINING_NOT_ALLOWED: u32 = 6;
}

/// Raw network mode values reported by the app server
pub mod raw_mode {
    pub const BEACON_ENABLED: u32 = 1;
    pub const NON_BEACON: u32 = 2;
    pub const FREQUENCY_HOPPING: u32 = 3;
}

/// Semantic state of the coordinator
///
/// ```text
/// Waiting -> Starting -> Started ------> Open <-> Closed
///                   \-> Restoring -/
/// ```
///
/// Every transition is driven by an inbound message; nothing here is timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkState {
    /// Waiting for user input to start
    Waiting,
    /// Starting a fresh network
    Starting,
    /// Restoring a network from stored state
    Restoring,
    /// Network is up
    Started,
    /// New devices may join
    Open,
    /// New devices may not join
    Closed,
    /// Raw value not recognized
    Unknown,
}

impl NetworkState {
    /// Translates a raw coordinator state; unrecognized values become `Unknown`
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            raw_state::INIT_WAITING => NetworkState::Waiting,
            raw_state::STARTING_COORDINATOR => NetworkState::Starting,
            raw_state::INIT_RESTORING_COORDINATOR => NetworkState::Restoring,
            raw_state::STARTED | raw_state::RESTORED => NetworkState::Started,
            raw_state::JOINING_ALLOWED => NetworkState::Open,
            raw_state::JOINING_NOT_ALLOWED => NetworkState::Closed,
            other => {
                warn!(raw = other, "received unrecognized coordinator state");
                NetworkState::Unknown
            }
        }
    }

    /// Label shown to users
    pub fn label(&self) -> &'static str {
        match self {
            NetworkState::Waiting => "waiting",
            NetworkState::Starting => "starting",
            NetworkState::Restoring => "restoring",
            NetworkState::Started => "started",
            NetworkState::Open => "open",
            NetworkState::Closed => "close",
            NetworkState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// MAC operating mode of the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkMode {
    BeaconEnabled,
    NonBeacon,
    FrequencyHopping,
    Unknown,
}

impl NetworkMode {
    /// Translates a raw network mode; unrecognized values become `Unknown`
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            raw_mode::BEACON_ENABLED => NetworkMode::BeaconEnabled,
            raw_mode::NON_BEACON => NetworkMode::NonBeacon,
            raw_mode::FREQUENCY_HOPPING => NetworkMode::FrequencyHopping,
            _ => NetworkMode::Unknown,
        }
    }

    /// Label shown to users
    pub fn label(&self) -> &'static str {
        match self {
            NetworkMode::BeaconEnabled => "Beacon Enabled",
            NetworkMode::NonBeacon => "Non Beacon",
            NetworkMode::FrequencyHopping => "Freq Hopping",
            NetworkMode::Unknown => "Unknown Mode",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Radio channel assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Channel {
    /// Single fixed channel
    Fixed(u8),
    /// Channel list used while frequency hopping
    Hopping(Vec<u8>),
}

/// Coordinator and network status; one instance per running gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub frequency_hopping_enabled: bool,
    pub channel: Channel,
    pub pan_coordinator: DeviceDescriptor,
    pub security_enabled: bool,
    pub network_mode: NetworkMode,
    pub state: NetworkState,
}

impl NetworkInfo {
    /// Builds the record from a decoded network info payload
    pub fn from_payload(info: &AppsrvNwkInfo) -> Result<Self> {
        let net = info.nwk_info.as_ref().ok_or(Error::MissingField("nwkInfo"))?;
        let coord = net.dev_info.as_ref().ok_or(Error::MissingField("nwkInfo.devInfo"))?;

        let channel = if net.fh {
            Channel::Hopping(net.fh_channels.iter().map(|&c| narrow_channel(c)).collect())
        } else {
            Channel::Fixed(narrow_channel(net.channel))
        };

        Ok(NetworkInfo {
            frequency_hopping_enabled: net.fh,
            channel,
            pan_coordinator: DeviceDescriptor::try_from(coord)?,
            security_enabled: info.security_enabled,
            network_mode: NetworkMode::from_raw(info.network_mode),
            state: NetworkState::from_raw(info.state),
        })
    }

    /// Creates the record on first sync, or overwrites it in place afterwards
    pub fn create_or_update(slot: &mut Option<NetworkInfo>, info: &AppsrvNwkInfo) -> Result<()> {
        let fresh = Self::from_payload(info)?;
        match slot {
            Some(existing) => *existing = fresh,
            None => *slot = Some(fresh),
        }
        Ok(())
    }

    /// Applies a state-change notification; every other field is kept
    pub fn update_state(&mut self, raw: u32) {
        self.state = NetworkState::from_raw(raw);
    }
}

fn narrow_channel(raw: u32) -> u8 {
    u8::try_from(raw).unwrap_or_else(|_| {
        warn!(raw, "channel number out of range");
        u8::MAX
    })
}
