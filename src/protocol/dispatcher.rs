use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::{DeviceDescriptor, Error, Result};
use crate::device::{CapabilityInfo, Device, DeviceRegistry};
use crate::util::{format_ext_address, format_short_address};
use super::codec::Frame;
use super::message::{join_permit_duration, narrow_u16, Inbound, Request};
use super::schema::{
    addr_mode, DeviceDataRxInd, GetDeviceArrayCnf, GetNwkInfoCnf, MacCapabilityInfo,
    MacDeviceDescriptor, NWK_INFO_STATUS_STARTED,
};
use super::state::NetworkInfo;

/// Semantic update delivered to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    /// Network record was created or changed
    NetworkUpdated(NetworkInfo),
    /// Device list changed; carries the whole list
    DeviceListUpdated(Vec<Device>),
    /// The app server answered a join permit request
    JoinPermitConfirmed { status: u32 },
}

/// Presentation-layer requests that become wire requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RequestNetworkInfo,
    RequestDeviceArray,
    SetJoinPermit { open: bool },
    SendToggle { short_address: u16 },
    SendConfig {
        short_address: u16,
        reporting_interval_ms: u32,
        polling_interval_ms: u32,
    },
}

/// Result of applying one inbound message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Event to publish, if the message changed anything visible
    pub event: Option<Event>,
    /// Request the client must send next
    pub follow_up: Option<Request>,
}

impl Outcome {
    fn none() -> Self {
        Outcome::default()
    }

    fn event(event: Event) -> Self {
        Outcome {
            event: Some(event),
            follow_up: None,
        }
    }
}

/// Decodes inbound frames and applies them to the network and device state
///
/// Owns the only copy of that state; the connection task is its sole caller.
#[derive(Debug, Default)]
pub struct Dispatcher {
    registry: DeviceRegistry,
    network: Option<NetworkInfo>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    pub fn network_info(&self) -> Option<&NetworkInfo> {
        self.network.as_ref()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Decodes `frame` and applies it
    pub fn dispatch(&mut self, frame: &Frame) -> Result<Outcome> {
        let message = Inbound::decode(frame)?;
        debug!(command = %message.command_id(), len = frame.payload.len(), "dispatching frame");
        self.apply(message)
    }

    /// Applies an already decoded message
    pub fn apply(&mut self, message: Inbound) -> Result<Outcome> {
        match message {
            Inbound::NetworkInfoConfirm(cnf) => self.on_network_info_confirm(cnf),
            Inbound::DeviceArrayConfirm(cnf) => self.on_device_array(cnf),
            Inbound::NetworkInfoIndication(ind) => {
                let info = ind.nwkinfo.as_ref().ok_or(Error::MissingField("nwkinfo"))?;
                NetworkInfo::create_or_update(&mut self.network, info)?;
                Ok(self.network_event())
            }
            Inbound::DeviceJoinedIndication(ind) => {
                let device = device_from_parts(ind.dev_descriptor.as_ref(), ind.dev_cap_info.as_ref())?;
                info!(
                    device = %format_ext_address(device.ext_address),
                    short = %format_short_address(device.short_address),
                    "device joined"
                );
                self.registry.upsert_by_ext_address(device);
                Ok(self.device_list_event())
            }
            Inbound::DeviceNotActiveIndication(ind) => {
                let desc = ind.dev_descriptor.as_ref().ok_or(Error::MissingField("devDescriptor"))?;
                let short = narrow_u16("devDescriptor.shortAddress", desc.short_address)?;
                if !self.registry.mark_inactive_by_short_address(short) {
                    return Err(Error::unknown_device(format!(
                        "inactive notice for {}",
                        format_short_address(short)
                    )));
                }
                info!(short = %format_short_address(short), timeout = ind.timeout, "device not active");
                Ok(self.device_list_event())
            }
            Inbound::DeviceDataRxIndication(ind) => self.on_device_data(ind),
            Inbound::CollectorStateChangeIndication(ind) => {
                let network = self
                    .network
                    .as_mut()
                    .ok_or_else(|| Error::invalid_state("coordinator state change before network info"))?;
                network.update_state(ind.state);
                info!(state = %network.state, "coordinator state changed");
                Ok(self.network_event())
            }
            Inbound::SetJoinPermitConfirm(cnf) => {
                Ok(Outcome::event(Event::JoinPermitConfirmed { status: cnf.status }))
            }
            Inbound::TxDataConfirm(cnf) => {
                debug!(status = cnf.status, "tx data confirmed");
                Ok(Outcome::none())
            }
        }
    }

    /// Turns a presentation-layer action into a wire request
    ///
    /// Device-targeted actions are resolved against the registry; the PAN id
    /// comes from the network record.
    pub fn build_request(&self, action: Action) -> Result<Request> {
        match action {
            Action::RequestNetworkInfo => Ok(Request::GetNetworkInfo),
            Action::RequestDeviceArray => Ok(Request::GetDeviceArray),
            Action::SetJoinPermit { open } => Ok(Request::SetJoinPermit {
                duration: join_permit_duration(open),
            }),
            Action::SendToggle { short_address } => Ok(Request::SendToggle {
                target: self.resolve_target(short_address)?,
            }),
            Action::SendConfig {
                short_address,
                reporting_interval_ms,
                polling_interval_ms,
            } => Ok(Request::SendConfig {
                target: self.resolve_target(short_address)?,
                reporting_interval_ms,
                polling_interval_ms,
            }),
        }
    }

    fn resolve_target(&self, short_address: u16) -> Result<DeviceDescriptor> {
        let device = self.registry.find_by_short_address(short_address).ok_or_else(|| {
            Error::unknown_device(format!("no device at {}", format_short_address(short_address)))
        })?;
        let network = self
            .network
            .as_ref()
            .ok_or_else(|| Error::invalid_state("network info not synced yet"))?;

        Ok(DeviceDescriptor {
            pan_id: network.pan_coordinator.pan_id,
            short_address: device.short_address,
            ext_address: device.ext_address,
        })
    }

    fn on_network_info_confirm(&mut self, cnf: GetNwkInfoCnf) -> Result<Outcome> {
        if cnf.status != NWK_INFO_STATUS_STARTED {
            info!(status = cnf.status, "network not started yet, waiting for updates");
            return Ok(Outcome::none());
        }

        let info = cnf.nwkinfo.as_ref().ok_or(Error::MissingField("nwkinfo"))?;
        NetworkInfo::create_or_update(&mut self.network, info)?;

        let mut outcome = self.network_event();
        outcome.follow_up = Some(Request::GetDeviceArray);
        Ok(outcome)
    }

    fn on_device_array(&mut self, cnf: GetDeviceArrayCnf) -> Result<Outcome> {
        let devices = cnf
            .dev_info
            .iter()
            .map(|entry| device_from_parts(entry.dev_info.as_ref(), entry.cap_info.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        self.registry.replace_all(devices);
        info!(count = self.registry.len(), "device list replaced");
        Ok(self.device_list_event())
    }

    fn on_device_data(&mut self, ind: DeviceDataRxInd) -> Result<Outcome> {
        let src = ind.src_addr.as_ref().ok_or(Error::MissingField("srcAddr"))?;

        let device = match src.addr_mode {
            addr_mode::SHORT => {
                let short = narrow_u16("srcAddr.shortAddr", src.short_addr)?;
                self.registry.find_by_short_address_mut(short).ok_or_else(|| {
                    Error::unknown_device(format!("data from {}", format_short_address(short)))
                })?
            }
            addr_mode::EXTENDED => {
                let ext = src.ext_address;
                self.registry.find_by_ext_address_mut(ext).ok_or_else(|| {
                    Error::unknown_device(format!("data from {}", format_ext_address(ext)))
                })?
            }
            other => return Err(Error::InvalidAddressMode(other)),
        };

        let now = Utc::now();
        if let Some(data) = &ind.s_data_msg {
            device.apply_sensor_data(data, ind.rssi, now);
        } else if let Some(config) = &ind.s_config_msg {
            device.apply_config_response(config, now);
        } else {
            debug!(
                device = %format_ext_address(device.ext_address),
                "data indication without sensor or config message"
            );
            return Ok(Outcome::none());
        }

        Ok(self.device_list_event())
    }

    fn network_event(&self) -> Outcome {
        match &self.network {
            Some(network) => Outcome::event(Event::NetworkUpdated(network.clone())),
            None => Outcome::none(),
        }
    }

    fn device_list_event(&self) -> Outcome {
        Outcome::event(Event::DeviceListUpdated(self.registry.snapshot()))
    }
}

fn device_from_parts(
    desc: Option<&MacDeviceDescriptor>,
    cap: Option<&MacCapabilityInfo>,
) -> Result<Device> {
    let desc = desc.ok_or(Error::MissingField("devDescriptor"))?;
    let capability = cap.map(CapabilityInfo::from).unwrap_or_default();
    let short = narrow_u16("devDescriptor.shortAddress", desc.short_address)?;
    Ok(Device::new(short, desc.ext_address, capability))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HumidityReading, LightReading, TemperatureReading};
    use crate::protocol::schema::*;
    use crate::protocol::state::{raw_state, NetworkState};

    const EXT: u64 = 0x00124B0008682C02;

    fn nwk_info(state: u32) -> AppsrvNwkInfo {
        AppsrvNwkInfo {
            nwk_info: Some(LlcNetInfo {
                dev_info: Some(MacDeviceDescriptor {
                    pan_id: 0xACDC,
                    short_address: 0xAABB,
                    ext_address: 0x00124B0000000001,
                }),
                channel: 0,
                fh: false,
                fh_channels: vec![],
            }),
            security_enabled: false,
            network_mode: 2,
            state,
        }
    }

    fn started_confirm() -> Inbound {
        Inbound::NetworkInfoConfirm(GetNwkInfoCnf {
            cmd_id: 5,
            status: NWK_INFO_STATUS_STARTED,
            nwkinfo: Some(nwk_info(raw_state::STARTED)),
        })
    }

    fn descriptor(short: u32, ext: u64) -> MacDeviceDescriptor {
        MacDeviceDescriptor { pan_id: 0xACDC, short_address: short, ext_address: ext }
    }

    fn joined(short: u32, ext: u64) -> Inbound {
        Inbound::DeviceJoinedIndication(DeviceUpdateInd {
            cmd_id: 0,
            dev_descriptor: Some(descriptor(short, ext)),
            dev_cap_info: Some(MacCapabilityInfo::default()),
        })
    }

    fn data_rx(src: MacAddress, frame_control: u32) -> Inbound {
        Inbound::DeviceDataRxIndication(DeviceDataRxInd {
            cmd_id: 9,
            src_addr: Some(src),
            rssi: -60,
            s_data_msg: Some(SensorMsg {
                cmd_id: sensor_cmd::SENSOR_DATA,
                ext_address: EXT,
                frame_control,
                temp_sensor: Some(TempSensorField { ambience_temp: 21, object_temp: 25 }),
                light_sensor: Some(LightSensorField { raw_data: 300 }),
                humidity_sensor: Some(HumiditySensorField { temp: 20, humidity: 55 }),
            }),
            s_config_msg: None,
        })
    }

    fn ext_src(ext: u64) -> MacAddress {
        MacAddress { addr_mode: addr_mode::EXTENDED, short_addr: 0, ext_address: ext }
    }

    #[test]
    fn test_network_confirm_not_started() {
        let mut dispatcher = Dispatcher::new();
        let outcome = dispatcher
            .apply(Inbound::NetworkInfoConfirm(GetNwkInfoCnf { cmd_id: 5, status: 0, nwkinfo: None }))
            .unwrap();
        assert_eq!(outcome, Outcome::default());
        assert!(dispatcher.network_info().is_none());
    }

    #[test]
    fn test_network_confirm_started_requests_devices() {
        let mut dispatcher = Dispatcher::new();
        let outcome = dispatcher.apply(started_confirm()).unwrap();
        assert_eq!(outcome.follow_up, Some(Request::GetDeviceArray));
        match outcome.event {
            Some(Event::NetworkUpdated(info)) => assert_eq!(info.state, NetworkState::Started),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_device_array_replaces_registry() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.apply(joined(1, 0xA)).unwrap();

        let snapshot = GetDeviceArrayCnf {
            cmd_id: 7,
            status: 0,
            dev_info: vec![
                AppsrvDeviceInfo { dev_info: Some(descriptor(2, 0xB)), cap_info: None },
                AppsrvDeviceInfo { dev_info: Some(descriptor(3, 0xC)), cap_info: None },
            ],
        };
        let outcome = dispatcher.apply(Inbound::DeviceArrayConfirm(snapshot)).unwrap();

        let devices = match outcome.event {
            Some(Event::DeviceListUpdated(devices)) => devices,
            other => panic!("unexpected event {:?}", other),
        };
        let addrs: Vec<u64> = devices.iter().map(|d| d.ext_address).collect();
        assert_eq!(addrs, vec![0xB, 0xC]);
        assert!(dispatcher.registry().find_by_ext_address(0xA).is_none());
    }

    #[test]
    fn test_rejoin_updates_short_address() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.apply(joined(1, EXT)).unwrap();
        dispatcher.apply(joined(5, EXT)).unwrap();
        assert_eq!(dispatcher.registry().len(), 1);
        assert_eq!(dispatcher.registry().find_by_ext_address(EXT).unwrap().short_address, 5);
    }

    #[test]
    fn test_not_active_for_unknown_device() {
        let mut dispatcher = Dispatcher::new();
        let err = dispatcher
            .apply(Inbound::DeviceNotActiveIndication(DeviceNotActiveUpdateInd {
                cmd_id: 8,
                dev_descriptor: Some(descriptor(42, 0xF)),
                timeout: true,
            }))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDevice(_)));
    }

    #[test]
    fn test_temperature_only_sensor_update() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.apply(joined(1, EXT)).unwrap();
        dispatcher
            .apply(data_rx(ext_src(EXT), data_fields::LIGHT_SENSOR | data_fields::HUMIDITY_SENSOR))
            .unwrap();

        let mut update = data_rx(ext_src(EXT), data_fields::TEMP_SENSOR);
        if let Inbound::DeviceDataRxIndication(ind) = &mut update {
            if let Some(msg) = ind.s_data_msg.as_mut() {
                msg.temp_sensor = Some(TempSensorField { ambience_temp: 30, object_temp: 33 });
                msg.light_sensor = Some(LightSensorField { raw_data: 1 });
            }
        }
        dispatcher.apply(update).unwrap();

        let readings = dispatcher
            .registry()
            .find_by_ext_address(EXT)
            .and_then(|d| d.sensor_readings)
            .unwrap();
        assert_eq!(readings.temperature, Some(TemperatureReading { ambience_temp: 30, object_temp: 33 }));
        assert_eq!(readings.light, Some(LightReading { raw_data: 300 }));
        assert_eq!(readings.humidity, Some(HumidityReading { temp: 20, humidity: 55 }));
    }

    #[test]
    fn test_data_by_short_address_and_bad_mode() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.apply(joined(1, EXT)).unwrap();

        let short = MacAddress { addr_mode: addr_mode::SHORT, short_addr: 1, ext_address: 0 };
        let outcome = dispatcher.apply(data_rx(short, data_fields::TEMP_SENSOR)).unwrap();
        assert!(matches!(outcome.event, Some(Event::DeviceListUpdated(_))));

        let bad = MacAddress { addr_mode: addr_mode::NONE, short_addr: 1, ext_address: 0 };
        assert!(matches!(
            dispatcher.apply(data_rx(bad, data_fields::TEMP_SENSOR)),
            Err(Error::InvalidAddressMode(0))
        ));

        assert!(matches!(
            dispatcher.apply(data_rx(ext_src(0xDEAD), data_fields::TEMP_SENSOR)),
            Err(Error::UnknownDevice(_))
        ));

        // 0x1_0001 must not truncate onto device 0x0001
        let wide = MacAddress { addr_mode: addr_mode::SHORT, short_addr: 0x1_0001, ext_address: 0 };
        assert!(matches!(
            dispatcher.apply(data_rx(wide, data_fields::TEMP_SENSOR)),
            Err(Error::FieldRange { value: 0x1_0001, .. })
        ));
        assert!(matches!(dispatcher.apply(joined(0x1_0002, 0xB)), Err(Error::FieldRange { .. })));
        assert_eq!(dispatcher.registry().len(), 1);
    }

    #[test]
    fn test_state_change_updates_only_state() {
        let mut dispatcher = Dispatcher::new();
        let early = Inbound::CollectorStateChangeIndication(CollectorStateCngUpdateInd {
            cmd_id: 10,
            state: raw_state::JOINING_ALLOWED,
        });
        assert!(matches!(dispatcher.apply(early.clone()), Err(Error::InvalidState(_))));

        dispatcher.apply(started_confirm()).unwrap();
        let before = dispatcher.network_info().cloned().unwrap();
        dispatcher.apply(early).unwrap();

        let after = dispatcher.network_info().unwrap();
        assert_eq!(after.state, NetworkState::Open);
        assert_eq!(after.pan_coordinator, before.pan_coordinator);
        assert_eq!(after.channel, before.channel);
    }

    #[test]
    fn test_join_permit_confirm_passes_through() {
        let mut dispatcher = Dispatcher::new();
        let outcome = dispatcher
            .apply(Inbound::SetJoinPermitConfirm(SetJoinPermitCnf { cmd_id: 12, status: 0 }))
            .unwrap();
        assert_eq!(outcome.event, Some(Event::JoinPermitConfirmed { status: 0 }));
        assert!(dispatcher.registry().is_empty());
    }

    #[test]
    fn test_build_request_resolution() {
        let mut dispatcher = Dispatcher::new();
        let toggle = Action::SendToggle { short_address: 1 };
        assert!(matches!(dispatcher.build_request(toggle), Err(Error::UnknownDevice(_))));

        dispatcher.apply(joined(1, EXT)).unwrap();
        assert!(matches!(dispatcher.build_request(toggle), Err(Error::InvalidState(_))));

        dispatcher.apply(started_confirm()).unwrap();
        let request = dispatcher
            .build_request(Action::SendConfig {
                short_address: 1,
                reporting_interval_ms: 1000,
                polling_interval_ms: 2000,
            })
            .unwrap();
        assert_eq!(
            request,
            Request::SendConfig {
                target: DeviceDescriptor { pan_id: 0xACDC, short_address: 1, ext_address: EXT },
                reporting_interval_ms: 1000,
                polling_interval_ms: 2000,
            }
        );

        assert_eq!(
            dispatcher.build_request(Action::SetJoinPermit { open: true }).unwrap(),
            Request::SetJoinPermit { duration: JOIN_PERMIT_ALWAYS_OPEN }
        );
    }

    #[test]
    fn test_dispatch_unknown_command_is_skippable() {
        let mut dispatcher = Dispatcher::new();
        let err = dispatcher.dispatch(&Frame::new(99, Vec::new())).unwrap_err();
        assert!(matches!(err, Error::UnknownCommand { command: 99, .. }));
        assert!(!err.is_connection_fatal());
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event::JoinPermitConfirmed { status: 0 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "joinPermitConfirmed");
        assert_eq!(json["data"]["status"], 0);
    }
}
