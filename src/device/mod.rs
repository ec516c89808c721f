//! Device registry module
//!
//! Devices known to the coordinator and the last sensor and configuration
//! state each one reported.

mod registry;

pub use self::registry::DeviceRegistry;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::protocol::schema::{
    data_fields, ConfigRspMsg, MacCapabilityInfo, SensorMsg, CONFIG_STATUS_SUCCESS,
};
use crate::util::format_ext_address;

/// Fixed operating characteristics a device announced when it joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInfo {
    pub pan_coordinator: bool,
    pub ffd: bool,
    pub mains_power: bool,
    /// Receiver stays on between transmissions
    pub rx_on_when_idle: bool,
    pub security: bool,
    pub alloc_addr: bool,
}

impl From<&MacCapabilityInfo> for CapabilityInfo {
    fn from(cap: &MacCapabilityInfo) -> Self {
        CapabilityInfo {
            pan_coordinator: cap.pan_coord,
            ffd: cap.ffd,
            mains_power: cap.mains_power,
            rx_on_when_idle: cap.rx_on_when_idle,
            security: cap.security,
            alloc_addr: cap.alloc_addr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureReading {
    pub ambience_temp: i16,
    pub object_temp: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LightReading {
    pub raw_data: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HumidityReading {
    pub temp: u16,
    pub humidity: u16,
}

/// Last value of every sensor a device has reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReadings {
    pub temperature: Option<TemperatureReading>,
    pub light: Option<LightReading>,
    pub humidity: Option<HumidityReading>,
}

/// How often a sleepy device polls its parent for queued data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingInterval {
    /// Poll period in milliseconds
    Millis(u32),
    /// The device never sleeps, so it is not polled
    AlwaysOn,
}

impl Serialize for PollingInterval {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PollingInterval::Millis(ms) => serializer.serialize_u32(*ms),
            PollingInterval::AlwaysOn => serializer.serialize_str("always-on"),
        }
    }
}

/// A device known to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub short_address: u16,
    #[serde(serialize_with = "crate::core::serde::serialize_ext_address")]
    pub ext_address: u64,
    pub capability_info: CapabilityInfo,
    pub active: bool,
    pub sensor_readings: Option<SensorReadings>,
    pub reporting_interval_ms: Option<u32>,
    pub polling_interval_ms: Option<PollingInterval>,
    /// Signal strength of the last sensor report, in dBm
    pub rssi: Option<i8>,
    /// When the last message from this device was applied
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// Creates an active device with no readings yet
    pub fn new(short_address: u16, ext_address: u64, capability_info: CapabilityInfo) -> Self {
        Device {
            short_address,
            ext_address,
            capability_info,
            active: true,
            sensor_readings: None,
            reporting_interval_ms: None,
            polling_interval_ms: None,
            rssi: None,
            last_seen: None,
        }
    }

    /// Refreshes addressing after a (re)join and marks the device active
    pub fn update_info(&mut self, short_address: u16, capability_info: CapabilityInfo) {
        self.short_address = short_address;
        self.capability_info = capability_info;
        self.active = true;
    }

    /// Marks the device as no longer active
    pub fn mark_inactive(&mut self) {
        self.active = false;
    }

    /// Merges a sensor report; only fields flagged in the frame control change
    pub fn apply_sensor_data(&mut self, msg: &SensorMsg, rssi: i32, at: DateTime<Utc>) {
        self.active = true;
        let readings = self.sensor_readings.get_or_insert_with(SensorReadings::default);

        if msg.frame_control & data_fields::TEMP_SENSOR != 0 {
            if let Some(temp) = &msg.temp_sensor {
                readings.temperature = Some(TemperatureReading {
                    ambience_temp: clamp_i16(temp.ambience_temp),
                    object_temp: clamp_i16(temp.object_temp),
                });
            }
        }
        if msg.frame_control & data_fields::LIGHT_SENSOR != 0 {
            if let Some(light) = &msg.light_sensor {
                readings.light = Some(LightReading {
                    raw_data: clamp_u16(light.raw_data),
                });
            }
        }
        if msg.frame_control & data_fields::HUMIDITY_SENSOR != 0 {
            if let Some(humidity) = &msg.humidity_sensor {
                readings.humidity = Some(HumidityReading {
                    temp: clamp_u16(humidity.temp),
                    humidity: clamp_u16(humidity.humidity),
                });
            }
        }

        self.rssi = Some(rssi.clamp(i8::MIN as i32, i8::MAX as i32) as i8);
        self.last_seen = Some(at);
    }

    /// Applies a config response; a failed response leaves the device untouched
    pub fn apply_config_response(&mut self, msg: &ConfigRspMsg, at: DateTime<Utc>) {
        if msg.status != CONFIG_STATUS_SUCCESS {
            debug!(
                device = %format_ext_address(self.ext_address),
                status = msg.status,
                "config response reported failure"
            );
            return;
        }

        self.active = true;
        let readings = self.sensor_readings.get_or_insert_with(SensorReadings::default);
        if msg.frame_control & data_fields::TEMP_SENSOR != 0 && readings.temperature.is_none() {
            readings.temperature = Some(TemperatureReading::default());
        }
        if msg.frame_control & data_fields::LIGHT_SENSOR != 0 && readings.light.is_none() {
            readings.light = Some(LightReading::default());
        }
        if msg.frame_control & data_fields::HUMIDITY_SENSOR != 0 && readings.humidity.is_none() {
            readings.humidity = Some(HumidityReading::default());
        }

        self.reporting_interval_ms = Some(msg.reporting_interval);
        self.polling_interval_ms = Some(if self.capability_info.rx_on_when_idle {
            PollingInterval::AlwaysOn
        } else {
            PollingInterval::Millis(msg.polling_interval)
        });
        self.last_seen = Some(at);
    }
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn clamp_u16(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}
