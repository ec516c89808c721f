//! Application server payload schema
//!
//! Payloads carried inside frames are protobuf messages defined by the
//! application server's versioned schema. Every message starts with its
//! command id in field 1. Only the messages the client exchanges are
//! declared here.

use prost::Message;

/// Subsystem id of the application server protocol family
pub const SUBSYSTEM_APPSRV: u8 = 19;

/// `status` of a network info confirm once the coordinator is up
pub const NWK_INFO_STATUS_STARTED: u32 = 1;

/// `status` of a successful config response from a sensor
pub const CONFIG_STATUS_SUCCESS: u32 = 0;

/// Join permit duration that keeps the network open until told otherwise
pub const JOIN_PERMIT_ALWAYS_OPEN: u32 = 0xFFFF_FFFF;

/// Join permit duration that closes the network
pub const JOIN_PERMIT_CLOSED: u32 = 0;

/// Sensor application message ids (`msgId` of a tx data request)
pub mod sensor_cmd {
    pub const CONFIG_REQ: u32 = 1;
    pub const CONFIG_RSP: u32 = 2;
    pub const TRACKING_REQ: u32 = 3;
    pub const TRACKING_RSP: u32 = 4;
    pub const SENSOR_DATA: u32 = 5;
    pub const TOGGLE_LED_REQ: u32 = 6;
    pub const TOGGLE_LED_RSP: u32 = 7;
}

/// Frame-control bits announcing which sensor fields a message carries
pub mod data_fields {
    pub const TEMP_SENSOR: u32 = 0x0001;
    pub const LIGHT_SENSOR: u32 = 0x0002;
    pub const HUMIDITY_SENSOR: u32 = 0x0004;
    pub const MSG_STATS: u32 = 0x0008;
    pub const CONFIG_SETTINGS: u32 = 0x0010;
}

/// MAC address modes of [`MacAddress::addr_mode`]
pub mod addr_mode {
    pub const NONE: u32 = 0;
    pub const SHORT: u32 = 2;
    pub const EXTENDED: u32 = 3;
}

/// PAN id plus both addresses of a device
#[derive(Clone, PartialEq, Message)]
pub struct MacDeviceDescriptor {
    #[prost(uint32, tag = "1")]
    pub pan_id: u32,
    #[prost(uint32, tag = "2")]
    pub short_address: u32,
    #[prost(uint64, tag = "3")]
    pub ext_address: u64,
}

/// Capability flags a device announces when it associates
#[derive(Clone, PartialEq, Message)]
pub struct MacCapabilityInfo {
    #[prost(bool, tag = "1")]
    pub pan_coord: bool,
    #[prost(bool, tag = "2")]
    pub ffd: bool,
    #[prost(bool, tag = "3")]
    pub mains_power: bool,
    #[prost(bool, tag = "4")]
    pub rx_on_when_idle: bool,
    #[prost(bool, tag = "5")]
    pub security: bool,
    #[prost(bool, tag = "6")]
    pub alloc_addr: bool,
}

/// Source address of a received data frame
#[derive(Clone, PartialEq, Message)]
pub struct MacAddress {
    #[prost(uint32, tag = "1")]
    pub addr_mode: u32,
    #[prost(uint32, tag = "2")]
    pub short_addr: u32,
    #[prost(uint64, tag = "3")]
    pub ext_address: u64,
}

/// Coordinator radio parameters
#[derive(Clone, PartialEq, Message)]
pub struct LlcNetInfo {
    #[prost(message, optional, tag = "1")]
    pub dev_info: Option<MacDeviceDescriptor>,
    #[prost(uint32, tag = "2")]
    pub channel: u32,
    #[prost(bool, tag = "3")]
    pub fh: bool,
    #[prost(uint32, repeated, tag = "4")]
    pub fh_channels: Vec<u32>,
}

/// Full network description shared by the confirm and the indication
#[derive(Clone, PartialEq, Message)]
pub struct AppsrvNwkInfo {
    #[prost(message, optional, tag = "1")]
    pub nwk_info: Option<LlcNetInfo>,
    #[prost(bool, tag = "2")]
    pub security_enabled: bool,
    #[prost(uint32, tag = "3")]
    pub network_mode: u32,
    #[prost(uint32, tag = "4")]
    pub state: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetNwkInfoReq {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetNwkInfoCnf {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(uint32, tag = "2")]
    pub status: u32,
    #[prost(message, optional, tag = "3")]
    pub nwkinfo: Option<AppsrvNwkInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetDeviceArrayReq {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
}

/// One entry of the device array snapshot
#[derive(Clone, PartialEq, Message)]
pub struct AppsrvDeviceInfo {
    #[prost(message, optional, tag = "1")]
    pub dev_info: Option<MacDeviceDescriptor>,
    #[prost(message, optional, tag = "2")]
    pub cap_info: Option<MacCapabilityInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetDeviceArrayCnf {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(uint32, tag = "2")]
    pub status: u32,
    #[prost(message, repeated, tag = "3")]
    pub dev_info: Vec<AppsrvDeviceInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NwkInfoUpdateInd {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(message, optional, tag = "2")]
    pub nwkinfo: Option<AppsrvNwkInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceUpdateInd {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(message, optional, tag = "2")]
    pub dev_descriptor: Option<MacDeviceDescriptor>,
    #[prost(message, optional, tag = "3")]
    pub dev_cap_info: Option<MacCapabilityInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceNotActiveUpdateInd {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(message, optional, tag = "2")]
    pub dev_descriptor: Option<MacDeviceDescriptor>,
    #[prost(bool, tag = "3")]
    pub timeout: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct TempSensorField {
    #[prost(int32, tag = "1")]
    pub ambience_temp: i32,
    #[prost(int32, tag = "2")]
    pub object_temp: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct LightSensorField {
    #[prost(uint32, tag = "1")]
    pub raw_data: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct HumiditySensorField {
    #[prost(uint32, tag = "1")]
    pub temp: u32,
    #[prost(uint32, tag = "2")]
    pub humidity: u32,
}

/// Periodic sensor report
#[derive(Clone, PartialEq, Message)]
pub struct SensorMsg {
    #[prost(uint32, tag = "1")]
    pub cmd_id: u32,
    #[prost(uint64, tag = "2")]
    pub ext_address: u64,
    #[prost(uint32, tag = "3")]
    pub frame_control: u32,
    #[prost(message, optional, tag = "4")]
    pub temp_sensor: Option<TempSensorField>,
    #[prost(message, optional, tag = "5")]
    pub light_sensor: Option<LightSensorField>,
    #[prost(message, optional, tag = "6")]
    pub humidity_sensor: Option<HumiditySensorField>,
}

/// Sensor's answer to a config request
#[derive(Clone, PartialEq, Message)]
pub struct ConfigRspMsg {
    #[prost(uint32, tag = "1")]
    pub cmd_id: u32,
    #[prost(uint32, tag = "2")]
    pub status: u32,
    #[prost(uint32, tag = "3")]
    pub frame_control: u32,
    #[prost(uint32, tag = "4")]
    pub reporting_interval: u32,
    #[prost(uint32, tag = "5")]
    pub polling_interval: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceDataRxInd {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(message, optional, tag = "2")]
    pub src_addr: Option<MacAddress>,
    #[prost(sint32, tag = "3")]
    pub rssi: i32,
    #[prost(message, optional, tag = "4")]
    pub s_data_msg: Option<SensorMsg>,
    #[prost(message, optional, tag = "5")]
    pub s_config_msg: Option<ConfigRspMsg>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CollectorStateCngUpdateInd {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(uint32, tag = "2")]
    pub state: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct SetJoinPermitReq {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(uint32, tag = "2")]
    pub duration: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct SetJoinPermitCnf {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(uint32, tag = "2")]
    pub status: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConfigReqMsg {
    #[prost(uint32, tag = "1")]
    pub cmd_id: u32,
    #[prost(uint32, tag = "2")]
    pub frame_control: u32,
    #[prost(uint32, tag = "3")]
    pub reporting_interval: u32,
    #[prost(uint32, tag = "4")]
    pub polling_interval: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ToggleLedReqMsg {
    #[prost(uint32, tag = "1")]
    pub cmd_id: u32,
}

/// Data request addressed to one sensor
#[derive(Clone, PartialEq, Message)]
pub struct TxDataReq {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(uint32, tag = "2")]
    pub msg_id: u32,
    #[prost(message, optional, tag = "3")]
    pub dev_descriptor: Option<MacDeviceDescriptor>,
    #[prost(message, optional, tag = "4")]
    pub config_req_msg: Option<ConfigReqMsg>,
    #[prost(message, optional, tag = "5")]
    pub toggle_led_req: Option<ToggleLedReqMsg>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxDataCnf {
    #[prost(uint32, required, tag = "1")]
    pub cmd_id: u32,
    #[prost(uint32, tag = "2")]
    pub status: u32,
}
