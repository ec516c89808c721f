use std::fmt;

use prost::Message;

use crate::core::{DeviceDescriptor, Error, Result};
use super::codec::Frame;
use super::schema::{
    self, sensor_cmd, data_fields, CollectorStateCngUpdateInd, ConfigReqMsg, DeviceDataRxInd,
    DeviceNotActiveUpdateInd, DeviceUpdateInd, GetDeviceArrayCnf, GetDeviceArrayReq,
    GetNwkInfoCnf, GetNwkInfoReq, MacDeviceDescriptor, NwkInfoUpdateInd, SetJoinPermitCnf,
    SetJoinPermitReq, ToggleLedReqMsg, TxDataCnf, TxDataReq, SUBSYSTEM_APPSRV,
};

/// Command identifiers of the app server protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    DeviceJoinedInd = 0,
    DeviceLeftInd = 1,
    NwkInfoInd = 2,
    GetNwkInfoReq = 3,
    GetNwkInfoRsp = 4,
    GetNwkInfoCnf = 5,
    GetDeviceArrayReq = 6,
    GetDeviceArrayCnf = 7,
    DeviceNotActiveUpdateInd = 8,
    DeviceDataRxInd = 9,
    CollectorStateCngInd = 10,
    SetJoinPermitReq = 11,
    SetJoinPermitCnf = 12,
    TxDataReq = 13,
    TxDataCnf = 14,
}

impl CommandId {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandId {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        Ok(match value {
            0 => CommandId::DeviceJoinedInd,
            1 => CommandId::DeviceLeftInd,
            2 => CommandId::NwkInfoInd,
            3 => CommandId::GetNwkInfoReq,
            4 => CommandId::GetNwkInfoRsp,
            5 => CommandId::GetNwkInfoCnf,
            6 => CommandId::GetDeviceArrayReq,
            7 => CommandId::GetDeviceArrayCnf,
            8 => CommandId::DeviceNotActiveUpdateInd,
            9 => CommandId::DeviceDataRxInd,
            10 => CommandId::CollectorStateCngInd,
            11 => CommandId::SetJoinPermitReq,
            12 => CommandId::SetJoinPermitCnf,
            13 => CommandId::TxDataReq,
            14 => CommandId::TxDataCnf,
            other => return Err(other),
        })
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_u8())
    }
}

impl From<DeviceDescriptor> for MacDeviceDescriptor {
    fn from(desc: DeviceDescriptor) -> Self {
        MacDeviceDescriptor {
            pan_id: desc.pan_id as u32,
            short_address: desc.short_address as u32,
            ext_address: desc.ext_address,
        }
    }
}

impl TryFrom<&MacDeviceDescriptor> for DeviceDescriptor {
    type Error = Error;

    fn try_from(desc: &MacDeviceDescriptor) -> Result<Self> {
        Ok(DeviceDescriptor {
            pan_id: narrow_u16("panId", desc.pan_id)?,
            short_address: narrow_u16("shortAddress", desc.short_address)?,
            ext_address: desc.ext_address,
        })
    }
}

/// Narrows a 16-bit wire field carried as `uint32`
pub(crate) fn narrow_u16(field: &'static str, value: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::FieldRange {
        field,
        value: value as u64,
    })
}

fn unknown(frame: &Frame) -> Error {
    Error::UnknownCommand {
        subsystem: frame.subsystem,
        command: frame.command,
    }
}

/// Messages the client understands from the app server
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    NetworkInfoConfirm(GetNwkInfoCnf),
    DeviceArrayConfirm(GetDeviceArrayCnf),
    NetworkInfoIndication(NwkInfoUpdateInd),
    DeviceJoinedIndication(DeviceUpdateInd),
    DeviceNotActiveIndication(DeviceNotActiveUpdateInd),
    DeviceDataRxIndication(DeviceDataRxInd),
    CollectorStateChangeIndication(CollectorStateCngUpdateInd),
    SetJoinPermitConfirm(SetJoinPermitCnf),
    TxDataConfirm(TxDataCnf),
}

impl Inbound {
    /// Decodes a frame's payload according to its command id
    ///
    /// Frames of another subsystem, unassigned ids and ids the client only ever
    /// sends are all reported as [`Error::UnknownCommand`].
    pub fn decode(frame: &Frame) -> Result<Self> {
        if frame.subsystem != SUBSYSTEM_APPSRV {
            return Err(unknown(frame));
        }
        let command = CommandId::try_from(frame.command).map_err(|_| unknown(frame))?;
        let payload = frame.payload.as_ref();

        let message = match command {
            CommandId::GetNwkInfoCnf => Inbound::NetworkInfoConfirm(GetNwkInfoCnf::decode(payload)?),
            CommandId::GetDeviceArrayCnf => {
                Inbound::DeviceArrayConfirm(GetDeviceArrayCnf::decode(payload)?)
            }
            CommandId::NwkInfoInd => {
                Inbound::NetworkInfoIndication(NwkInfoUpdateInd::decode(payload)?)
            }
            CommandId::DeviceJoinedInd => {
                Inbound::DeviceJoinedIndication(DeviceUpdateInd::decode(payload)?)
            }
            CommandId::DeviceNotActiveUpdateInd => {
                Inbound::DeviceNotActiveIndication(DeviceNotActiveUpdateInd::decode(payload)?)
            }
            CommandId::DeviceDataRxInd => {
                Inbound::DeviceDataRxIndication(DeviceDataRxInd::decode(payload)?)
            }
            CommandId::CollectorStateCngInd => {
                Inbound::CollectorStateChangeIndication(CollectorStateCngUpdateInd::decode(payload)?)
            }
            CommandId::SetJoinPermitCnf => {
                Inbound::SetJoinPermitConfirm(SetJoinPermitCnf::decode(payload)?)
            }
            CommandId::TxDataCnf => Inbound::TxDataConfirm(TxDataCnf::decode(payload)?),
            CommandId::DeviceLeftInd
            | CommandId::GetNwkInfoReq
            | CommandId::GetNwkInfoRsp
            | CommandId::GetDeviceArrayReq
            | CommandId::SetJoinPermitReq
            | CommandId::TxDataReq => return Err(unknown(frame)),
        };

        Ok(message)
    }

    pub fn command_id(&self) -> CommandId {
        match self {
            Inbound::NetworkInfoConfirm(_) => CommandId::GetNwkInfoCnf,
            Inbound::DeviceArrayConfirm(_) => CommandId::GetDeviceArrayCnf,
            Inbound::NetworkInfoIndication(_) => CommandId::NwkInfoInd,
            Inbound::DeviceJoinedIndication(_) => CommandId::DeviceJoinedInd,
            Inbound::DeviceNotActiveIndication(_) => CommandId::DeviceNotActiveUpdateInd,
            Inbound::DeviceDataRxIndication(_) => CommandId::DeviceDataRxInd,
            Inbound::CollectorStateChangeIndication(_) => CommandId::CollectorStateCngInd,
            Inbound::SetJoinPermitConfirm(_) => CommandId::SetJoinPermitCnf,
            Inbound::TxDataConfirm(_) => CommandId::TxDataCnf,
        }
    }

    /// Encodes the message the way the app server sends it
    pub fn to_frame(&self) -> Frame {
        let payload = match self {
            Inbound::NetworkInfoConfirm(m) => m.encode_to_vec(),
            Inbound::DeviceArrayConfirm(m) => m.encode_to_vec(),
            Inbound::NetworkInfoIndication(m) => m.encode_to_vec(),
            Inbound::DeviceJoinedIndication(m) => m.encode_to_vec(),
            Inbound::DeviceNotActiveIndication(m) => m.encode_to_vec(),
            Inbound::DeviceDataRxIndication(m) => m.encode_to_vec(),
            Inbound::CollectorStateChangeIndication(m) => m.encode_to_vec(),
            Inbound::SetJoinPermitConfirm(m) => m.encode_to_vec(),
            Inbound::TxDataConfirm(m) => m.encode_to_vec(),
        };
        Frame::new(self.command_id().as_u8(), payload)
    }
}

/// Requests the client sends to the app server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetNetworkInfo,
    GetDeviceArray,
    SetJoinPermit {
        /// How long joining stays allowed, in milliseconds
        duration: u32,
    },
    SendToggle {
        target: DeviceDescriptor,
    },
    SendConfig {
        target: DeviceDescriptor,
        reporting_interval_ms: u32,
        polling_interval_ms: u32,
    },
}

impl Request {
    pub fn command_id(&self) -> CommandId {
        match self {
            Request::GetNetworkInfo => CommandId::GetNwkInfoReq,
            Request::GetDeviceArray => CommandId::GetDeviceArrayReq,
            Request::SetJoinPermit { .. } => CommandId::SetJoinPermitReq,
            Request::SendToggle { .. } | Request::SendConfig { .. } => CommandId::TxDataReq,
        }
    }

    /// Encodes the request payload
    pub fn encode_payload(&self) -> Vec<u8> {
        let cmd_id = self.command_id().as_u8() as u32;
        match self {
            Request::GetNetworkInfo => GetNwkInfoReq { cmd_id }.encode_to_vec(),
            Request::GetDeviceArray => GetDeviceArrayReq { cmd_id }.encode_to_vec(),
            Request::SetJoinPermit { duration } => SetJoinPermitReq {
                cmd_id,
                duration: *duration,
            }
            .encode_to_vec(),
            Request::SendToggle { target } => TxDataReq {
                cmd_id,
                msg_id: sensor_cmd::TOGGLE_LED_REQ,
                dev_descriptor: Some((*target).into()),
                config_req_msg: None,
                toggle_led_req: Some(ToggleLedReqMsg {
                    cmd_id: sensor_cmd::TOGGLE_LED_REQ,
                }),
            }
            .encode_to_vec(),
            Request::SendConfig {
                target,
                reporting_interval_ms,
                polling_interval_ms,
            } => TxDataReq {
                cmd_id,
                msg_id: sensor_cmd::CONFIG_REQ,
                dev_descriptor: Some((*target).into()),
                config_req_msg: Some(ConfigReqMsg {
                    cmd_id: sensor_cmd::CONFIG_REQ,
                    frame_control: data_fields::CONFIG_SETTINGS,
                    reporting_interval: *reporting_interval_ms,
                    polling_interval: *polling_interval_ms,
                }),
                toggle_led_req: None,
            }
            .encode_to_vec(),
        }
    }

    /// Wraps the encoded payload in a frame carrying this request's command id
    pub fn to_frame(&self) -> Frame {
        Frame::new(self.command_id().as_u8(), self.encode_payload())
    }

    /// Decodes a request frame, as the app server would
    pub fn decode(frame: &Frame) -> Result<Self> {
        if frame.subsystem != SUBSYSTEM_APPSRV {
            return Err(unknown(frame));
        }
        let command = CommandId::try_from(frame.command).map_err(|_| unknown(frame))?;
        let payload = frame.payload.as_ref();

        match command {
            CommandId::GetNwkInfoReq => {
                GetNwkInfoReq::decode(payload)?;
                Ok(Request::GetNetworkInfo)
            }
            CommandId::GetDeviceArrayReq => {
                GetDeviceArrayReq::decode(payload)?;
                Ok(Request::GetDeviceArray)
            }
            CommandId::SetJoinPermitReq => {
                let req = SetJoinPermitReq::decode(payload)?;
                Ok(Request::SetJoinPermit { duration: req.duration })
            }
            CommandId::TxDataReq => {
                let req = TxDataReq::decode(payload)?;
                let desc = req.dev_descriptor.as_ref().ok_or(Error::MissingField("devDescriptor"))?;
                let target = DeviceDescriptor::try_from(desc)?;
                match req.msg_id {
                    sensor_cmd::TOGGLE_LED_REQ => Ok(Request::SendToggle { target }),
                    sensor_cmd::CONFIG_REQ => {
                        let config = req.config_req_msg.ok_or(Error::MissingField("configReqMsg"))?;
                        Ok(Request::SendConfig {
                            target,
                            reporting_interval_ms: config.reporting_interval,
                            polling_interval_ms: config.polling_interval,
                        })
                    }
                    _ => Err(unknown(frame)),
                }
            }
            _ => Err(unknown(frame)),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::GetNetworkInfo => write!(f, "GetNetworkInfo"),
            Request::GetDeviceArray => write!(f, "GetDeviceArray"),
            Request::SetJoinPermit { duration } => write!(f, "SetJoinPermit({:#x})", duration),
            Request::SendToggle { target } => write!(f, "SendToggle({:#06x})", target.short_address),
            Request::SendConfig { target, .. } => {
                write!(f, "SendConfig({:#06x})", target.short_address)
            }
        }
    }
}

/// Join permit duration for an open or closed network
pub fn join_permit_duration(open: bool) -> u32 {
    if open {
        schema::JOIN_PERMIT_ALWAYS_OPEN
    } else {
        schema::JOIN_PERMIT_CLOSED
    }
}
