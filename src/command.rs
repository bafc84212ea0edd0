//! Command and ack payload schemas.
//!
//! A command payload is `code:u16le` followed by the command's arguments.
//! The matching ack carries `code | 0x0100`, a `status:u16le` word (0 means
//! success) and optional reply arguments. A handful of write commands use an
//! indexed-word layout where each argument is prefixed by a `u16le` selector.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::FrameError;
use crate::types::{BaudRate, DistanceResolution, GateSelect, LightControl, ParametersConfig};

/// Bit set on a command code to turn it into its ack code.
pub const ACK_FLAG: u16 = 0x0100;

/// Protocol version word sent with enter-config.
pub(crate) const PROTOCOL_VERSION: u16 = 0x0001;

/// Command opcodes understood by the LD2410 family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum CommandCode {
    SetParameters = 0x0060,
    GetParameters = 0x0061,
    EnterEngineeringMode = 0x0062,
    LeaveEngineeringMode = 0x0063,
    SetGateSensitivity = 0x0064,
    GetFirmwareVersion = 0x00A0,
    SetBaudRate = 0x00A1,
    FactoryReset = 0x00A2,
    RestartModule = 0x00A3,
    SetBluetoothMode = 0x00A4,
    GetMacAddress = 0x00A5,
    SetBluetoothPassword = 0x00A9,
    SetDistanceResolution = 0x00AA,
    GetDistanceResolution = 0x00AB,
    SetLightControl = 0x00AD,
    GetLightControl = 0x00AE,
    LeaveConfig = 0x00FE,
    EnterConfig = 0x00FF,
}

/// A fully-specified command request, ready to be serialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    EnterConfig,
    LeaveConfig,
    SetParameters(ParametersConfig),
    GetParameters,
    SetEngineeringMode(bool),
    SetGateSensitivity {
        gate: GateSelect,
        moving_threshold: u8,
        static_threshold: u8,
    },
    GetFirmwareVersion,
    SetBaudRate(BaudRate),
    FactoryReset,
    RestartModule,
    SetBluetoothMode(bool),
    GetMacAddress,
    SetBluetoothPassword([u8; 6]),
    SetDistanceResolution(DistanceResolution),
    GetDistanceResolution,
    SetLightControl(LightControl),
    GetLightControl,
}

impl Command {
    pub fn code(&self) -> CommandCode {
        match self {
            Command::EnterConfig => CommandCode::EnterConfig,
            Command::LeaveConfig => CommandCode::LeaveConfig,
            Command::SetParameters(_) => CommandCode::SetParameters,
            Command::GetParameters => CommandCode::GetParameters,
            Command::SetEngineeringMode(true) => CommandCode::EnterEngineeringMode,
            Command::SetEngineeringMode(false) => CommandCode::LeaveEngineeringMode,
            Command::SetGateSensitivity { .. } => CommandCode::SetGateSensitivity,
            Command::GetFirmwareVersion => CommandCode::GetFirmwareVersion,
            Command::SetBaudRate(_) => CommandCode::SetBaudRate,
            Command::FactoryReset => CommandCode::FactoryReset,
            Command::RestartModule => CommandCode::RestartModule,
            Command::SetBluetoothMode(_) => CommandCode::SetBluetoothMode,
            Command::GetMacAddress => CommandCode::GetMacAddress,
            Command::SetBluetoothPassword(_) => CommandCode::SetBluetoothPassword,
            Command::SetDistanceResolution(_) => CommandCode::SetDistanceResolution,
            Command::GetDistanceResolution => CommandCode::GetDistanceResolution,
            Command::SetLightControl(_) => CommandCode::SetLightControl,
            Command::GetLightControl => CommandCode::GetLightControl,
        }
    }

    /// Serialise the intra-frame payload: opcode plus arguments.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(24);
        buf.put_u16_le(self.code().into());
        match self {
            Command::EnterConfig => buf.put_u16_le(PROTOCOL_VERSION),
            Command::GetMacAddress => buf.put_u16_le(0x0001),
            Command::SetParameters(params) => {
                buf.put_u16_le(0x0000);
                buf.put_u32_le(u32::from(params.max_distance_gate));
                buf.put_u16_le(0x0001);
                buf.put_u32_le(u32::from(params.max_moving_gate));
                buf.put_u16_le(0x0002);
                buf.put_u32_le(u32::from(params.max_static_gate));
                buf.put_u16_le(0x0003);
                buf.put_u32_le(u32::from(params.presence_timeout_seconds));
            }
            Command::SetGateSensitivity {
                gate,
                moving_threshold,
                static_threshold,
            } => {
                buf.put_u16_le(0x0000);
                buf.put_u32_le(gate.wire_value());
                buf.put_u16_le(0x0001);
                buf.put_u32_le(u32::from(*moving_threshold));
                buf.put_u16_le(0x0002);
                buf.put_u32_le(u32::from(*static_threshold));
            }
            Command::SetBaudRate(rate) => buf.put_u16_le((*rate).into()),
            Command::SetBluetoothMode(enabled) => buf.put_u16_le(u16::from(*enabled)),
            Command::SetBluetoothPassword(password) => buf.put_slice(password),
            Command::SetDistanceResolution(resolution) => buf.put_u16_le((*resolution).into()),
            Command::SetLightControl(light) => {
                buf.put_u8(light.function.into());
                buf.put_u8(light.threshold);
                buf.put_u8(light.default_level.into());
                buf.put_u8(0x00);
            }
            Command::LeaveConfig
            | Command::GetParameters
            | Command::SetEngineeringMode(_)
            | Command::GetFirmwareVersion
            | Command::FactoryReset
            | Command::RestartModule
            | Command::GetDistanceResolution
            | Command::GetLightControl => {}
        }
        buf.freeze()
    }
}

/// A parsed device acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// The command this ack answers (with the ack flag stripped).
    pub code: CommandCode,
    /// Raw device status; zero is success.
    pub status: u16,
    /// Reply arguments, if any.
    pub data: Bytes,
}

impl Ack {
    pub fn parse(mut payload: Bytes) -> Result<Self, FrameError> {
        if payload.len() < 4 {
            return Err(FrameError::truncated(4, payload.len()));
        }
        let raw = payload.get_u16_le();
        if raw & ACK_FLAG == 0 {
            return Err(FrameError::schema(format!(
                "command word {raw:#06x} is missing the ack flag"
            )));
        }
        let code = CommandCode::try_from(raw & !ACK_FLAG)
            .map_err(|_| FrameError::schema(format!("unknown command code {:#06x}", raw & !ACK_FLAG)))?;
        let status = payload.get_u16_le();
        Ok(Self {
            code,
            status,
            data: payload,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}
