//! User-facing value objects and the small indexed enums the protocol uses.

use std::fmt;

use bytes::Buf;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::FrameError;

/// Values returned by the device when entering configuration mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigModeStatus {
    /// Version of the communication protocol (expected to be 1).
    pub protocol_version: u16,
    /// Size of the device's internal read buffer, in bytes.
    pub buffer_size: u16,
}

impl ConfigModeStatus {
    pub(crate) fn parse(mut data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 4 {
            return Err(FrameError::truncated(4, data.len()));
        }
        Ok(Self {
            protocol_version: data.get_u16_le(),
            buffer_size: data.get_u16_le(),
        })
    }
}

/// Firmware version as reported by the device.
///
/// The revision reads naturally in hexadecimal, e.g. `0x23022511` for a
/// build dated 2023-02-25.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Firmware type word (documentation says 0 or 1 depending on variant).
    pub firmware_type: u16,
    pub major: u8,
    pub minor: u8,
    pub revision: u32,
}

impl FirmwareVersion {
    pub(crate) fn parse(mut data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 8 {
            return Err(FrameError::truncated(8, data.len()));
        }
        Ok(Self {
            firmware_type: data.get_u16_le(),
            major: data.get_u8(),
            minor: data.get_u8(),
            revision: data.get_u32_le(),
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}.{:02}.{:08x}", self.major, self.minor, self.revision)
    }
}

/// Bluetooth MAC address of the module.
///
/// Modules without a bluetooth chip report all zeroes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub(crate) fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let raw: [u8; 6] = data
            .get(..6)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| FrameError::truncated(6, data.len()))?;
        Ok(Self(raw))
    }

    /// Whether this is the all-zero sentinel for "no bluetooth chip".
    pub fn is_absent(&self) -> bool {
        self.0 == [0u8; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Serial speeds the device can be switched to, as wire indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum BaudRate {
    Baud9600 = 1,
    Baud19200 = 2,
    Baud38400 = 3,
    Baud57600 = 4,
    Baud115200 = 5,
    Baud230400 = 6,
    Baud256000 = 7,
    Baud460800 = 8,
}

impl BaudRate {
    /// Map a raw bits-per-second value to its index, if the device supports it.
    pub fn from_bps(bps: u32) -> Option<Self> {
        match bps {
            9_600 => Some(Self::Baud9600),
            19_200 => Some(Self::Baud19200),
            38_400 => Some(Self::Baud38400),
            57_600 => Some(Self::Baud57600),
            115_200 => Some(Self::Baud115200),
            230_400 => Some(Self::Baud230400),
            256_000 => Some(Self::Baud256000),
            460_800 => Some(Self::Baud460800),
            _ => None,
        }
    }

    /// The speed this index selects, in bits per second.
    pub fn bps(self) -> u32 {
        match self {
            Self::Baud9600 => 9_600,
            Self::Baud19200 => 19_200,
            Self::Baud38400 => 38_400,
            Self::Baud57600 => 57_600,
            Self::Baud115200 => 115_200,
            Self::Baud230400 => 230_400,
            Self::Baud256000 => 256_000,
            Self::Baud460800 => 460_800,
        }
    }
}

/// Width of a distance gate. Takes effect after a module restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum DistanceResolution {
    /// 75 cm per gate.
    Coarse = 0,
    /// 20 cm per gate.
    Fine = 1,
}

impl DistanceResolution {
    /// Gate width in centimeters.
    pub fn centimeters(self) -> u16 {
        match self {
            Self::Coarse => 75,
            Self::Fine => 20,
        }
    }

    pub(crate) fn parse(mut data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 2 {
            return Err(FrameError::truncated(2, data.len()));
        }
        let index = data.get_u16_le();
        Self::try_from(index)
            .map_err(|_| FrameError::schema(format!("unknown distance resolution index {index}")))
    }
}

/// Target of a gate-sensitivity write: one gate or all of them at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSelect {
    Gate(u8),
    All,
}

impl GateSelect {
    pub(crate) fn wire_value(self) -> u32 {
        match self {
            GateSelect::Gate(gate) => u32::from(gate),
            GateSelect::All => 0xFFFF_FFFF,
        }
    }
}

/// Standard configuration parameters written with `set_parameters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParametersConfig {
    /// Furthest gate the detector should consider at all (0–8).
    pub max_distance_gate: u8,
    /// Furthest gate used for moving-target detection.
    pub max_moving_gate: u8,
    /// Furthest gate used for static-target detection.
    pub max_static_gate: u8,
    /// How long detection output stays asserted after the target is gone.
    pub presence_timeout_seconds: u16,
}

/// Currently applied parameters, as read back from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    /// Furthest gate this chip can handle (normally 8).
    pub max_distance_gate: u8,
    pub max_moving_gate: u8,
    pub max_static_gate: u8,
    /// Moving sensitivity threshold per gate, percent.
    pub moving_sensitivity: [u8; 9],
    /// Static sensitivity threshold per gate, percent.
    pub static_sensitivity: [u8; 9],
    pub presence_timeout_seconds: u16,
}

impl Parameters {
    pub(crate) fn parse(mut data: &[u8]) -> Result<Self, FrameError> {
        // head byte + 3 gate bytes + 2 * 9 sensitivities + timeout word
        if data.len() < 24 {
            return Err(FrameError::truncated(24, data.len()));
        }
        let head = data.get_u8();
        if head != 0xAA {
            return Err(FrameError::schema(format!(
                "parameters reply starts with {head:#04x}, expected 0xaa"
            )));
        }
        let max_distance_gate = data.get_u8();
        let max_moving_gate = data.get_u8();
        let max_static_gate = data.get_u8();
        let mut moving_sensitivity = [0u8; 9];
        data.copy_to_slice(&mut moving_sensitivity);
        let mut static_sensitivity = [0u8; 9];
        data.copy_to_slice(&mut static_sensitivity);
        let presence_timeout_seconds = data.get_u16_le();
        Ok(Self {
            max_distance_gate,
            max_moving_gate,
            max_static_gate,
            moving_sensitivity,
            static_sensitivity,
            presence_timeout_seconds,
        })
    }
}

/// When the photo sensor drives the `OUT` pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum LightFunction {
    Off = 0,
    /// Assert when the light level is below the threshold.
    Below = 1,
    /// Assert when the light level is above the threshold.
    Above = 2,
}

/// Idle level of the `OUT` pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OutPinLevel {
    Low = 0,
    High = 1,
}

/// Photo-sensor control of the `OUT` pin.
///
/// Not every firmware supports this; unsupported devices reply with a
/// failure status that is surfaced verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightControl {
    pub function: LightFunction,
    /// Light threshold, 0–255.
    pub threshold: u8,
    /// `OUT` level when not triggered.
    pub default_level: OutPinLevel,
}

impl LightControl {
    pub(crate) fn parse(mut data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 3 {
            return Err(FrameError::truncated(3, data.len()));
        }
        let function = data.get_u8();
        let function = LightFunction::try_from(function)
            .map_err(|_| FrameError::schema(format!("unknown light function {function}")))?;
        let threshold = data.get_u8();
        let level = data.get_u8();
        let default_level = OutPinLevel::try_from(level)
            .map_err(|_| FrameError::schema(format!("unknown OUT pin level {level}")))?;
        Ok(Self {
            function,
            threshold,
            default_level,
        })
    }
}
