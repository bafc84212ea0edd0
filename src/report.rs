//! Report payload schemas.
//!
//! Reports arrive roughly ten times per second while the device is out of
//! configuration mode. The payload envelope is
//! `type:u8, 0xAA, body, 0x55, 0x00`; a basic report (type 0x02) carries the
//! target summary only, an engineering report (type 0x01) appends per-gate
//! energies and, on firmwares that have the photo sensor, the light level
//! and `OUT` pin state.

use bytes::Buf;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::FrameError;
use crate::types::OutPinLevel;

const REPORT_DATA_HEAD: u8 = 0xAA;
const REPORT_DATA_TAIL: [u8; 2] = [0x55, 0x00];

/// Wire discriminator for the two report layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ReportType {
    Engineering = 0x01,
    Basic = 0x02,
}

/// Detection state of the target, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TargetState {
    NoTarget = 0,
    Moving = 1,
    Static = 2,
    MovingAndStatic = 3,
}

impl TargetState {
    pub fn is_moving(self) -> bool {
        matches!(self, TargetState::Moving | TargetState::MovingAndStatic)
    }

    pub fn is_static(self) -> bool {
        matches!(self, TargetState::Static | TargetState::MovingAndStatic)
    }
}

/// The target summary present in every report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicReport {
    pub target_state: TargetState,
    /// Moving target distance, centimeters.
    pub moving_distance: u16,
    /// Moving target energy, percent.
    pub moving_energy: u8,
    /// Static target distance, centimeters.
    pub static_distance: u16,
    /// Static target energy, percent.
    pub static_energy: u8,
    /// Overall detection distance, centimeters.
    pub detection_distance: u16,
}

/// Per-gate diagnostics appended in engineering mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineeringReport {
    /// Furthest gate the chip reports on.
    pub max_gate: u8,
    pub max_moving_gate: u8,
    pub max_static_gate: u8,
    /// Moving energy for gates `0..=max_gate`, percent.
    pub moving_gate_energy: Vec<u8>,
    /// Static energy for gates `0..=max_gate`, percent.
    pub static_gate_energy: Vec<u8>,
    /// Photo-sensor level, 0–255, when the firmware reports it.
    pub light_level: Option<u8>,
    /// Current `OUT` pin state, when the firmware reports it.
    pub out_pin_level: Option<OutPinLevel>,
}

/// One full report as delivered to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub basic: BasicReport,
    /// Present only while engineering mode is on.
    pub engineering: Option<EngineeringReport>,
}

impl Report {
    /// Parse a report-dialect frame payload.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        // type + head + basic + tail
        if payload.len() < 13 {
            return Err(FrameError::truncated(13, payload.len()));
        }

        let report_type = ReportType::try_from(payload[0])
            .map_err(|_| FrameError::schema(format!("unknown report type {:#04x}", payload[0])))?;
        if payload[1] != REPORT_DATA_HEAD {
            return Err(FrameError::schema(format!(
                "report data starts with {:#04x}, expected 0xaa",
                payload[1]
            )));
        }
        if payload[payload.len() - 2..] != REPORT_DATA_TAIL {
            return Err(FrameError::schema("report data does not end with 55 00".to_string()));
        }

        let mut body = &payload[2..payload.len() - 2];
        let basic = Self::parse_basic(&mut body)?;
        let engineering = match report_type {
            ReportType::Basic => None,
            ReportType::Engineering => Some(Self::parse_engineering(&mut body)?),
        };
        Ok(Self { basic, engineering })
    }

    fn parse_basic(body: &mut &[u8]) -> Result<BasicReport, FrameError> {
        if body.len() < 9 {
            return Err(FrameError::truncated(9, body.len()));
        }
        let state = body.get_u8();
        let target_state = TargetState::try_from(state)
            .map_err(|_| FrameError::schema(format!("unknown target state {state:#04x}")))?;
        Ok(BasicReport {
            target_state,
            moving_distance: body.get_u16_le(),
            moving_energy: body.get_u8(),
            static_distance: body.get_u16_le(),
            static_energy: body.get_u8(),
            detection_distance: body.get_u16_le(),
        })
    }

    fn parse_engineering(body: &mut &[u8]) -> Result<EngineeringReport, FrameError> {
        if body.len() < 3 {
            return Err(FrameError::truncated(3, body.len()));
        }
        let max_gate = body.get_u8();
        let max_moving_gate = body.get_u8();
        let max_static_gate = body.get_u8();

        let gates = usize::from(max_gate) + 1;
        if body.len() < 2 * gates {
            return Err(FrameError::truncated(2 * gates, body.len()));
        }
        let moving_gate_energy = body[..gates].to_vec();
        body.advance(gates);
        let static_gate_energy = body[..gates].to_vec();
        body.advance(gates);

        // Firmwares with a photo sensor append two more bytes.
        let (light_level, out_pin_level) = if body.len() >= 2 {
            let light = body.get_u8();
            let level = body.get_u8();
            let pin = OutPinLevel::try_from(level)
                .map_err(|_| FrameError::schema(format!("unknown OUT pin level {level}")))?;
            (Some(light), Some(pin))
        } else {
            (None, None)
        };

        Ok(EngineeringReport {
            max_gate,
            max_moving_gate,
            max_static_gate,
            moving_gate_energy,
            static_gate_energy,
            light_level,
            out_pin_level,
        })
    }
}
