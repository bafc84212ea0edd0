//! # ld2410-tokio
//!
//! Async Tokio client for the Hi-Link LD2410 family of 24 GHz presence
//! radar sensors (LD2410, LD2410B, LD2410C).
//!
//! The sensor speaks a binary framed protocol over UART (default 256000
//! baud, 8N1) and multiplexes two frame dialects on the same bytestream:
//!
//! - **Report frames** (radar → host, ~10 Hz): head `F4 F3 F2 F1`,
//!   `u16le` length, payload ending in `55 00`, trailer `F8 F7 F6 F5`.
//! - **Command/ack frames** (host ↔ radar): head `FD FC FB FA`, `u16le`
//!   length, `code:u16le` plus arguments, trailer `04 03 02 01`.
//!
//! There is no CRC; integrity comes from framing, length and trailer.
//! Commands are only accepted in *configuration mode*, during which the
//! device suspends reports; acks carry the request code ORed with `0x0100`
//! and a status word.
//!
//! ## Quick start
//!
//! ```no_run
//! use ld2410_tokio::{GateSelect, LD2410};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ld2410_tokio::Error> {
//!     let radar = LD2410::open("/dev/ttyUSB0").await?;
//!
//!     // Commands require an exclusive configuration session.
//!     let config = radar.configure().await?;
//!     println!("firmware {}", config.get_firmware_version().await?);
//!     config.set_gate_sensitivity(GateSelect::All, 40, 40).await?;
//!     config.exit().await?;
//!
//!     // Reports resume as soon as configuration mode is left.
//!     let mut reports = radar.subscribe();
//!     while let Some(report) = reports.recv().await {
//!         println!("{:?} at {} cm", report.basic.target_state, report.basic.detection_distance);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`frame`] — the two wire-frame dialects and the resynchronising codec
//! - [`command`] — command/ack payload schemas
//! - [`report`] — basic and engineering report payloads
//! - [`types`] — value objects exposed by the façade
//! - [`device`] — session engine, configuration session and façade
//!
//! Out of scope by design: auto-reconnect, device discovery, concurrent
//! multi-session access to a single device, and the LD2410S variant (it
//! speaks a different protocol).

pub mod command;
mod dispatch;
pub mod device;
pub mod error;
pub mod frame;
pub mod report;
pub mod types;

pub use command::{Ack, Command, CommandCode};
pub use device::{
    ConfigSession, ConnectOptions, SessionState, DEFAULT_BAUD_RATE, DEFAULT_COMMAND_TIMEOUT,
    DEFAULT_REPORT_QUEUE_SIZE, LD2410, MAX_ENERGY, MAX_GATE,
};
pub use dispatch::ReportSubscription;
pub use error::{Error, FrameError, Result};
pub use frame::{Frame, FrameCodec};
pub use report::{BasicReport, EngineeringReport, Report, ReportType, TargetState};
pub use types::{
    BaudRate, ConfigModeStatus, DistanceResolution, FirmwareVersion, GateSelect, LightControl,
    LightFunction, MacAddress, OutPinLevel, Parameters, ParametersConfig,
};
