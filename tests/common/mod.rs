//! In-process emulated LD2410 used by the integration tests.
//!
//! The emulator sits on the far side of a `tokio::io::duplex` pipe and
//! behaves like a device: it answers commands with acks, suspends reports
//! while configuration mode is active, and emits reports on a timer
//! otherwise. Tests tweak its behaviour through [`EmulatorOptions`] to
//! provoke timeouts, failure statuses and restarts.

#![allow(dead_code)]

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::FramedRead;

use ld2410_tokio::frame::{Frame, FrameCodec};
use ld2410_tokio::{ConnectOptions, LD2410};

pub const FIRMWARE_REPLY: [u8; 8] = [0x01, 0x00, 0x02, 0x04, 0x11, 0x25, 0x02, 0x23];
pub const MAC_ADDRESS: [u8; 6] = [0x8F, 0x27, 0x2E, 0xB8, 0x0F, 0x65];

#[derive(Debug, Clone)]
pub struct EmulatorOptions {
    /// How often a report is emitted outside configuration mode.
    pub report_interval: Duration,
    /// Whether reports are emitted at all.
    pub auto_reports: bool,
    /// When set, each report's distances grow by one so tests can assert
    /// ordering; otherwise every report carries the fixed 120 cm target.
    pub counting_reports: bool,
    /// Commands (by opcode) the device stays silent on.
    pub ignore: Vec<u16>,
    /// Commands (by opcode) the device acks with a failure status.
    pub fail: Vec<u16>,
    /// Options for the client side of the pipe.
    pub connect: ConnectOptions,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_millis(20),
            auto_reports: true,
            counting_reports: false,
            ignore: Vec::new(),
            fail: Vec::new(),
            connect: ConnectOptions::default(),
        }
    }
}

pub struct Emulator {
    handle: JoinHandle<()>,
}

impl Emulator {
    /// Kill the device side, closing the transport under the client.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

/// Capture the library's tracing output (`RUST_LOG` to widen it) so frame
/// resyncs and dropped acks show up when a test run is being debugged.
/// `try_init` keeps this idempotent across tests sharing the binary.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Spawn an emulated device and a client connected to it.
pub fn connect(options: EmulatorOptions) -> (LD2410, Emulator) {
    init_tracing();
    let (client_io, device_io) = tokio::io::duplex(4096);
    let client =
        LD2410::from_transport(client_io, options.connect.clone()).expect("client spawns");
    let handle = tokio::spawn(run_device(device_io, options));
    (client, Emulator { handle })
}

pub fn connect_default() -> (LD2410, Emulator) {
    connect(EmulatorOptions::default())
}

struct DeviceState {
    configuring: bool,
    engineering: bool,
    max_distance_gate: u8,
    max_moving_gate: u8,
    max_static_gate: u8,
    moving_sensitivity: [u8; 9],
    static_sensitivity: [u8; 9],
    presence_timeout: u16,
    resolution: u16,
    light: [u8; 3],
    reports_sent: u16,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            configuring: false,
            engineering: false,
            max_distance_gate: 8,
            max_moving_gate: 8,
            max_static_gate: 8,
            moving_sensitivity: [50; 9],
            static_sensitivity: [40; 9],
            presence_timeout: 5,
            resolution: 0,
            light: [0, 128, 0],
            reports_sent: 0,
        }
    }
}

enum Action {
    Reply(Bytes),
    Silent,
    ReplyThenClose(Bytes),
}

async fn run_device(device_io: tokio::io::DuplexStream, options: EmulatorOptions) {
    let (read_half, mut writer) = tokio::io::split(device_io);
    let mut frames = FramedRead::new(read_half, FrameCodec::new());
    let mut state = DeviceState::default();

    let mut ticker = tokio::time::interval(options.report_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if options.auto_reports && !state.configuring {
                    let frame = Frame::report(report_payload(&state, &options));
                    state.reports_sent = state.reports_sent.wrapping_add(1);
                    if write_frame(&mut writer, frame).await.is_err() {
                        break;
                    }
                }
            }
            frame = frames.next() => {
                let Some(Ok(frame)) = frame else { break };
                let Frame::Command(payload) = frame else { continue };
                match handle_command(&mut state, payload, &options) {
                    Action::Reply(data) => {
                        if write_frame(&mut writer, Frame::Command(data)).await.is_err() {
                            break;
                        }
                    }
                    Action::Silent => {}
                    Action::ReplyThenClose(data) => {
                        let _ = write_frame(&mut writer, Frame::Command(data)).await;
                        break;
                    }
                }
            }
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: Frame) -> std::io::Result<()> {
    writer.write_all(&frame.to_bytes()).await?;
    writer.flush().await
}

fn ack(code: u16, status: u16, data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + data.len());
    buf.put_u16_le(code | 0x0100);
    buf.put_u16_le(status);
    buf.put_slice(data);
    buf.freeze()
}

fn handle_command(state: &mut DeviceState, mut payload: Bytes, options: &EmulatorOptions) -> Action {
    if payload.len() < 2 {
        return Action::Silent;
    }
    let code = payload.get_u16_le();
    if options.ignore.contains(&code) {
        return Action::Silent;
    }
    if options.fail.contains(&code) {
        return Action::Reply(ack(code, 1, &[]));
    }

    match code {
        // enter config
        0x00FF => {
            state.configuring = true;
            Action::Reply(ack(code, 0, &[0x01, 0x00, 0x40, 0x00]))
        }
        // leave config
        0x00FE => {
            state.configuring = false;
            Action::Reply(ack(code, 0, &[]))
        }
        // set parameters
        0x0060 => {
            payload.advance(2);
            state.max_distance_gate = payload.get_u32_le() as u8;
            payload.advance(2);
            state.max_moving_gate = payload.get_u32_le() as u8;
            payload.advance(2);
            state.max_static_gate = payload.get_u32_le() as u8;
            payload.advance(2);
            state.presence_timeout = payload.get_u32_le() as u16;
            Action::Reply(ack(code, 0, &[]))
        }
        // get parameters
        0x0061 => {
            let mut data = BytesMut::with_capacity(24);
            data.put_u8(0xAA);
            data.put_u8(state.max_distance_gate);
            data.put_u8(state.max_moving_gate);
            data.put_u8(state.max_static_gate);
            data.put_slice(&state.moving_sensitivity);
            data.put_slice(&state.static_sensitivity);
            data.put_u16_le(state.presence_timeout);
            Action::Reply(ack(code, 0, &data))
        }
        // engineering mode on/off
        0x0062 => {
            state.engineering = true;
            Action::Reply(ack(code, 0, &[]))
        }
        0x0063 => {
            state.engineering = false;
            Action::Reply(ack(code, 0, &[]))
        }
        // gate sensitivity
        0x0064 => {
            payload.advance(2);
            let gate = payload.get_u32_le();
            payload.advance(2);
            let moving = payload.get_u32_le() as u8;
            payload.advance(2);
            let stationary = payload.get_u32_le() as u8;
            if gate == 0xFFFF_FFFF {
                for index in 0..=usize::from(state.max_distance_gate) {
                    state.moving_sensitivity[index] = moving;
                    state.static_sensitivity[index] = stationary;
                }
            } else if gate <= 8 {
                state.moving_sensitivity[gate as usize] = moving;
                state.static_sensitivity[gate as usize] = stationary;
            } else {
                return Action::Reply(ack(code, 1, &[]));
            }
            Action::Reply(ack(code, 0, &[]))
        }
        // firmware version
        0x00A0 => Action::Reply(ack(code, 0, &FIRMWARE_REPLY)),
        // baud rate, factory reset, bluetooth mode, bluetooth password
        0x00A1 | 0x00A4 | 0x00A9 => Action::Reply(ack(code, 0, &[])),
        0x00A2 => {
            *state = DeviceState {
                configuring: state.configuring,
                reports_sent: state.reports_sent,
                ..DeviceState::default()
            };
            Action::Reply(ack(code, 0, &[]))
        }
        // restart: ack, then the transport goes away
        0x00A3 => Action::ReplyThenClose(ack(code, 0, &[])),
        // mac address
        0x00A5 => Action::Reply(ack(code, 0, &MAC_ADDRESS)),
        // distance resolution
        0x00AA => {
            state.resolution = payload.get_u16_le();
            Action::Reply(ack(code, 0, &[]))
        }
        0x00AB => Action::Reply(ack(code, 0, &state.resolution.to_le_bytes())),
        // light control
        0x00AD => {
            state.light = [payload.get_u8(), payload.get_u8(), payload.get_u8()];
            Action::Reply(ack(code, 0, &[]))
        }
        0x00AE => {
            let [function, threshold, level] = state.light;
            Action::Reply(ack(code, 0, &[function, threshold, level, 0x00]))
        }
        _ => Action::Reply(ack(code, 1, &[])),
    }
}

fn report_payload(state: &DeviceState, options: &EmulatorOptions) -> Bytes {
    let distance = if options.counting_reports {
        120 + state.reports_sent
    } else {
        120
    };

    let mut payload = BytesMut::with_capacity(64);
    payload.put_u8(if state.engineering { 0x01 } else { 0x02 });
    payload.put_u8(0xAA);
    payload.put_u8(0x01); // moving target
    payload.put_u16_le(distance);
    payload.put_u8(42);
    payload.put_u16_le(0);
    payload.put_u8(0);
    payload.put_u16_le(distance);
    if state.engineering {
        payload.put_u8(8);
        payload.put_u8(state.max_moving_gate);
        payload.put_u8(state.max_static_gate);
        payload.put_slice(&[10, 20, 30, 40, 50, 60, 70, 80, 90]);
        payload.put_slice(&[9, 8, 7, 6, 5, 4, 3, 2, 1]);
        payload.put_u8(0x78); // light level
        payload.put_u8(0x00); // OUT pin low
    }
    payload.put_slice(&[0x55, 0x00]);
    payload.freeze()
}
