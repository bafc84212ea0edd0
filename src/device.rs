//! Session engine and public façade for one LD2410 device.
//!
//! One session owns the transport for its whole life: a dedicated reader
//! task turns the inbound bytestream into frames, routing acks to the
//! pending-reply queue and reports to the distributor, while all command
//! writes are serialised behind a single mutex. Configuration commands are
//! only reachable through [`ConfigSession`], so the mode interlock is
//! enforced by the type system rather than checked per call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::command::{Ack, Command, CommandCode};
use crate::dispatch::{report_channel, ReportSink, ReportSubscription, ReportTaps};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameCodec};
use crate::report::Report;
use crate::types::{
    BaudRate, ConfigModeStatus, DistanceResolution, FirmwareVersion, GateSelect, LightControl,
    MacAddress, Parameters, ParametersConfig,
};

pub const DEFAULT_BAUD_RATE: u32 = 256_000;
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_REPORT_QUEUE_SIZE: usize = 64;

/// Highest gate index any LD2410 variant exposes.
pub const MAX_GATE: u8 = 8;

/// Highest per-gate energy/sensitivity value, percent.
pub const MAX_ENERGY: u8 = 100;

/// How many acks may sit unclaimed before the reader drops new ones. The
/// device is strictly request/reply, so more than one means something is
/// already off the rails.
const REPLY_QUEUE_SIZE: usize = 8;

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Initial serial speed.
    pub baud_rate: u32,
    /// How long to wait for a command ack.
    pub command_timeout: Duration,
    /// Per-subscriber report queue depth (drop-oldest beyond this).
    pub report_queue_size: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            report_queue_size: DEFAULT_REPORT_QUEUE_SIZE,
        }
    }
}

impl ConnectOptions {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    pub fn with_report_queue_size(mut self, report_queue_size: usize) -> Self {
        self.report_queue_size = report_queue_size;
        self
    }
}

/// Coarse view of where a session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Configuring,
}

/// Writer plus pending-reply queue, guarded together so command issuance is
/// totally ordered and no two writes interleave on the wire.
struct CommandIo {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    replies: mpsc::Receiver<Ack>,
}

struct Shared {
    options: ConnectOptions,
    io: Mutex<CommandIo>,
    taps: ReportTaps,
    config_lock: Arc<Mutex<()>>,
    restart_pending: AtomicBool,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.taps.is_closed()
    }
}

/// Async client for one LD2410 presence radar.
///
/// ```no_run
/// use ld2410_tokio::LD2410;
///
/// # async fn example() -> Result<(), ld2410_tokio::Error> {
/// let radar = LD2410::open("/dev/ttyUSB0").await?;
///
/// let config = radar.configure().await?;
/// let version = config.get_firmware_version().await?;
/// println!("firmware {version}");
/// config.exit().await?;
///
/// let report = radar.next_report().await?;
/// println!("target at {} cm", report.basic.detection_distance);
/// # Ok(())
/// # }
/// ```
pub struct LD2410 {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl LD2410 {
    /// Open a serial session with the default options (256000 baud 8N1).
    pub async fn open(path: &str) -> Result<Self> {
        Self::open_with_options(path, ConnectOptions::default()).await
    }

    /// Open a serial session with explicit options.
    pub async fn open_with_options(path: &str, options: ConnectOptions) -> Result<Self> {
        let port = tokio_serial::new(path, options.baud_rate)
            .open_native_async()
            .map_err(|err| Error::Connection(std::io::Error::new(std::io::ErrorKind::Other, err)))?;
        Self::from_transport(port, options)
    }

    /// Build a session on any byte transport.
    ///
    /// This is how tests drive the client against an in-memory emulated
    /// device, and how unusual transports (PTYs, TCP-serial bridges) can be
    /// plugged in.
    pub fn from_transport<T>(transport: T, options: ConnectOptions) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let (reply_tx, reply_rx) = mpsc::channel(REPLY_QUEUE_SIZE);
        let (sink, taps) = report_channel(options.report_queue_size);
        let restart_pending = AtomicBool::new(false);

        let shared = Arc::new(Shared {
            options,
            io: Mutex::new(CommandIo {
                writer: Box::new(write_half),
                replies: reply_rx,
            }),
            taps,
            config_lock: Arc::new(Mutex::new(())),
            restart_pending,
        });

        let reader = tokio::spawn(reader_task(
            FramedRead::new(read_half, FrameCodec::new()),
            reply_tx,
            sink,
            shared.clone(),
        ));

        Ok(Self { shared, reader })
    }

    /// Whether the session is still receiving frames.
    pub fn is_connected(&self) -> bool {
        !self.shared.is_closed()
    }

    /// Where the session currently stands.
    pub fn state(&self) -> SessionState {
        if self.shared.is_closed() {
            SessionState::Disconnected
        } else if self.shared.config_lock.try_lock().is_err() {
            SessionState::Configuring
        } else {
            SessionState::Connected
        }
    }

    /// Enter configuration mode.
    ///
    /// Reports are suspended by the device for the whole span; they resume
    /// within one device period (~100 ms) of leaving. Fails with
    /// [`Error::CommandContext`] if a configuration session is already
    /// active — the mode is strictly exclusive, entry does not nest or
    /// queue.
    ///
    /// Call [`ConfigSession::exit`] to leave cleanly; if the session is
    /// dropped instead, leave-config is still sent on a best-effort basis
    /// and any failure is logged rather than raised.
    pub async fn configure(&self) -> Result<ConfigSession<'_>> {
        let permit = self
            .shared
            .config_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| Error::CommandContext("configuration mode is already active"))?;

        let ack = self.request(Command::EnterConfig).await?;
        let status = ConfigModeStatus::parse(&ack.data)?;
        debug!(
            protocol_version = status.protocol_version,
            buffer_size = status.buffer_size,
            "entered configuration mode"
        );

        Ok(ConfigSession {
            device: self,
            status,
            permit: Some(permit),
            restarted: false,
            exited: false,
        })
    }

    /// The most recent report, if any arrived yet.
    ///
    /// Not async and never fails; after a long configuration span this can
    /// be quite stale.
    pub fn last_report(&self) -> Option<Report> {
        self.shared.taps.last()
    }

    /// Wait for the next report to arrive.
    pub async fn next_report(&self) -> Result<Report> {
        self.shared.taps.next().await
    }

    /// Subscribe to the report stream.
    ///
    /// Every report arriving after this call is queued for the subscriber,
    /// in arrival order, up to the configured queue depth; beyond that the
    /// oldest entries are dropped rather than stalling ingest.
    pub fn subscribe(&self) -> ReportSubscription {
        self.shared.taps.subscribe()
    }

    async fn request(&self, command: Command) -> Result<Ack> {
        request_on(&self.shared, command, self.shared.options.command_timeout).await
    }
}

impl Drop for LD2410 {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn reader_task<R>(
    mut frames: FramedRead<R, FrameCodec>,
    replies: mpsc::Sender<Ack>,
    reports: ReportSink,
    shared: Arc<Shared>,
) where
    R: AsyncRead + Unpin,
{
    while let Some(item) = frames.next().await {
        match item {
            Ok(Frame::Command(payload)) => match Ack::parse(payload) {
                Ok(ack) => {
                    if let Err(err) = replies.try_send(ack) {
                        warn!(%err, "dropping ack nobody is waiting for");
                    }
                }
                Err(err) => warn!(%err, "ignoring unparseable ack payload"),
            },
            Ok(Frame::Report(payload)) => match Report::parse(&payload) {
                Ok(report) => reports.publish(report),
                Err(err) => warn!(%err, "ignoring malformed report"),
            },
            Err(err) => {
                warn!(%err, "serial read failed, closing session");
                break;
            }
        }
    }

    if shared.restart_pending.load(Ordering::Relaxed) {
        info!("transport closed after module restart");
    } else {
        debug!("frame stream ended");
    }
    // The reply and report senders drop here; every waiter observes the
    // closure through its channel.
}

async fn request_on(shared: &Shared, command: Command, reply_timeout: Duration) -> Result<Ack> {
    let code = command.code();
    let mut io = shared.io.lock().await;
    if shared.is_closed() {
        return Err(Error::Disconnected);
    }

    // A caller cancelled mid-await leaves its ack behind; consume it quietly
    // so the slot is free again.
    while let Ok(stale) = io.replies.try_recv() {
        debug!(code = ?stale.code, "discarding stale ack");
    }

    let wire = Frame::command(command.encode()).to_bytes();
    io.writer.write_all(&wire).await?;
    io.writer.flush().await?;

    let ack = timeout(reply_timeout, await_matching_ack(&mut io.replies, code)).await??;
    if !ack.is_success() {
        return Err(Error::CommandStatus {
            code,
            status: ack.status,
        });
    }
    Ok(ack)
}

async fn await_matching_ack(replies: &mut mpsc::Receiver<Ack>, code: CommandCode) -> Result<Ack> {
    loop {
        match replies.recv().await {
            None => return Err(Error::Disconnected),
            Some(ack) if ack.code == code => return Ok(ack),
            // The device never interleaves commands; anything else is noise.
            Some(ack) => warn!(got = ?ack.code, expected = ?code, "dropping mismatched ack"),
        }
    }
}

/// Exclusive configuration-mode session.
///
/// All mode-gated operations live here, so issuing a command outside
/// configuration mode is a compile error rather than a runtime one. The
/// session is not `Clone` and the engine refuses to open a second one while
/// this exists.
pub struct ConfigSession<'a> {
    device: &'a LD2410,
    status: ConfigModeStatus,
    permit: Option<OwnedMutexGuard<()>>,
    restarted: bool,
    exited: bool,
}

impl std::fmt::Debug for ConfigSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSession")
            .field("status", &self.status)
            .field("restarted", &self.restarted)
            .field("exited", &self.exited)
            .finish()
    }
}

impl ConfigSession<'_> {
    /// Protocol information returned by the enter-config handshake.
    pub fn status(&self) -> ConfigModeStatus {
        self.status
    }

    /// Leave configuration mode.
    ///
    /// After a [`restart_module`](Self::restart_module) this is a no-op:
    /// the device is already rebooting and no leave-config is owed.
    pub async fn exit(mut self) -> Result<()> {
        if self.restarted {
            self.exited = true;
            return Ok(());
        }
        // `exited` flips only once the request has run its course, so a
        // cancelled exit still gets the best-effort leave from `Drop`.
        let result = self.device.request(Command::LeaveConfig).await.map(drop);
        self.exited = true;
        result
    }

    /// Read the standard detection parameters.
    pub async fn get_parameters(&self) -> Result<Parameters> {
        let ack = self.request(Command::GetParameters).await?;
        Ok(Parameters::parse(&ack.data)?)
    }

    /// Write the standard detection parameters.
    ///
    /// Applies immediately and persists across restarts.
    pub async fn set_parameters(&self, config: ParametersConfig) -> Result<()> {
        if config.max_distance_gate > MAX_GATE {
            return Err(Error::CommandParam(format!(
                "max_distance_gate {} exceeds gate {MAX_GATE}",
                config.max_distance_gate
            )));
        }
        if config.max_moving_gate > config.max_distance_gate {
            return Err(Error::CommandParam(format!(
                "max_moving_gate {} exceeds max_distance_gate {}",
                config.max_moving_gate, config.max_distance_gate
            )));
        }
        if config.max_static_gate > config.max_distance_gate {
            return Err(Error::CommandParam(format!(
                "max_static_gate {} exceeds max_distance_gate {}",
                config.max_static_gate, config.max_distance_gate
            )));
        }
        self.request(Command::SetParameters(config)).await.map(drop)
    }

    /// Set sensitivity thresholds for one gate, or all of them at once.
    ///
    /// Applies immediately and persists across restarts.
    pub async fn set_gate_sensitivity(
        &self,
        gate: GateSelect,
        moving_threshold: u8,
        static_threshold: u8,
    ) -> Result<()> {
        if let GateSelect::Gate(index) = gate {
            if index > MAX_GATE {
                return Err(Error::CommandParam(format!(
                    "gate {index} exceeds gate {MAX_GATE}"
                )));
            }
        }
        if moving_threshold > MAX_ENERGY || static_threshold > MAX_ENERGY {
            return Err(Error::CommandParam(format!(
                "sensitivity {moving_threshold}/{static_threshold} exceeds {MAX_ENERGY} percent"
            )));
        }
        self.request(Command::SetGateSensitivity {
            gate,
            moving_threshold,
            static_threshold,
        })
        .await
        .map(drop)
    }

    /// Switch engineering reports on or off.
    ///
    /// The setting is lost on restart. Subsequent reports change layout
    /// within one device period.
    pub async fn set_engineering_mode(&self, enabled: bool) -> Result<()> {
        self.request(Command::SetEngineeringMode(enabled)).await.map(drop)
    }

    pub async fn get_firmware_version(&self) -> Result<FirmwareVersion> {
        let ack = self.request(Command::GetFirmwareVersion).await?;
        Ok(FirmwareVersion::parse(&ack.data)?)
    }

    /// Switch the serial speed. Takes effect after a module restart.
    pub async fn set_baud_rate(&self, rate: BaudRate) -> Result<()> {
        self.request(Command::SetBaudRate(rate)).await.map(drop)
    }

    /// Reset every parameter to factory defaults. Takes effect after a
    /// module restart.
    pub async fn reset_to_factory(&self) -> Result<()> {
        self.request(Command::FactoryReset).await.map(drop)
    }

    /// Restart the module.
    ///
    /// The device acks and then drops off the bus to re-enumerate, so the
    /// transport is expected to die shortly after. This session stops
    /// accepting commands (further calls fail with
    /// [`Error::ModuleRestarted`]); [`exit`](Self::exit) it and open a new
    /// connection once the module is back (upwards of a second).
    pub async fn restart_module(&mut self) -> Result<()> {
        self.request(Command::RestartModule).await?;
        self.device
            .shared
            .restart_pending
            .store(true, Ordering::Relaxed);
        self.restarted = true;
        Ok(())
    }

    /// Enable or disable the bluetooth radio. Takes effect after a module
    /// restart.
    pub async fn set_bluetooth_mode(&self, enabled: bool) -> Result<()> {
        self.request(Command::SetBluetoothMode(enabled)).await.map(drop)
    }

    /// The module's bluetooth MAC address; all zeroes when the variant has
    /// no bluetooth chip.
    pub async fn get_mac_address(&self) -> Result<MacAddress> {
        let ack = self.request(Command::GetMacAddress).await?;
        Ok(MacAddress::parse(&ack.data)?)
    }

    /// Set the bluetooth pairing password: exactly six ASCII characters.
    pub async fn set_bluetooth_password(&self, password: &str) -> Result<()> {
        if password.len() != 6 || !password.is_ascii() {
            return Err(Error::CommandParam(
                "bluetooth password must be exactly 6 ASCII characters".to_string(),
            ));
        }
        let mut raw = [0u8; 6];
        raw.copy_from_slice(password.as_bytes());
        self.request(Command::SetBluetoothPassword(raw)).await.map(drop)
    }

    /// Set the gate width. Takes effect after a module restart.
    pub async fn set_distance_resolution(&self, resolution: DistanceResolution) -> Result<()> {
        self.request(Command::SetDistanceResolution(resolution))
            .await
            .map(drop)
    }

    /// Read the gate width.
    ///
    /// Known device quirk: after [`set_distance_resolution`](Self::set_distance_resolution)
    /// this may already report the pending value even though it only takes
    /// effect after the restart.
    pub async fn get_distance_resolution(&self) -> Result<DistanceResolution> {
        let ack = self.request(Command::GetDistanceResolution).await?;
        Ok(DistanceResolution::parse(&ack.data)?)
    }

    /// Configure photo-sensor control of the `OUT` pin.
    ///
    /// Firmwares without the feature reply with a failure status, surfaced
    /// as [`Error::CommandStatus`].
    pub async fn set_light_control(&self, light: LightControl) -> Result<()> {
        self.request(Command::SetLightControl(light)).await.map(drop)
    }

    /// Read the photo-sensor control configuration.
    pub async fn get_light_control(&self) -> Result<LightControl> {
        let ack = self.request(Command::GetLightControl).await?;
        Ok(LightControl::parse(&ack.data)?)
    }

    async fn request(&self, command: Command) -> Result<Ack> {
        if self.restarted {
            return Err(Error::ModuleRestarted);
        }
        self.device.request(command).await
    }
}

impl Drop for ConfigSession<'_> {
    fn drop(&mut self) {
        if self.exited || self.restarted {
            return;
        }
        let shared = self.device.shared.clone();
        let permit = self.permit.take();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("configuration session dropped outside a runtime, leave-config not sent");
            return;
        };
        handle.spawn(async move {
            // Hold the permit until the leave attempt is done so a new
            // configure() cannot race the outgoing leave-config.
            let _permit = permit;
            let reply_timeout = shared.options.command_timeout;
            if let Err(err) = request_on(&shared, Command::LeaveConfig, reply_timeout).await {
                warn!(%err, "best-effort leave-config failed");
            }
        });
    }
}
