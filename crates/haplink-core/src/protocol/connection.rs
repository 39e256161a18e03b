//! Connection management
//!
//! Owns one session with one device: the serial channel, the background
//! reader thread, and the telemetry snapshot it publishes. There is no global
//! registry; dropping the [`Connection`] tears the session down.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::command_builder::build_feedback_packet;
use super::frame::{DecodedFrame, FrameDecoder, RAW_FRAME_LEN};
use super::serial::{clear_buffers, configure_port, open_port};
use super::stream::{CommunicationChannel, SerialChannel};
use super::{Command, FeedbackParams, LinkError, DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use crate::telemetry::{PositionEvent, TelemetryState};

/// Largest chunk pulled off the port per loop iteration
const READ_CHUNK: usize = 256;

/// Sleep when the port has nothing for us, to avoid busy-spinning
const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// Sleep after a transient transport error before retrying
const ERROR_SLEEP: Duration = Duration::from_millis(10);

/// How long `disconnect` waits for the reader thread before giving up
const STOP_JOIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Queued events per subscriber before new events are dropped for it
const SUBSCRIBER_QUEUE: usize = 256;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connected, reader thread running
    Connected,
    /// Last connect attempt failed
    Error,
}

/// Connection configuration.
///
/// Immutable for the lifetime of an open session; to change anything,
/// disconnect and reconnect (which is exactly what [`Connection::set_port`]
/// does).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port name (e.g. "/dev/ttyACM0" or "COM8")
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-call read timeout in milliseconds
    pub timeout_ms: u64,
    /// Whether the reader loop sends periodic telemetry poll requests
    pub poll_enabled: bool,
    /// Poll request interval in milliseconds
    pub poll_interval_ms: u64,
    /// Accept legacy headerless 14-byte position frames
    pub accept_raw_frames: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_enabled: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            accept_raw_frames: true,
        }
    }
}

impl ConnectionConfig {
    /// Load a configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LinkError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| LinkError::ConfigError(e.to_string()))
    }

    /// Save the configuration to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), LinkError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| LinkError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Cumulative link traffic counters, shared with the reader thread
#[derive(Debug, Default)]
struct LinkCounters {
    tx_bytes: AtomicU64,
    tx_packets: AtomicU64,
    rx_bytes: AtomicU64,
    rx_frames: AtomicU64,
}

/// A session with one haptic device.
///
/// `connect` opens the port and starts the reader loop; consumers then read
/// the latest samples through the accessors (or [`Connection::subscribe`] for
/// a pushed feed) and send commands through the mutex-guarded write path.
pub struct Connection {
    /// Connection configuration
    config: ConnectionConfig,
    /// Current connection state
    state: ConnectionState,
    /// Write half of the channel, shared with the reader loop's poll sender
    writer: Arc<Mutex<Option<Box<dyn CommunicationChannel>>>>,
    /// Telemetry published by the reader loop
    telemetry: Arc<TelemetryState>,
    /// Position-event subscribers
    subscribers: Arc<Mutex<Vec<Sender<PositionEvent>>>>,
    /// Cumulative tx/rx counters
    counters: Arc<LinkCounters>,
    /// Stop flag for the current reader thread
    running: Arc<AtomicBool>,
    /// The reader thread itself
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    /// Create a new connection (not yet connected)
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            writer: Arc::new(Mutex::new(None)),
            telemetry: Arc::new(TelemetryState::new()),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(LinkCounters::default()),
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// List available serial ports
    pub fn list_ports() -> Vec<super::PortInfo> {
        super::serial::list_ports()
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a session is currently open
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The active configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open the configured serial port and start the reader loop
    pub fn connect(&mut self) -> Result<(), LinkError> {
        if self.state == ConnectionState::Connected {
            return Err(LinkError::AlreadyConnected);
        }
        if self.config.port_name.trim().is_empty() {
            return Err(LinkError::ConnectionFailed(
                "no port name configured".to_string(),
            ));
        }

        let mut port = open_port(
            &self.config.port_name,
            self.config.baud_rate,
            Duration::from_millis(self.config.timeout_ms),
        )
        .map_err(|e| {
            self.state = ConnectionState::Error;
            e
        })?;
        configure_port(port.as_mut())?;
        clear_buffers(port.as_mut())?;

        debug!("connected to {}", self.config.port_name);
        self.attach(Box::new(SerialChannel::new(port)))
    }

    /// Start a session over an already-open channel.
    ///
    /// This is how the [`DeviceSimulator`](crate::demo::DeviceSimulator) and
    /// the integration tests drive the full reader loop without hardware.
    pub fn connect_via(
        &mut self,
        channel: Box<dyn CommunicationChannel>,
    ) -> Result<(), LinkError> {
        if self.state == ConnectionState::Connected {
            return Err(LinkError::AlreadyConnected);
        }
        self.attach(channel)
    }

    fn attach(&mut self, channel: Box<dyn CommunicationChannel>) -> Result<(), LinkError> {
        let read_half = channel
            .try_clone()
            .map_err(|e| LinkError::SerialError(e.to_string()))?;

        {
            let mut writer = self
                .writer
                .lock()
                .map_err(|_| LinkError::ConnectionFailed("write lock poisoned".to_string()))?;
            *writer = Some(channel);
        }

        // Fresh snapshot and stop flag per session; counters stay cumulative.
        self.telemetry = Arc::new(TelemetryState::new());
        self.running = Arc::new(AtomicBool::new(true));

        let ctx = ReaderContext {
            channel: read_half,
            writer: Arc::clone(&self.writer),
            telemetry: Arc::clone(&self.telemetry),
            subscribers: Arc::clone(&self.subscribers),
            counters: Arc::clone(&self.counters),
            running: Arc::clone(&self.running),
            poll_enabled: self.config.poll_enabled,
            poll_interval: Duration::from_millis(self.config.poll_interval_ms),
            accept_raw_frames: self.config.accept_raw_frames,
            opened_at: Instant::now(),
        };
        self.reader = Some(
            std::thread::Builder::new()
                .name("haplink-reader".to_string())
                .spawn(move || reader_loop(ctx))?,
        );

        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Close the session.
    ///
    /// Signals the reader loop to stop, waits up to ~200 ms for it, then
    /// releases the port regardless and marks the snapshot invalid. Safe to
    /// call repeatedly. Best-effort by design: a reader thread stuck past the
    /// bound is abandoned (it exits at its next stop-flag check) and its port
    /// handle lives until then — a known, accepted cleanup race.
    pub fn disconnect(&mut self) {
        self.running.store(false, Ordering::Relaxed);

        if let Some(handle) = self.reader.take() {
            let deadline = Instant::now() + STOP_JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("reader thread did not stop within {:?}, releasing port anyway", STOP_JOIN_TIMEOUT);
            }
        }

        if let Ok(mut writer) = self.writer.lock() {
            *writer = None;
        }
        self.telemetry.invalidate();
        self.state = ConnectionState::Disconnected;
    }

    /// Switch to a different port.
    ///
    /// Closes the current session if one is open, then reconnects with the
    /// new identifier. A blank identifier just closes.
    pub fn set_port(&mut self, port_name: &str) -> Result<(), LinkError> {
        if port_name.trim().is_empty() {
            self.config.port_name.clear();
            self.disconnect();
            return Ok(());
        }

        self.disconnect();
        self.config.port_name = port_name.to_string();
        self.connect()
    }

    /// Hand raw bytes to the device.
    ///
    /// Returns `true` iff the bytes reached the transport. The write path is
    /// a single mutex shared with the reader loop's poll sender, so two
    /// concurrent callers never interleave on the wire. No retry policy is
    /// imposed here.
    pub fn send(&self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return false;
        }
        match send_locked(&self.writer, bytes, &self.counters) {
            Ok(()) => true,
            Err(e) => {
                debug!("send of {} bytes failed: {}", bytes.len(), e);
                false
            }
        }
    }

    /// Send a single-byte command
    pub fn send_command(&self, command: Command) -> bool {
        self.send(&[command.wire_byte()])
    }

    /// Trigger device calibration
    pub fn calibrate(&self) -> bool {
        self.send_command(Command::Calibrate)
    }

    /// Push a full feedback parameter set to the device
    pub fn send_feedback(&self, params: &FeedbackParams) -> bool {
        self.send(&build_feedback_packet(params))
    }

    /// Latest decoded position sample (zeroed until the first decode)
    pub fn latest_position(&self) -> crate::telemetry::PositionSample {
        self.telemetry.latest_position()
    }

    /// Latest decoded force sample (zero until the first decode)
    pub fn latest_force(&self) -> crate::telemetry::ForceSample {
        self.telemetry.latest_force()
    }

    /// Whether at least one position frame has decoded this session
    pub fn has_valid_data(&self) -> bool {
        self.telemetry.has_valid_data()
    }

    /// Shared handle to the telemetry snapshot, for consumers that poll it
    /// on their own schedule (e.g. a renderer reading once per frame).
    pub fn telemetry(&self) -> Arc<TelemetryState> {
        Arc::clone(&self.telemetry)
    }

    /// Subscribe to the position feed.
    ///
    /// Delivers one time-stamped event per successfully decoded position
    /// frame (headered or legacy raw — they share the dispatch path; force
    /// frames never notify). Events are dropped for a subscriber whose queue
    /// is full; telemetry is lossy-tolerant. The subscription survives
    /// reconnects.
    pub fn subscribe(&self) -> Receiver<PositionEvent> {
        let (tx, rx) = bounded(SUBSCRIBER_QUEUE);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Cumulative (tx_bytes, rx_bytes, tx_packets, rx_frames) counters
    pub fn counters(&self) -> (u64, u64, u64, u64) {
        (
            self.counters.tx_bytes.load(Ordering::Relaxed),
            self.counters.rx_bytes.load(Ordering::Relaxed),
            self.counters.tx_packets.load(Ordering::Relaxed),
            self.counters.rx_frames.load(Ordering::Relaxed),
        )
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Write under the shared lock. The per-call transport timeout is already
/// configured, so the lock is never held across an unbounded block.
fn send_locked(
    writer: &Mutex<Option<Box<dyn CommunicationChannel>>>,
    bytes: &[u8],
    counters: &LinkCounters,
) -> Result<(), LinkError> {
    let mut guard = writer.lock().map_err(|_| LinkError::NotConnected)?;
    let channel = guard.as_mut().ok_or(LinkError::NotConnected)?;
    channel
        .write_all(bytes)
        .map_err(|e| LinkError::SerialError(e.to_string()))?;
    channel
        .flush()
        .map_err(|e| LinkError::SerialError(e.to_string()))?;
    counters.tx_bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
    counters.tx_packets.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

/// Everything the reader thread owns or shares
struct ReaderContext {
    channel: Box<dyn CommunicationChannel>,
    writer: Arc<Mutex<Option<Box<dyn CommunicationChannel>>>>,
    telemetry: Arc<TelemetryState>,
    subscribers: Arc<Mutex<Vec<Sender<PositionEvent>>>>,
    counters: Arc<LinkCounters>,
    running: Arc<AtomicBool>,
    poll_enabled: bool,
    poll_interval: Duration,
    accept_raw_frames: bool,
    opened_at: Instant,
}

/// The reader loop: poll cadence, bounded reads, byte-at-a-time decode,
/// publication. Runs until the stop flag clears; transient I/O errors never
/// tear it down.
fn reader_loop(mut ctx: ReaderContext) {
    let mut decoder = FrameDecoder::new(ctx.accept_raw_frames);
    let mut buf = [0u8; READ_CHUNK];
    // None = never polled; the first iteration sends immediately so the
    // first sample does not wait out a full interval.
    let mut last_poll: Option<Instant> = None;

    trace!("reader loop started");

    while ctx.running.load(Ordering::Relaxed) {
        if ctx.poll_enabled {
            let due = last_poll.map_or(true, |t| t.elapsed() >= ctx.poll_interval);
            let pending = ctx.channel.bytes_to_read().unwrap_or(0) as usize;
            // Only re-request when the device is not already mid-burst:
            // less than one frame's worth of bytes pending.
            if due && pending < RAW_FRAME_LEN {
                // A failed poll send is not fatal; next interval retries.
                if let Err(e) = send_locked(
                    &ctx.writer,
                    &[Command::PollTelemetry.wire_byte()],
                    &ctx.counters,
                ) {
                    trace!("poll request failed: {}", e);
                }
                last_poll = Some(Instant::now());
            }
        }

        let available = match ctx.channel.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                debug!("bytes_to_read failed: {}, retrying", e);
                std::thread::sleep(ERROR_SLEEP);
                continue;
            }
        };
        if available == 0 {
            std::thread::sleep(IDLE_SLEEP);
            continue;
        }

        let to_read = available.min(READ_CHUNK);
        match ctx.channel.read(&mut buf[..to_read]) {
            Ok(0) => std::thread::sleep(IDLE_SLEEP),
            Ok(n) => {
                ctx.counters.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);
                for &byte in &buf[..n] {
                    if let Some(frame) = decoder.feed(byte) {
                        publish(&ctx, frame);
                    }
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // Expected with a short port timeout; nothing arrived.
            }
            Err(e) => {
                debug!("read failed: {}, retrying", e);
                std::thread::sleep(ERROR_SLEEP);
            }
        }
    }

    trace!("reader loop stopped");
}

fn publish(ctx: &ReaderContext, frame: DecodedFrame) {
    match frame {
        DecodedFrame::Position { sample, .. } => {
            ctx.telemetry.publish_position(sample);
            ctx.counters.rx_frames.fetch_add(1, Ordering::Relaxed);

            let event = PositionEvent {
                timestamp: ctx.opened_at.elapsed(),
                sample,
            };
            if let Ok(mut subs) = ctx.subscribers.lock() {
                subs.retain(|tx| match tx.try_send(event) {
                    Ok(()) => true,
                    // Lagging subscriber: drop this event for it, keep it
                    Err(TrySendError::Full(_)) => true,
                    Err(TrySendError::Disconnected(_)) => false,
                });
            }
        }
        DecodedFrame::Force(sample) => {
            // Force updates are silent: no validity change, no event.
            ctx.telemetry.publish_force(sample);
            ctx.counters.rx_frames.fetch_add(1, Ordering::Relaxed);
        }
    }
}
