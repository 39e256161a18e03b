//! Serial device communication
//!
//! Implements the haptic device's serial protocol: framed position/force
//! telemetry in, single-byte and parameter-packet commands out, with a
//! dedicated reader thread per open connection.

pub mod command_builder;
pub mod commands;
mod connection;
mod error;
pub mod frame;
pub mod serial;
mod stream;

pub use command_builder::{build_feedback_packet, parse_feedback_packet};
pub use commands::{Command, FeedbackParams};
pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use error::LinkError;
pub use frame::{DecodedFrame, FrameClass, FrameDecoder, Framing};
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};
pub use stream::{CommunicationChannel, SerialChannel};

/// Default baud rate for the device link
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default per-call read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 50;

/// Default telemetry poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 20;
