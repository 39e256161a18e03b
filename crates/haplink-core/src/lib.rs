//! # HapLink Core Library
//!
//! Host-side link to Hapkit-class haptic devices.
//!
//! This library provides:
//! - Serial protocol communication with the device (framed position/force
//!   telemetry in, commands and feedback parameters out)
//! - A background reader loop per open connection, publishing a lock-free
//!   telemetry snapshot and a time-stamped position feed
//! - Trajectory recording with caller-triggered CSV export
//! - A simulated device for development and testing without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use haplink_core::protocol::{Connection, ConnectionConfig};
//!
//! let mut conn = Connection::new(ConnectionConfig {
//!     port_name: "/dev/ttyACM0".to_string(),
//!     ..ConnectionConfig::default()
//! });
//! conn.connect()?;
//!
//! // Read the latest telemetry whenever it suits the caller
//! if conn.has_valid_data() {
//!     let pos = conn.latest_position();
//!     println!("x = {:.1} mm", pos.x_mm());
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod datalog;
pub mod demo;
pub mod protocol;
pub mod telemetry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::datalog::{write_csv, TrajectoryEntry, TrajectoryRecorder};
    pub use crate::demo::DeviceSimulator;
    pub use crate::protocol::{
        Command, Connection, ConnectionConfig, ConnectionState, FeedbackParams, LinkError,
    };
    pub use crate::telemetry::{
        ForceSample, PositionEvent, PositionSample, Sign, TelemetryState,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
