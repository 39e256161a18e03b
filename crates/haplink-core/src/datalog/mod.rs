//! Trajectory logging
//!
//! Records the time-stamped position feed and exports it on demand. This is
//! the only persistence in the crate, and it only happens when the caller
//! asks for it.

mod format;
mod recorder;

pub use format::write_csv;
pub use recorder::TrajectoryRecorder;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::telemetry::PositionEvent;

/// One recorded trajectory point, signs already applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryEntry {
    /// Time since the session opened
    pub timestamp: Duration,
    /// Signed x, tenths of a millimetre
    pub x: i32,
    /// Signed y, tenths of a millimetre
    pub y: i32,
    /// Z, tenths of a millimetre
    pub z: i32,
}

impl From<PositionEvent> for TrajectoryEntry {
    fn from(event: PositionEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            x: event.sample.signed_x(),
            y: event.sample.signed_y(),
            z: event.sample.z,
        }
    }
}
