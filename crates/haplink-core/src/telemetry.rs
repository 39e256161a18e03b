//! Decoded telemetry samples and the shared snapshot consumers read.
//!
//! The reader thread is the only writer. Every decoded sample is published as
//! one immutable value with a single atomic pointer swap, so a consumer never
//! observes a half-updated sample (e.g. a new x/y/z triple paired with an old
//! sign flag). There is deliberately no atomicity *across* fields: position,
//! force and the validity flag each move on their own schedule.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sign flag carried next to the x and y magnitudes.
///
/// On the wire `1` means positive; the firmware sends `0` for negative but
/// any other value is treated as negative too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    /// Positive direction
    Positive,
    /// Negative direction
    Negative,
}

impl Sign {
    /// Decode a wire sign byte
    pub fn from_wire(byte: u8) -> Self {
        if byte == 1 {
            Sign::Positive
        } else {
            Sign::Negative
        }
    }

    /// Encode back to the wire representation
    pub fn to_wire(self) -> u8 {
        match self {
            Sign::Positive => 1,
            Sign::Negative => 0,
        }
    }
}

/// One decoded position sample.
///
/// `x`, `y`, `z` are magnitudes in tenths of a millimetre; the device reports
/// direction separately via the sign flags (x and y only, z is unsigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSample {
    /// X magnitude, tenths of a millimetre
    pub x: i32,
    /// Y magnitude, tenths of a millimetre
    pub y: i32,
    /// Z value, tenths of a millimetre
    pub z: i32,
    /// Direction of x
    pub sign_x: Sign,
    /// Direction of y
    pub sign_y: Sign,
}

impl PositionSample {
    /// X with the sign flag applied, still in tenths of a millimetre
    pub fn signed_x(&self) -> i32 {
        match self.sign_x {
            Sign::Positive => self.x,
            Sign::Negative => -self.x,
        }
    }

    /// Y with the sign flag applied, still in tenths of a millimetre
    pub fn signed_y(&self) -> i32 {
        match self.sign_y {
            Sign::Positive => self.y,
            Sign::Negative => -self.y,
        }
    }

    /// X in millimetres
    pub fn x_mm(&self) -> f32 {
        self.signed_x() as f32 / 10.0
    }

    /// Y in millimetres
    pub fn y_mm(&self) -> f32 {
        self.signed_y() as f32 / 10.0
    }

    /// Z in millimetres
    pub fn z_mm(&self) -> f32 {
        self.z as f32 / 10.0
    }
}

impl Default for PositionSample {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            sign_x: Sign::Positive,
            sign_y: Sign::Positive,
        }
    }
}

/// One decoded force sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForceSample {
    /// Force reported by the device
    pub value: f32,
}

/// A position sample stamped with the time since the session opened.
///
/// This is what [`Connection::subscribe`](crate::protocol::Connection::subscribe)
/// delivers — one event per successfully decoded position frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionEvent {
    /// Elapsed time since the connection opened
    pub timestamp: Duration,
    /// The decoded sample
    pub sample: PositionSample,
}

/// Latest telemetry, shared between the reader thread and consumers.
///
/// Written only by the reader loop; read lock-free from any thread. Starts
/// invalid and is re-set to invalid when the owning connection closes.
#[derive(Debug, Default)]
pub struct TelemetryState {
    position: ArcSwap<PositionSample>,
    force: ArcSwap<ForceSample>,
    valid: AtomicBool,
}

impl TelemetryState {
    /// Create an empty, invalid snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a freshly decoded position sample and mark the data valid
    pub fn publish_position(&self, sample: PositionSample) {
        self.position.store(Arc::new(sample));
        self.valid.store(true, Ordering::Release);
    }

    /// Publish a freshly decoded force sample.
    ///
    /// Force updates are silent: they touch neither the validity flag nor the
    /// position feed. The firmware streams force opportunistically and the
    /// consumers that care poll it.
    pub fn publish_force(&self, sample: ForceSample) {
        self.force.store(Arc::new(sample));
    }

    /// Latest position sample (zeroed until the first decode)
    pub fn latest_position(&self) -> PositionSample {
        **self.position.load()
    }

    /// Latest force sample (zero until the first decode)
    pub fn latest_force(&self) -> ForceSample {
        **self.force.load()
    }

    /// Whether at least one position frame has decoded since open
    pub fn has_valid_data(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark the snapshot invalid (called on close)
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_from_wire() {
        assert_eq!(Sign::from_wire(1), Sign::Positive);
        assert_eq!(Sign::from_wire(0), Sign::Negative);
        // Anything that is not exactly 1 counts as negative
        assert_eq!(Sign::from_wire(0xFF), Sign::Negative);
    }

    #[test]
    fn test_signed_accessors() {
        let sample = PositionSample {
            x: 100,
            y: 50,
            z: 30,
            sign_x: Sign::Positive,
            sign_y: Sign::Negative,
        };
        assert_eq!(sample.signed_x(), 100);
        assert_eq!(sample.signed_y(), -50);
        assert_eq!(sample.x_mm(), 10.0);
        assert_eq!(sample.y_mm(), -5.0);
        assert_eq!(sample.z_mm(), 3.0);
    }

    #[test]
    fn test_state_starts_invalid() {
        let state = TelemetryState::new();
        assert!(!state.has_valid_data());
        assert_eq!(state.latest_position(), PositionSample::default());
        assert_eq!(state.latest_force().value, 0.0);
    }

    #[test]
    fn test_position_publish_sets_valid() {
        let state = TelemetryState::new();
        let sample = PositionSample {
            x: 1,
            y: 2,
            z: 3,
            sign_x: Sign::Positive,
            sign_y: Sign::Positive,
        };
        state.publish_position(sample);
        assert!(state.has_valid_data());
        assert_eq!(state.latest_position(), sample);
    }

    #[test]
    fn test_force_publish_stays_silent() {
        let state = TelemetryState::new();
        state.publish_force(ForceSample { value: 3.25 });
        assert_eq!(state.latest_force().value, 3.25);
        // A force update alone never validates the snapshot
        assert!(!state.has_valid_data());
    }

    #[test]
    fn test_invalidate() {
        let state = TelemetryState::new();
        state.publish_position(PositionSample::default());
        assert!(state.has_valid_data());
        state.invalidate();
        assert!(!state.has_valid_data());
    }
}
