//! Outbound commands
//!
//! Defines the host-to-device commands the firmware understands.

use serde::{Deserialize, Serialize};

/// Single-byte commands for the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Request a telemetry update ('A')
    PollTelemetry,

    /// Trigger device calibration ('C')
    Calibrate,
}

impl Command {
    /// Get the wire byte for this command
    pub fn wire_byte(&self) -> u8 {
        match self {
            Command::PollTelemetry => b'A',
            Command::Calibrate => b'C',
        }
    }
}

/// Haptic feedback parameters pushed to the device.
///
/// Sent as one parameter packet (see
/// [`build_feedback_packet`](super::command_builder::build_feedback_packet)).
/// The defaults match the firmware's own power-on values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackParams {
    /// Whether wall/hole constraints are active at all
    pub use_constraints: bool,
    /// Wall position along the travel axis, millimetres
    pub wall_pos: f32,
    /// Wall thickness, millimetres
    pub wall_thick: f32,
    /// Radius of the pass-through hole, millimetres
    pub hole_radius: f32,
    /// Wall stiffness (spring constant)
    pub stiffness: f32,
    /// Velocity damping coefficient
    pub damping: f32,
    /// Force output clamp
    pub max_force: f32,
}

impl Default for FeedbackParams {
    fn default() -> Self {
        Self {
            use_constraints: true,
            wall_pos: 130.0,
            wall_thick: 10.0,
            hole_radius: 20.0,
            stiffness: 150.0,
            damping: 0.0,
            max_force: 4.5,
        }
    }
}

impl FeedbackParams {
    /// Parameters with all constraints disabled: free motion, no force output
    pub fn free_motion() -> Self {
        Self {
            use_constraints: false,
            ..Self::default()
        }
    }
}
