//! Trajectory recorder
//!
//! In-memory buffer of position events, with a sample-rate cap so a fast
//! polling cadence does not balloon the recording.

use std::collections::VecDeque;
use std::time::Duration;

use super::TrajectoryEntry;
use crate::telemetry::PositionEvent;

/// Maximum entries kept in memory; older entries are dropped first
const MAX_BUFFER_SIZE: usize = 10000;

/// Records the position feed between `start` and `stop`
pub struct TrajectoryRecorder {
    buffer: VecDeque<TrajectoryEntry>,
    is_recording: bool,
    /// Target sample rate in Hz
    sample_rate: f64,
    last_timestamp: Option<Duration>,
}

impl TrajectoryRecorder {
    /// Create a recorder (not yet recording)
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(MAX_BUFFER_SIZE),
            is_recording: false,
            sample_rate: 50.0,
            last_timestamp: None,
        }
    }

    /// Set the target sample rate in Hz
    pub fn set_sample_rate(&mut self, rate: f64) {
        self.sample_rate = rate.clamp(1.0, 500.0);
    }

    /// Get the sample rate
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Start recording (clears any previous recording)
    pub fn start(&mut self) {
        self.is_recording = true;
        self.last_timestamp = None;
        self.buffer.clear();
    }

    /// Stop recording; the buffer stays available for export
    pub fn stop(&mut self) {
        self.is_recording = false;
    }

    /// Check if recording is active
    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    /// Record one position event.
    ///
    /// Events arriving faster than the sample rate are skipped; the rate cap
    /// works off the event timestamps, not wall time, so recordings replay
    /// deterministically.
    pub fn record(&mut self, event: PositionEvent) {
        if !self.is_recording {
            return;
        }

        let min_interval = Duration::from_secs_f64(1.0 / self.sample_rate);
        if let Some(last) = self.last_timestamp {
            if event.timestamp.saturating_sub(last) < min_interval {
                return;
            }
        }

        if self.buffer.len() >= MAX_BUFFER_SIZE {
            self.buffer.pop_front();
        }
        self.last_timestamp = Some(event.timestamp);
        self.buffer.push_back(TrajectoryEntry::from(event));
    }

    /// Number of recorded entries
    pub fn entry_count(&self) -> usize {
        self.buffer.len()
    }

    /// Iterate over the recorded entries in order
    pub fn entries(&self) -> impl Iterator<Item = &TrajectoryEntry> {
        self.buffer.iter()
    }

    /// Discard the recording
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last_timestamp = None;
    }
}

impl Default for TrajectoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}
