//! Demo mode - simulated device for testing without hardware
//!
//! [`DeviceSimulator`] is an in-memory [`CommunicationChannel`] that behaves
//! like the real firmware: it answers `'A'` polls with position frames (and
//! a periodic force frame), re-zeroes on `'C'`, and applies incoming
//! parameter packets to its force model. Useful for UI development and for
//! exercising the full reader loop in tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::protocol::command_builder::{parse_feedback_packet, PARAM_HEADER, PARAM_PACKET_LEN};
use crate::protocol::frame::{
    encode_force_frame, encode_position_frame, encode_position_payload,
};
use crate::protocol::{CommunicationChannel, FeedbackParams};
use crate::telemetry::{PositionSample, Sign};

/// Motion amplitude in tenths of a millimetre
const AMPLITUDE: f64 = 600.0;

/// Phase advance per answered poll
const PHASE_STEP: f64 = 0.05;

/// Every Nth poll answer also carries a force frame
const FORCE_CADENCE: u64 = 4;

/// A simulated haptic device behind the [`CommunicationChannel`] seam.
///
/// Clones share the same device state, so the reader thread's handle and the
/// write handle observe one device, just like a cloned serial port.
#[derive(Clone)]
pub struct DeviceSimulator {
    inner: Arc<Mutex<SimInner>>,
    read_timeout: Duration,
}

struct SimInner {
    rng: StdRng,
    /// Feedback parameters last pushed by the host
    params: FeedbackParams,
    /// Bytes queued for the host to read
    pending: VecDeque<u8>,
    /// Partial parameter packet being accumulated from the host
    cmd_buf: Vec<u8>,
    /// Motion model phase, re-zeroed by calibration
    phase: f64,
    /// Emit bare 14-byte payloads instead of headered frames
    emit_raw_frames: bool,
    polls_answered: u64,
}

impl DeviceSimulator {
    /// Create a simulator with a random seed
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    /// Create a simulator with a fixed seed (deterministic motion jitter)
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                rng: StdRng::seed_from_u64(seed),
                params: FeedbackParams::default(),
                pending: VecDeque::new(),
                cmd_buf: Vec::new(),
                phase: 0.0,
                emit_raw_frames: false,
                polls_answered: 0,
            })),
            read_timeout: Duration::from_millis(10),
        }
    }

    /// Emit legacy headerless position payloads instead of headered frames
    pub fn with_raw_frames(self) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.emit_raw_frames = true;
        }
        self
    }

    /// Feedback parameters the host last pushed (defaults until then)
    pub fn params(&self) -> FeedbackParams {
        self.inner.lock().map(|i| i.params).unwrap_or_default()
    }

    /// Number of poll requests answered so far
    pub fn polls_answered(&self) -> u64 {
        self.inner.lock().map(|i| i.polls_answered).unwrap_or(0)
    }
}

impl Default for DeviceSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimInner {
    /// Current position on a figure-eight path with a little sensor jitter
    fn current_position(&mut self) -> PositionSample {
        let jitter_x: i32 = self.rng.gen_range(-3..=3);
        let jitter_y: i32 = self.rng.gen_range(-3..=3);

        let x = (AMPLITUDE * self.phase.sin()) as i32 + jitter_x;
        let y = (AMPLITUDE * 0.5 * (2.0 * self.phase).sin()) as i32 + jitter_y;
        let z = (AMPLITUDE * 0.1 * (0.5 * self.phase).cos().abs()) as i32;

        PositionSample {
            x: x.abs(),
            y: y.abs(),
            z,
            sign_x: if x >= 0 { Sign::Positive } else { Sign::Negative },
            sign_y: if y >= 0 { Sign::Positive } else { Sign::Negative },
        }
    }

    /// Force the wall model produces at the given position
    fn current_force(&self, sample: &PositionSample) -> f32 {
        if !self.params.use_constraints {
            return 0.0;
        }
        let x_mm = (sample.signed_x() as f32 / 10.0).abs();
        let penetration = x_mm - self.params.wall_pos;
        if penetration <= 0.0 {
            return 0.0;
        }
        (self.params.stiffness * penetration / 1000.0).min(self.params.max_force)
    }

    fn answer_poll(&mut self) {
        self.phase += PHASE_STEP;
        let sample = self.current_position();

        if self.emit_raw_frames {
            self.pending.extend(encode_position_payload(&sample));
        } else {
            self.pending.extend(encode_position_frame(&sample));
        }

        self.polls_answered += 1;
        if self.polls_answered % FORCE_CADENCE == 0 {
            let force = self.current_force(&sample);
            self.pending.extend(encode_force_frame(force));
        }
    }

    fn handle_byte(&mut self, byte: u8) {
        if !self.cmd_buf.is_empty() {
            self.cmd_buf.push(byte);
            if self.cmd_buf.len() == PARAM_PACKET_LEN {
                if let Some(params) = parse_feedback_packet(&self.cmd_buf) {
                    self.params = params;
                }
                self.cmd_buf.clear();
            }
            return;
        }

        match byte {
            b'A' => self.answer_poll(),
            b'C' => {
                // Calibration: the firmware re-zeroes its encoder origin
                self.phase = 0.0;
            }
            b if b == PARAM_HEADER[0] => self.cmd_buf.push(b),
            _ => {}
        }
    }
}

impl Read for DeviceSimulator {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut inner = self
                .inner
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "simulator poisoned"))?;
            if !inner.pending.is_empty() {
                let n = buf.len().min(inner.pending.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = inner.pending.pop_front().unwrap_or(0);
                }
                return Ok(n);
            }
        }

        // Nothing queued: behave like a serial port read timeout
        std::thread::sleep(self.read_timeout);
        Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
    }
}

impl Write for DeviceSimulator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "simulator poisoned"))?;
        for &byte in buf {
            inner.handle_byte(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for DeviceSimulator {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.read_timeout = timeout;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "simulator poisoned"))?;
        inner.pending.clear();
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn CommunicationChannel>> {
        Ok(Box::new(self.clone()))
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "simulator poisoned"))?;
        Ok(inner.pending.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command_builder::build_feedback_packet;
    use crate::protocol::frame::{DecodedFrame, FrameDecoder, Framing};

    fn drain(sim: &mut DeviceSimulator) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while sim.bytes_to_read().unwrap() > 0 {
            let n = sim.read(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn test_poll_produces_decodable_position_frame() {
        let mut sim = DeviceSimulator::with_seed(1);
        sim.write_all(b"A").unwrap();

        let bytes = drain(&mut sim);
        let mut decoder = FrameDecoder::new(false);
        let frames: Vec<_> = bytes.iter().filter_map(|&b| decoder.feed(b)).collect();

        assert_eq!(frames.len(), 1);
        assert!(matches!(
            frames[0],
            DecodedFrame::Position {
                framing: Framing::Headered,
                ..
            }
        ));
    }

    #[test]
    fn test_force_frame_every_fourth_poll() {
        let mut sim = DeviceSimulator::with_seed(2);
        sim.write_all(b"AAAA").unwrap();

        let bytes = drain(&mut sim);
        let mut decoder = FrameDecoder::new(false);
        let frames: Vec<_> = bytes.iter().filter_map(|&b| decoder.feed(b)).collect();

        // Four position frames plus one force frame
        assert_eq!(frames.len(), 5);
        assert!(matches!(frames[4], DecodedFrame::Force(_)));
    }

    #[test]
    fn test_raw_mode_emits_headerless_payloads() {
        let mut sim = DeviceSimulator::with_seed(3).with_raw_frames();
        sim.write_all(b"A").unwrap();

        let bytes = drain(&mut sim);
        assert_eq!(bytes.len(), 14);

        let mut decoder = FrameDecoder::new(true);
        let frames: Vec<_> = bytes.iter().filter_map(|&b| decoder.feed(b)).collect();
        assert!(matches!(
            frames[0],
            DecodedFrame::Position {
                framing: Framing::LegacyRaw,
                ..
            }
        ));
    }

    #[test]
    fn test_parameter_packet_applies() {
        let mut sim = DeviceSimulator::with_seed(4);
        let params = FeedbackParams {
            use_constraints: false,
            wall_pos: 99.0,
            ..FeedbackParams::default()
        };
        sim.write_all(&build_feedback_packet(&params)).unwrap();

        assert_eq!(sim.params(), params);
    }

    #[test]
    fn test_calibrate_rezeros_motion() {
        let mut sim = DeviceSimulator::with_seed(5);
        sim.write_all(b"AAAAAAAA").unwrap();
        drain(&mut sim);

        sim.write_all(b"C").unwrap();
        assert_eq!(sim.inner.lock().unwrap().phase, 0.0);
    }

    #[test]
    fn test_read_times_out_when_idle() {
        let mut sim = DeviceSimulator::with_seed(6);
        sim.set_timeout(Duration::from_millis(1)).unwrap();
        let mut buf = [0u8; 8];
        let err = sim.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
