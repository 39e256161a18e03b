//! Frame encoding/decoding
//!
//! Implements the device's binary telemetry framing.
//!
//! Inbound frame format:
//! - 2 bytes: class header (`FE EF` position, `CC 33` force)
//! - 1 byte: payload length
//! - N bytes: payload (position: i32 x, i32 y, i32 z little-endian in tenths
//!   of a millimetre, then one sign byte each for x and y; force: one
//!   little-endian f32)
//!
//! Older firmware additionally streams bare 14-byte position payloads with no
//! header at all; when enabled those are accepted through the same dispatch
//! path, tagged [`Framing::LegacyRaw`].
//!
//! The decoder is a byte-at-a-time state machine. Every state consumes a
//! bounded number of bytes before it must reset, so after arbitrary
//! corruption it resynchronizes within at most one max-frame window and never
//! waits for bytes that will not arrive.

use byteorder::{ByteOrder, LittleEndian};

use crate::telemetry::{ForceSample, PositionSample, Sign};

/// Header pair opening a position frame
pub const POSITION_HEADER: [u8; 2] = [0xFE, 0xEF];

/// Header pair opening a force frame
pub const FORCE_HEADER: [u8; 2] = [0xCC, 0x33];

/// Largest declared payload length the decoder accepts
pub const MAX_PAYLOAD: usize = 32;

/// Payload length of a position frame (3 x i32 + 2 sign bytes)
pub const POSITION_PAYLOAD_LEN: usize = 14;

/// Payload length of a force frame (one f32)
pub const FORCE_PAYLOAD_LEN: usize = 4;

/// Legacy headerless frames are exactly one position payload long
pub const RAW_FRAME_LEN: usize = POSITION_PAYLOAD_LEN;

/// Frame class, as identified by the header pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Position telemetry (`FE EF`)
    Position,
    /// Force telemetry (`CC 33`)
    Force,
}

impl FrameClass {
    fn second_header_byte(self) -> u8 {
        match self {
            FrameClass::Position => POSITION_HEADER[1],
            FrameClass::Force => FORCE_HEADER[1],
        }
    }
}

/// How a decoded position sample was framed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Normal header + length + payload frame
    Headered,
    /// Bare 14-byte payload from legacy firmware
    LegacyRaw,
}

/// A completed frame, ready for publication
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodedFrame {
    /// A position sample
    Position {
        /// The decoded sample
        sample: PositionSample,
        /// Whether it arrived headered or as a legacy raw block
        framing: Framing,
    },
    /// A force sample
    Force(ForceSample),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Waiting for a first header byte (or accumulating a legacy raw block)
    Idle,
    /// First header byte seen, waiting for the class-specific second byte
    HeaderConfirmed,
    /// Header complete, waiting for the declared payload length
    LengthKnown,
    /// Collecting payload bytes until the declared length is reached
    AccumulatingPayload,
}

/// Byte-at-a-time frame decoder.
///
/// One per open session. Feed it every received byte in order; each call
/// returns at most one completed frame. Corruption is never an error, the
/// machine just resets to `Idle` and hunts for the next header.
pub struct FrameDecoder {
    state: DecodeState,
    class: FrameClass,
    declared_len: usize,
    payload: [u8; MAX_PAYLOAD],
    payload_len: usize,
    accept_raw_frames: bool,
    raw_buf: [u8; RAW_FRAME_LEN],
    raw_len: usize,
}

impl FrameDecoder {
    /// Create a decoder; `accept_raw_frames` enables the legacy headerless path
    pub fn new(accept_raw_frames: bool) -> Self {
        Self {
            state: DecodeState::Idle,
            class: FrameClass::Position,
            declared_len: 0,
            payload: [0; MAX_PAYLOAD],
            payload_len: 0,
            accept_raw_frames,
            raw_buf: [0; RAW_FRAME_LEN],
            raw_len: 0,
        }
    }

    /// Consume one byte; returns a frame when this byte completes one.
    pub fn feed(&mut self, byte: u8) -> Option<DecodedFrame> {
        match self.state {
            DecodeState::Idle => self.feed_idle(byte),
            DecodeState::HeaderConfirmed => {
                if byte == self.class.second_header_byte() {
                    self.state = DecodeState::LengthKnown;
                } else {
                    // Wrong continuation: drop the byte outright. It is not
                    // retried against the other class and not fed to the raw
                    // accumulator.
                    self.reset();
                }
                None
            }
            DecodeState::LengthKnown => {
                let len = byte as usize;
                if len == 0 || len > MAX_PAYLOAD {
                    self.reset();
                } else {
                    self.declared_len = len;
                    self.payload_len = 0;
                    self.state = DecodeState::AccumulatingPayload;
                }
                None
            }
            DecodeState::AccumulatingPayload => {
                self.payload[self.payload_len] = byte;
                self.payload_len += 1;
                if self.payload_len == self.declared_len {
                    let frame = self.dispatch();
                    self.reset();
                    frame
                } else {
                    None
                }
            }
        }
    }

    fn feed_idle(&mut self, byte: u8) -> Option<DecodedFrame> {
        if byte == POSITION_HEADER[0] {
            self.class = FrameClass::Position;
            self.state = DecodeState::HeaderConfirmed;
            return None;
        }
        if byte == FORCE_HEADER[0] {
            self.class = FrameClass::Force;
            self.state = DecodeState::HeaderConfirmed;
            return None;
        }

        if self.accept_raw_frames {
            self.raw_buf[self.raw_len] = byte;
            self.raw_len += 1;
            if self.raw_len == RAW_FRAME_LEN {
                self.raw_len = 0;
                return Some(DecodedFrame::Position {
                    sample: decode_position_payload(&self.raw_buf),
                    framing: Framing::LegacyRaw,
                });
            }
        }
        None
    }

    /// Interpret a completed payload. Unknown class/length combinations are
    /// silently discarded.
    fn dispatch(&self) -> Option<DecodedFrame> {
        let payload = &self.payload[..self.payload_len];
        match (self.class, self.payload_len) {
            (FrameClass::Position, POSITION_PAYLOAD_LEN) => Some(DecodedFrame::Position {
                sample: decode_position_payload(payload),
                framing: Framing::Headered,
            }),
            (FrameClass::Force, FORCE_PAYLOAD_LEN) => Some(DecodedFrame::Force(ForceSample {
                value: LittleEndian::read_f32(payload),
            })),
            _ => None,
        }
    }

    /// Return to `Idle`. The legacy raw accumulator is left alone: a partial
    /// raw block keeps filling across interleaved headered frames.
    fn reset(&mut self) {
        self.state = DecodeState::Idle;
        self.declared_len = 0;
        self.payload_len = 0;
    }
}

/// Decode a 14-byte position payload (headered and legacy frames share this)
fn decode_position_payload(payload: &[u8]) -> PositionSample {
    PositionSample {
        x: LittleEndian::read_i32(&payload[0..4]),
        y: LittleEndian::read_i32(&payload[4..8]),
        z: LittleEndian::read_i32(&payload[8..12]),
        sign_x: Sign::from_wire(payload[12]),
        sign_y: Sign::from_wire(payload[13]),
    }
}

/// Encode a position sample as a bare 14-byte payload
pub fn encode_position_payload(sample: &PositionSample) -> [u8; POSITION_PAYLOAD_LEN] {
    let mut payload = [0u8; POSITION_PAYLOAD_LEN];
    LittleEndian::write_i32(&mut payload[0..4], sample.x);
    LittleEndian::write_i32(&mut payload[4..8], sample.y);
    LittleEndian::write_i32(&mut payload[8..12], sample.z);
    payload[12] = sample.sign_x.to_wire();
    payload[13] = sample.sign_y.to_wire();
    payload
}

/// Encode a full headered position frame
pub fn encode_position_frame(sample: &PositionSample) -> Vec<u8> {
    let mut frame = Vec::with_capacity(3 + POSITION_PAYLOAD_LEN);
    frame.extend_from_slice(&POSITION_HEADER);
    frame.push(POSITION_PAYLOAD_LEN as u8);
    frame.extend_from_slice(&encode_position_payload(sample));
    frame
}

/// Encode a full headered force frame
pub fn encode_force_frame(value: f32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(3 + FORCE_PAYLOAD_LEN);
    frame.extend_from_slice(&FORCE_HEADER);
    frame.push(FORCE_PAYLOAD_LEN as u8);
    let mut payload = [0u8; FORCE_PAYLOAD_LEN];
    LittleEndian::write_f32(&mut payload, value);
    frame.extend_from_slice(&payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<DecodedFrame> {
        bytes.iter().filter_map(|&b| decoder.feed(b)).collect()
    }

    fn sample(x: i32, y: i32, z: i32, sign_x: Sign, sign_y: Sign) -> PositionSample {
        PositionSample {
            x,
            y,
            z,
            sign_x,
            sign_y,
        }
    }

    #[test]
    fn test_headered_position_frame() {
        // x=100, y=-50 (magnitude 50, sign byte 0), z=0, signX=1, signY=0
        let expected = sample(100, 50, 0, Sign::Positive, Sign::Negative);
        let bytes = encode_position_frame(&expected);
        assert_eq!(bytes[0..3], [0xFE, 0xEF, 0x0E]);

        let mut decoder = FrameDecoder::new(false);
        let frames = feed_all(&mut decoder, &bytes);
        assert_eq!(
            frames,
            vec![DecodedFrame::Position {
                sample: expected,
                framing: Framing::Headered,
            }]
        );
    }

    #[test]
    fn test_force_frame() {
        let bytes = encode_force_frame(3.25);
        assert_eq!(bytes[0..3], [0xCC, 0x33, 0x04]);

        let mut decoder = FrameDecoder::new(false);
        let frames = feed_all(&mut decoder, &bytes);
        assert_eq!(frames, vec![DecodedFrame::Force(ForceSample { value: 3.25 })]);
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let expected = sample(12345, 678, 90, Sign::Negative, Sign::Positive);
        let bytes = encode_position_frame(&expected);

        // Whole frame in one pass
        let mut whole = FrameDecoder::new(false);
        let frames_whole = feed_all(&mut whole, &bytes);

        // Same frame split at every possible boundary
        for split_at in 0..bytes.len() {
            let mut decoder = FrameDecoder::new(false);
            let mut frames = feed_all(&mut decoder, &bytes[..split_at]);
            frames.extend(feed_all(&mut decoder, &bytes[split_at..]));
            assert_eq!(frames, frames_whole, "split at byte {}", split_at);
        }
    }

    #[test]
    fn test_bad_second_header_byte_resyncs() {
        let expected = sample(7, 8, 9, Sign::Positive, Sign::Positive);
        let mut bytes = vec![0xFE, 0x00]; // aborted header
        bytes.extend_from_slice(&encode_position_frame(&expected));

        let mut decoder = FrameDecoder::new(false);
        let frames = feed_all(&mut decoder, &bytes);
        assert_eq!(
            frames,
            vec![DecodedFrame::Position {
                sample: expected,
                framing: Framing::Headered,
            }]
        );
    }

    #[test]
    fn test_zero_length_resets() {
        let mut decoder = FrameDecoder::new(false);
        assert_eq!(feed_all(&mut decoder, &[0xFE, 0xEF, 0x00]), vec![]);

        // Decoder must be back in Idle: a fresh frame decodes cleanly
        let expected = sample(1, 2, 3, Sign::Positive, Sign::Negative);
        let frames = feed_all(&mut decoder, &encode_position_frame(&expected));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_overlong_length_resets() {
        let mut decoder = FrameDecoder::new(false);
        let over = (MAX_PAYLOAD + 1) as u8;
        assert_eq!(feed_all(&mut decoder, &[0xFE, 0xEF, over]), vec![]);

        let expected = sample(4, 5, 6, Sign::Negative, Sign::Negative);
        let frames = feed_all(&mut decoder, &encode_position_frame(&expected));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_unknown_class_length_pair_discarded() {
        // A force-class frame declaring a position-sized payload completes
        // without emitting anything.
        let mut bytes = vec![0xCC, 0x33, 0x0E];
        bytes.extend_from_slice(&[0u8; 14]);

        let mut decoder = FrameDecoder::new(false);
        assert_eq!(feed_all(&mut decoder, &bytes), vec![]);

        // And the machine is reusable afterwards
        let frames = feed_all(&mut decoder, &encode_force_frame(1.5));
        assert_eq!(frames, vec![DecodedFrame::Force(ForceSample { value: 1.5 })]);
    }

    #[test]
    fn test_position_class_wrong_length_discarded() {
        let mut bytes = vec![0xFE, 0xEF, 0x04];
        bytes.extend_from_slice(&[1, 2, 3, 4]);

        let mut decoder = FrameDecoder::new(false);
        assert_eq!(feed_all(&mut decoder, &bytes), vec![]);
    }

    #[test]
    fn test_legacy_raw_frame() {
        let expected = sample(250, 40, 17, Sign::Negative, Sign::Positive);
        let payload = encode_position_payload(&expected);

        let mut decoder = FrameDecoder::new(true);
        let frames = feed_all(&mut decoder, &payload);
        assert_eq!(
            frames,
            vec![DecodedFrame::Position {
                sample: expected,
                framing: Framing::LegacyRaw,
            }]
        );
    }

    #[test]
    fn test_raw_frames_rejected_when_disabled() {
        let payload = encode_position_payload(&sample(1, 1, 1, Sign::Positive, Sign::Positive));
        let mut decoder = FrameDecoder::new(false);
        // Headerless bytes are discarded outright; two payloads' worth still
        // produce nothing.
        assert_eq!(feed_all(&mut decoder, &payload), vec![]);
        assert_eq!(feed_all(&mut decoder, &payload), vec![]);
    }

    #[test]
    fn test_raw_accumulator_survives_interleaved_headered_frame() {
        // Half a raw block, then a complete headered frame, then the rest of
        // the raw block. Both must decode.
        let raw_expected = sample(300, 75, 5, Sign::Positive, Sign::Negative);
        let raw = encode_position_payload(&raw_expected);
        let headered_expected = sample(11, 22, 33, Sign::Negative, Sign::Positive);

        let mut decoder = FrameDecoder::new(true);
        let mut frames = feed_all(&mut decoder, &raw[..7]);
        frames.extend(feed_all(
            &mut decoder,
            &encode_position_frame(&headered_expected),
        ));
        frames.extend(feed_all(&mut decoder, &raw[7..]));

        assert_eq!(
            frames,
            vec![
                DecodedFrame::Position {
                    sample: headered_expected,
                    framing: Framing::Headered,
                },
                DecodedFrame::Position {
                    sample: raw_expected,
                    framing: Framing::LegacyRaw,
                },
            ]
        );
    }

    #[test]
    fn test_resync_after_garbage() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        // Noise that never opens a header (and raw mode off) must all be
        // dropped, leaving the decoder ready for the next real frame.
        let mut rng = StdRng::seed_from_u64(0x4A17);
        let expected = sample(999, 123, 7, Sign::Positive, Sign::Positive);

        for _ in 0..50 {
            let garbage: Vec<u8> = (0..rng.gen_range(1..64))
                .map(|_| loop {
                    let b: u8 = rng.gen();
                    if b != POSITION_HEADER[0] && b != FORCE_HEADER[0] {
                        break b;
                    }
                })
                .collect();

            let mut decoder = FrameDecoder::new(false);
            assert_eq!(feed_all(&mut decoder, &garbage), vec![]);
            let frames = feed_all(&mut decoder, &encode_position_frame(&expected));
            assert_eq!(frames.len(), 1);
        }
    }
}
