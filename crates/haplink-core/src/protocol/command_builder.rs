//! Parameter packet encoding
//!
//! Builds the outbound parameter packet:
//! - 2 bytes: header `AA 55`
//! - 1 byte: payload length (always 25)
//! - 1 byte: flags (bit0 = constraints enabled)
//! - 6 x f32 little-endian: wallPos, wallThick, holeRadius, stiffness,
//!   damping, maxForce
//!
//! Building is pure; nothing touches the port until the caller hands the
//! bytes to the write path.

use byteorder::{ByteOrder, LittleEndian};

use super::FeedbackParams;

/// Header pair opening a parameter packet
pub const PARAM_HEADER: [u8; 2] = [0xAA, 0x55];

/// Parameter packet payload length (flags byte + six floats)
pub const PARAM_PAYLOAD_LEN: usize = 1 + 6 * 4;

/// Total parameter packet length on the wire
pub const PARAM_PACKET_LEN: usize = 3 + PARAM_PAYLOAD_LEN;

const CONSTRAINTS_FLAG: u8 = 0x01;

/// Encode a parameter packet for the given feedback params
pub fn build_feedback_packet(params: &FeedbackParams) -> Vec<u8> {
    let mut packet = Vec::with_capacity(PARAM_PACKET_LEN);
    packet.extend_from_slice(&PARAM_HEADER);
    packet.push(PARAM_PAYLOAD_LEN as u8);

    packet.push(if params.use_constraints {
        CONSTRAINTS_FLAG
    } else {
        0x00
    });

    let floats = [
        params.wall_pos,
        params.wall_thick,
        params.hole_radius,
        params.stiffness,
        params.damping,
        params.max_force,
    ];
    let mut buf = [0u8; 4];
    for value in floats {
        LittleEndian::write_f32(&mut buf, value);
        packet.extend_from_slice(&buf);
    }

    packet
}

/// Decode a parameter packet back into feedback params.
///
/// Used by the simulated device and the round-trip tests. Returns `None` for
/// anything that is not a complete, well-formed parameter packet.
pub fn parse_feedback_packet(bytes: &[u8]) -> Option<FeedbackParams> {
    if bytes.len() != PARAM_PACKET_LEN {
        return None;
    }
    if bytes[0..2] != PARAM_HEADER || bytes[2] as usize != PARAM_PAYLOAD_LEN {
        return None;
    }

    let payload = &bytes[3..];
    let at = |i: usize| LittleEndian::read_f32(&payload[1 + i * 4..1 + (i + 1) * 4]);

    Some(FeedbackParams {
        use_constraints: payload[0] & CONSTRAINTS_FLAG != 0,
        wall_pos: at(0),
        wall_thick: at(1),
        hole_radius: at(2),
        stiffness: at(3),
        damping: at(4),
        max_force: at(5),
    })
}
