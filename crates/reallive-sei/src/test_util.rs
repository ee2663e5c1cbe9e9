//! Builders for synthetic FLV/H.264 byte streams.
//!
//! Used by unit tests here and by the monitor crate's integration tests,
//! which serve these streams over a local HTTP socket.

use crate::rbsp;
use crate::sei::TELEMETRY_SEI_UUID;

/// FLV header (video only, data_offset = 9) plus `PreviousTagSize0`.
pub fn flv_header() -> Vec<u8> {
    vec![b'F', b'L', b'V', 0x01, 0x01, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00]
}

/// One FLV tag with its trailing `PreviousTagSize`.
pub fn flv_tag(tag_type: u8, body: &[u8]) -> Vec<u8> {
    let size = body.len() as u32;
    let mut out = Vec::with_capacity(11 + body.len() + 4);
    out.push(tag_type);
    out.extend_from_slice(&size.to_be_bytes()[1..]);
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // timestamp + extension
    out.extend_from_slice(&[0x00, 0x00, 0x00]); // stream id
    out.extend_from_slice(body);
    out.extend_from_slice(&(11 + size).to_be_bytes());
    out
}

/// Video tag body for an AVC sequence header declaring `length_size`.
pub fn avc_sequence_header(length_size: usize) -> Vec<u8> {
    let minus_one = (length_size.clamp(1, 4) - 1) as u8;
    vec![
        0x17, 0x00, 0x00, 0x00, 0x00, // keyframe | AVC, sequence header
        0x01, 0x64, 0x00, 0x1F, // version, profile, compat, level
        0xFC | minus_one,
        0xE0, // no SPS
        0x00, // no PPS
    ]
}

/// Video tag body for an AVC NALU packet carrying `avc_payload`.
pub fn nalu_tag_body(avc_payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x27, 0x01, 0x00, 0x00, 0x00];
    out.extend_from_slice(avc_payload);
    out
}

/// Frame `units` AVCC-style with `width`-byte big-endian lengths.
pub fn length_prefixed(units: &[&[u8]], width: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        let len = (unit.len() as u32).to_be_bytes();
        out.extend_from_slice(&len[4 - width..]);
        out.extend_from_slice(unit);
    }
    out
}

/// Encode one SEI message with `0xFF`-run type and size fields.
pub fn sei_message(payload_type: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    push_coded(&mut out, payload_type as usize);
    push_coded(&mut out, payload.len());
    out.extend_from_slice(payload);
    out
}

fn push_coded(out: &mut Vec<u8>, mut value: usize) {
    while value >= 0xFF {
        out.push(0xFF);
        value -= 0xFF;
    }
    out.push(value as u8);
}

/// `user_data_unregistered` body: telemetry UUID followed by `json`.
pub fn telemetry_payload(json: &[u8]) -> Vec<u8> {
    let mut out = TELEMETRY_SEI_UUID.to_vec();
    out.extend_from_slice(json);
    out
}

/// Escaped SEI NAL (header byte included) from raw SEI messages.
pub fn sei_nal(messages: &[Vec<u8>]) -> Vec<u8> {
    let mut rbsp_bytes = messages.concat();
    rbsp_bytes.push(0x80);
    let mut out = vec![0x06];
    out.extend(rbsp::escape(&rbsp_bytes));
    out
}

/// Escaped SEI NAL carrying one telemetry JSON object.
pub fn telemetry_sei_nal(json: &[u8]) -> Vec<u8> {
    sei_nal(&[sei_message(5, &telemetry_payload(json))])
}

/// Complete FLV stream: header, a sequence header declaring 4-byte lengths,
/// then one NALU tag (IDR slice + telemetry SEI) per payload.
pub fn telemetry_stream(payloads: &[&[u8]]) -> Vec<u8> {
    let mut out = flv_header();
    out.extend(flv_tag(9, &avc_sequence_header(4)));
    for json in payloads {
        let sei = telemetry_sei_nal(json);
        let slice = [0x65u8, 0x88, 0x84, 0x00, 0x21];
        let body = nalu_tag_body(&length_prefixed(&[&sei[..], &slice[..]], 4));
        out.extend(flv_tag(9, &body));
    }
    out
}
