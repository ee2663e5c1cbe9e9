//! End-to-end tests for the FLV → telemetry pipeline over synthetic streams.

use reallive_sei::sei::TELEMETRY_SEI_UUID;
use reallive_sei::test_util::*;
use reallive_sei::SeiStreamParser;

const CPU_JSON: &[u8] = br#"{"device":{"cpu_pct":42.3}}"#;

fn decode_all(chunks: &[&[u8]]) -> Vec<reallive_sei::SeiJson> {
    let mut parser = SeiStreamParser::new();
    chunks.iter().flat_map(|c| parser.push(c)).collect()
}

#[test]
fn two_chunk_split_yields_single_payload() {
    let stream = telemetry_stream(&[CPU_JSON]);
    for split in [1, 12, 13, 20, stream.len() / 2, stream.len() - 1] {
        let (a, b) = stream.split_at(split);
        let out = decode_all(&[a, b]);
        assert_eq!(out.len(), 1, "split at {split}");
        assert_eq!(out[0]["device"]["cpu_pct"], 42.3);
    }
}

#[test]
fn several_tags_keep_order() {
    let stream = telemetry_stream(&[br#"{"n":1}"#, br#"{"n":2}"#, br#"{"n":3}"#]);
    let out = decode_all(&[&stream]);
    let ns: Vec<_> = out.iter().map(|j| j["n"].as_i64().unwrap()).collect();
    assert_eq!(ns, vec![1, 2, 3]);
}

#[test]
fn foreign_uuid_produces_nothing() {
    let mut uuid = TELEMETRY_SEI_UUID;
    uuid[0] = b'X';
    let mut payload = uuid.to_vec();
    payload.extend_from_slice(CPU_JSON);
    let nal = sei_nal(&[sei_message(5, &payload)]);

    let mut stream = flv_header();
    stream.extend(flv_tag(9, &avc_sequence_header(4)));
    stream.extend(flv_tag(9, &nalu_tag_body(&length_prefixed(&[&nal[..]], 4))));

    let mut parser = SeiStreamParser::new();
    assert!(parser.push(&stream).is_empty());
    assert!(!parser.is_rejected());
}

#[test]
fn non_flv_stream_produces_nothing() {
    let mut stream = b"MP4\x01\x05\x00\x00\x00\x09\x00\x00\x00\x00".to_vec();
    stream.extend(flv_tag(9, &avc_sequence_header(4)));
    let mut parser = SeiStreamParser::new();
    assert!(parser.push(&stream).is_empty());
    assert!(parser.is_rejected());
    assert!(parser.push(&telemetry_stream(&[CPU_JSON])).is_empty());
}

#[test]
fn annex_b_inside_flv() {
    let sei = telemetry_sei_nal(br#"{"person":{"active":true}}"#);
    let mut payload = vec![0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];
    payload.extend_from_slice(&[0x00, 0x00, 0x01]);
    payload.extend_from_slice(&sei);

    let mut stream = flv_header();
    stream.extend(flv_tag(9, &nalu_tag_body(&payload)));
    let out = decode_all(&[&stream]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["person"]["active"], true);
}

#[test]
fn emulation_prevention_is_removed_before_decoding() {
    // `00 00 00` inside the body forces an escape byte into the NAL.
    let mut body = TELEMETRY_SEI_UUID.to_vec();
    body.extend_from_slice(br#"{"k":"v"}"#);
    body.extend_from_slice(&[0x00, 0x00, 0x00]);
    let nal = sei_nal(&[sei_message(5, &body)]);
    assert!(nal.windows(3).any(|w| w == [0x00, 0x00, 0x03]));

    let mut stream = flv_header();
    stream.extend(flv_tag(9, &nalu_tag_body(&length_prefixed(&[&nal[..]], 4))));
    let out = decode_all(&[&stream]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["k"], "v");
}

#[test]
fn length_size_change_applies_to_following_tags() {
    let sei = telemetry_sei_nal(br#"{"phase":"wide"}"#);
    let narrow = telemetry_sei_nal(br#"{"phase":"narrow"}"#);

    let mut stream = flv_header();
    stream.extend(flv_tag(9, &avc_sequence_header(4)));
    stream.extend(flv_tag(9, &nalu_tag_body(&length_prefixed(&[&sei[..]], 4))));
    stream.extend(flv_tag(9, &avc_sequence_header(2)));
    stream.extend(flv_tag(9, &nalu_tag_body(&length_prefixed(&[&narrow[..]], 2))));

    let mut parser = SeiStreamParser::new();
    let out = parser.push(&stream);
    assert_eq!(parser.nal_length_size(), 2);
    let phases: Vec<_> = out.iter().map(|j| j["phase"].as_str().unwrap()).collect();
    assert_eq!(phases, vec!["wide", "narrow"]);
}

#[test]
fn tag_framed_with_previous_length_size_is_dropped() {
    let sei = telemetry_sei_nal(br#"{"late":true}"#);

    let mut stream = flv_header();
    stream.extend(flv_tag(9, &avc_sequence_header(2)));
    stream.extend(flv_tag(9, &nalu_tag_body(&length_prefixed(&[&sei[..]], 4))));

    let mut parser = SeiStreamParser::new();
    assert!(parser.push(&stream).is_empty());
    assert_eq!(parser.nal_length_size(), 2);
}

#[test]
fn multiple_sei_units_in_one_tag() {
    let a = telemetry_sei_nal(br#"{"i":"a"}"#);
    let b = telemetry_sei_nal(br#"{"i":"b"}"#);
    let mut stream = flv_header();
    stream.extend(flv_tag(
        9,
        &nalu_tag_body(&length_prefixed(&[&a[..], &[0x41, 0x9A][..], &b[..]], 4)),
    ));
    let out = decode_all(&[&stream]);
    assert_eq!(out.len(), 2);
    assert_eq!(out[1]["i"], "b");
}
