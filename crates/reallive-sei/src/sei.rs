//! # SEI Messages
//!
//! An SEI RBSP is a sequence of messages, each prefixed by `payloadType` and
//! `payloadSize`. Both are coded as a run of `0xFF` bytes (255 each) plus one
//! terminating byte that is added to the sum:
//!
//! ```text
//! +------------------+------------------+-------------------+-----+------+
//! | FF.. type_last   | FF.. size_last   | payload (size B)  | ... | 0x80 |
//! +------------------+------------------+-------------------+-----+------+
//! ```
//!
//! RealLive cameras publish telemetry as a `user_data_unregistered` message
//! (type 5) whose first 16 bytes are [`TELEMETRY_SEI_UUID`], followed by a
//! UTF-8 JSON object, optionally NUL padded.

use crate::SeiJson;

/// SEI payload type for `user_data_unregistered`.
pub const USER_DATA_UNREGISTERED: u32 = 5;

/// UUID tagging RealLive telemetry payloads (ASCII `RealiveSeiMetric`).
pub const TELEMETRY_SEI_UUID: [u8; 16] = [
    0x52, 0x65, 0x61, 0x6c, 0x69, 0x76, 0x65, 0x53, 0x65, 0x69, 0x4d, 0x65, 0x74, 0x72, 0x69, 0x63,
];

/// RBSP trailing bits when they start on a byte boundary.
const RBSP_TRAILING: u8 = 0x80;

/// One SEI message borrowed from an RBSP buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeiMessage<'a> {
    pub payload_type: u32,
    pub payload: &'a [u8],
}

/// Iterator over the messages of an SEI RBSP.
///
/// Ends at the trailing `0x80`, when the buffer runs out mid-header, when a
/// message declares a zero size, or when it declares more bytes than remain.
#[derive(Debug, Clone)]
pub struct SeiMessages<'a> {
    rbsp: &'a [u8],
    offset: usize,
}

impl<'a> SeiMessages<'a> {
    pub fn new(rbsp: &'a [u8]) -> Self {
        Self { rbsp, offset: 0 }
    }

    fn read_coded(&mut self) -> Option<u32> {
        let mut value = 0u32;
        loop {
            let b = *self.rbsp.get(self.offset)?;
            self.offset += 1;
            value = value.saturating_add(b as u32);
            if b != 0xFF {
                return Some(value);
            }
        }
    }

    fn next_message(&mut self) -> Option<SeiMessage<'a>> {
        let remaining = self.rbsp.len().checked_sub(self.offset)?;
        if remaining == 0 || (remaining == 1 && self.rbsp[self.offset] == RBSP_TRAILING) {
            return None;
        }

        let payload_type = self.read_coded()?;
        let payload_size = self.read_coded()? as usize;

        let end = self.offset.checked_add(payload_size)?;
        if payload_size == 0 || end > self.rbsp.len() {
            return None;
        }

        let payload = &self.rbsp[self.offset..end];
        self.offset = end;
        Some(SeiMessage {
            payload_type,
            payload,
        })
    }
}

impl<'a> Iterator for SeiMessages<'a> {
    type Item = SeiMessage<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let msg = self.next_message();
        if msg.is_none() {
            self.offset = self.rbsp.len();
        }
        msg
    }
}

impl std::iter::FusedIterator for SeiMessages<'_> {}

/// What a single `user_data_unregistered` message turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum UserData {
    /// Not ours: wrong type, too short, or a foreign UUID.
    Foreign,
    /// Our UUID, but the body was not a JSON object we could read.
    Malformed,
    /// Our UUID with a decoded JSON object body.
    Telemetry(SeiJson),
}

/// Classify one SEI message against the telemetry UUID and decode its body.
pub fn decode_user_data(msg: &SeiMessage<'_>) -> UserData {
    if msg.payload_type != USER_DATA_UNREGISTERED || msg.payload.len() < 16 {
        return UserData::Foreign;
    }
    let (uuid, body) = msg.payload.split_at(16);
    if uuid != TELEMETRY_SEI_UUID {
        return UserData::Foreign;
    }

    let Ok(text) = std::str::from_utf8(body) else {
        return UserData::Malformed;
    };
    match serde_json::from_str::<serde_json::Value>(text.trim_end_matches('\0')) {
        Ok(serde_json::Value::Object(map)) => UserData::Telemetry(map),
        Ok(_) => UserData::Foreign,
        Err(_) => UserData::Malformed,
    }
}

/// Scan an SEI RBSP for the first RealLive telemetry payload.
///
/// Foreign messages are skipped; a telemetry message that fails to decode
/// ends the scan with no result.
pub fn extract_telemetry(rbsp: &[u8]) -> Option<SeiJson> {
    for msg in SeiMessages::new(rbsp) {
        match decode_user_data(&msg) {
            UserData::Foreign => continue,
            UserData::Malformed => {
                tracing::debug!(
                    len = msg.payload.len(),
                    "telemetry SEI body is not a JSON object"
                );
                return None;
            }
            UserData::Telemetry(map) => return Some(map),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{sei_message, telemetry_payload};

    fn rbsp(messages: &[Vec<u8>]) -> Vec<u8> {
        let mut out: Vec<u8> = messages.concat();
        out.push(RBSP_TRAILING);
        out
    }

    #[test]
    fn coded_values_sum_ff_runs() {
        let mut payload = vec![0xAB; 300];
        payload[0] = 0x01;
        let msg = sei_message(260, &payload);
        // 260 = FF + 05, 300 = FF + 2D
        assert_eq!(&msg[..4], &[0xFF, 0x05, 0xFF, 0x2D]);

        let data = rbsp(&[msg]);
        let parsed: Vec<_> = SeiMessages::new(&data).collect();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].payload_type, 260);
        assert_eq!(parsed[0].payload.len(), 300);
    }

    #[test]
    fn extracts_telemetry_json() {
        let payload = telemetry_payload(br#"{"device":{"cpu_pct":42.3}}"#);
        let data = rbsp(&[sei_message(5, &payload)]);
        let json = extract_telemetry(&data).unwrap();
        assert_eq!(json["device"]["cpu_pct"], 42.3);
    }

    #[test]
    fn strips_trailing_nuls() {
        let data = rbsp(&[sei_message(5, &telemetry_payload(b"{\"a\":1}\0\0\0"))]);
        let json = extract_telemetry(&data).unwrap();
        assert_eq!(json["a"], 1);
    }

    #[test]
    fn skips_foreign_uuid_and_keeps_scanning() {
        let mut foreign = b"RealLiveTimeSEI1".to_vec();
        foreign.extend_from_slice(&[0u8; 24]);
        let data = rbsp(&[
            sei_message(5, &foreign),
            sei_message(1, &[0x10, 0x20]),
            sei_message(5, &telemetry_payload(br#"{"stream_key":"cam-9"}"#)),
        ]);
        let json = extract_telemetry(&data).unwrap();
        assert_eq!(json["stream_key"], "cam-9");
    }

    #[test]
    fn foreign_uuid_alone_yields_nothing() {
        let mut bad = TELEMETRY_SEI_UUID;
        bad[15] ^= 0x01;
        let mut payload = bad.to_vec();
        payload.extend_from_slice(br#"{"device":{}}"#);
        assert!(extract_telemetry(&rbsp(&[sei_message(5, &payload)])).is_none());
    }

    #[test]
    fn invalid_json_yields_nothing() {
        let data = rbsp(&[sei_message(5, &telemetry_payload(b"{not json"))]);
        assert!(extract_telemetry(&data).is_none());
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let msg = sei_message(5, &telemetry_payload(&[0xC3, 0x28]));
        let parsed: Vec<_> = SeiMessages::new(&msg).collect();
        assert_eq!(decode_user_data(&parsed[0]), UserData::Malformed);
    }

    #[test]
    fn truncated_payload_stops() {
        let mut data = sei_message(5, &telemetry_payload(br#"{"a":1}"#));
        data.truncate(data.len() - 3);
        assert_eq!(SeiMessages::new(&data).count(), 0);
    }

    #[test]
    fn zero_size_stops() {
        let data = [0x05, 0x00, 0x05, 0x01, 0xAA];
        assert_eq!(SeiMessages::new(&data).count(), 0);
    }

    #[test]
    fn trailing_marker_only() {
        assert_eq!(SeiMessages::new(&[RBSP_TRAILING]).count(), 0);
        assert!(extract_telemetry(&[]).is_none());
    }
}
