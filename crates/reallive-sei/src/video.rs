//! # AVC Video Tags
//!
//! ```text
//! byte 0      frame_type(4) | codec_id(4)      codec 7 = AVC
//! byte 1      avc_packet_type                  0 = sequence header, 1 = NALU
//! bytes 2..5  composition time (24-bit)
//! bytes 5..   AVCDecoderConfigurationRecord | NAL units
//! ```

use crate::nal::{self, DEFAULT_LENGTH_SIZE};
use crate::{rbsp, sei, SeiJson};

/// FLV `CodecID` for AVC / H.264.
pub const CODEC_AVC: u8 = 7;

/// Bytes before the AVC payload in a video tag body.
const VIDEO_HEADER_LEN: usize = 5;

/// Minimum length of an AVCDecoderConfigurationRecord we accept.
const MIN_CONFIG_LEN: usize = 7;

/// `AVCPacketType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    SequenceHeader,
    Nalu,
    EndOfSequence,
    Other(u8),
}

impl From<u8> for AvcPacketType {
    fn from(value: u8) -> Self {
        match value {
            0 => AvcPacketType::SequenceHeader,
            1 => AvcPacketType::Nalu,
            2 => AvcPacketType::EndOfSequence,
            other => AvcPacketType::Other(other),
        }
    }
}

/// NAL length width declared by an AVCDecoderConfigurationRecord:
/// `lengthSizeMinusOne` lives in the low 2 bits of byte 4.
pub fn config_length_size(record: &[u8]) -> Option<usize> {
    if record.len() < MIN_CONFIG_LEN {
        return None;
    }
    Some((record[4] & 0x03) as usize + 1)
}

/// Per-connection video tag state.
#[derive(Debug, Clone)]
pub struct VideoTagHandler {
    length_size: usize,
}

impl Default for VideoTagHandler {
    fn default() -> Self {
        Self {
            length_size: DEFAULT_LENGTH_SIZE,
        }
    }
}

impl VideoTagHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nal_length_size(&self) -> usize {
        self.length_size
    }

    /// Handle one video tag body, appending any telemetry payloads to `out`.
    pub fn handle(&mut self, body: &[u8], out: &mut Vec<SeiJson>) {
        if body.len() < VIDEO_HEADER_LEN || body[0] & 0x0F != CODEC_AVC {
            return;
        }
        let payload = &body[VIDEO_HEADER_LEN..];

        match AvcPacketType::from(body[1]) {
            AvcPacketType::SequenceHeader => {
                if let Some(width) = config_length_size(payload) {
                    if width != self.length_size {
                        tracing::debug!(
                            from = self.length_size,
                            to = width,
                            "NAL length size changed"
                        );
                    }
                    self.length_size = width;
                }
            }
            AvcPacketType::Nalu => self.handle_nalus(payload, out),
            AvcPacketType::EndOfSequence | AvcPacketType::Other(_) => {}
        }
    }

    fn handle_nalus(&self, payload: &[u8], out: &mut Vec<SeiJson>) {
        let units = match nal::split_length_prefixed(payload, self.length_size) {
            Some(units) => units,
            None => {
                tracing::trace!(
                    len = payload.len(),
                    length_size = self.length_size,
                    "AVCC split failed, trying Annex-B"
                );
                nal::split_annex_b(payload)
            }
        };

        for unit in units {
            let Some(escaped) = nal::sei_payload(unit) else {
                continue;
            };
            if let Some(json) = sei::extract_telemetry(&rbsp::unescape(escaped)) {
                out.push(json);
            }
        }
    }
}
