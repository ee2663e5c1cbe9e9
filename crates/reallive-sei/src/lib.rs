//! # reallive-sei
//!
//! Pulls the telemetry JSON that RealLive cameras embed in their H.264
//! bitstream back out of a live FLV byte stream.
//!
//! ## Crate structure
//!
//! - [`flv`] — Incremental FLV demuxer (header + tag loop, carry-over buffer)
//! - [`video`] — AVC video tag handler (sequence header, NALU packets)
//! - [`nal`] — AVCC (length-prefixed) and Annex-B (start-code) NAL splitting
//! - [`rbsp`] — Emulation-prevention removal
//! - [`sei`] — SEI message walking and telemetry payload decoding
//! - [`test_util`] — Fixture builders for synthetic FLV streams
//!
//! Nothing in this crate returns an error: malformed input is skipped,
//! and a connection whose header is unusable simply stops producing output.
//!
//! ```
//! use reallive_sei::SeiStreamParser;
//!
//! let mut parser = SeiStreamParser::new();
//! assert!(parser.push(b"not an flv stream at all").is_empty());
//! ```

pub mod flv;
pub mod nal;
pub mod rbsp;
pub mod sei;
pub mod test_util;
pub mod video;

use flv::FlvDemuxer;
use video::VideoTagHandler;

/// One decoded telemetry payload: the JSON object carried by a matching SEI.
pub type SeiJson = serde_json::Map<String, serde_json::Value>;

/// Full byte-stream → telemetry pipeline for a single connection.
///
/// Owns the demuxer's carry-over buffer and the NAL length width learned
/// from the last AVC sequence header, so one instance must be used per
/// connection.
#[derive(Debug, Default)]
pub struct SeiStreamParser {
    demuxer: FlvDemuxer,
    video: VideoTagHandler,
}

impl SeiStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the stream and return every telemetry payload
    /// that became complete, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SeiJson> {
        let mut out = Vec::new();
        let video = &mut self.video;
        self.demuxer.push(chunk, |body| video.handle(body, &mut out));
        out
    }

    /// NAL length width currently in effect for AVCC parsing.
    pub fn nal_length_size(&self) -> usize {
        self.video.nal_length_size()
    }

    /// Whether the stream was rejected for a bad FLV header.
    pub fn is_rejected(&self) -> bool {
        self.demuxer.is_rejected()
    }
}
