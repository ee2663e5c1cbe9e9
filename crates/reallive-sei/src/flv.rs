//! # FLV Demuxer
//!
//! Incremental parser for the FLV envelope as served by SRS live endpoints.
//!
//! ```text
//! header    'F' 'L' 'V' | version | flags | data_offset (u32 BE)
//!           PreviousTagSize0 (u32, ignored)
//! tag       type (u8) | data_size (u24 BE) | timestamp (u24 + u8) | stream_id (u24)
//!           data (data_size bytes)
//!           PreviousTagSize (u32, ignored)
//! ```
//!
//! Bytes arrive in arbitrary chunks; incomplete tags stay in the carry-over
//! buffer until the rest shows up.

use bytes::{Buf, BytesMut};

/// File signature.
pub const FLV_SIGNATURE: &[u8; 3] = b"FLV";

/// Tag type for video.
pub const TAG_TYPE_VIDEO: u8 = 9;

/// Fixed tag header size.
pub const TAG_HEADER_LEN: usize = 11;

/// Trailing `PreviousTagSize` field.
const PREV_TAG_SIZE_LEN: usize = 4;

/// Minimum bytes before the header is judged: 9-byte header + PreviousTagSize0.
const MIN_HEADER_LEN: usize = 13;

/// Carry-over limit; past this the buffer is trimmed to [`TRIM_TO`].
pub const MAX_BUFFERED: usize = 2 * 1024 * 1024;

/// Bytes kept (the most recent) after a trim.
pub const TRIM_TO: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for enough bytes to validate the header.
    Header,
    /// Header consumed; parsing tags.
    Tags,
    /// Signature mismatch; everything is dropped from now on.
    Rejected,
}

/// Incremental FLV demuxer forwarding video tag bodies.
#[derive(Debug)]
pub struct FlvDemuxer {
    buf: BytesMut,
    state: State,
}

impl Default for FlvDemuxer {
    fn default() -> Self {
        Self {
            buf: BytesMut::with_capacity(64 * 1024),
            state: State::Header,
        }
    }
}

impl FlvDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the stream failed the signature check.
    pub fn is_rejected(&self) -> bool {
        self.state == State::Rejected
    }

    /// Bytes currently held in the carry-over buffer.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append a chunk and call `on_video` with the body of every complete,
    /// non-empty video tag, in order.
    pub fn push(&mut self, chunk: &[u8], mut on_video: impl FnMut(&[u8])) {
        if self.state == State::Rejected || chunk.is_empty() {
            return;
        }
        self.buf.extend_from_slice(chunk);

        if self.state == State::Header && !self.parse_header() {
            return;
        }

        let mut offset = 0usize;
        while self.buf.len() - offset >= TAG_HEADER_LEN + PREV_TAG_SIZE_LEN {
            let tag = &self.buf[offset..];
            let tag_type = tag[0];
            let data_size =
                ((tag[1] as usize) << 16) | ((tag[2] as usize) << 8) | tag[3] as usize;
            let full_size = TAG_HEADER_LEN + data_size + PREV_TAG_SIZE_LEN;
            if tag.len() < full_size {
                break;
            }

            if tag_type == TAG_TYPE_VIDEO && data_size > 0 {
                on_video(&tag[TAG_HEADER_LEN..TAG_HEADER_LEN + data_size]);
            }
            offset += full_size;
        }

        self.buf.advance(offset);
        if self.buf.len() > MAX_BUFFERED {
            let excess = self.buf.len() - TRIM_TO;
            tracing::debug!(dropped = excess, "FLV carry-over buffer over limit, trimming");
            self.buf.advance(excess);
        }
    }

    /// Validate and consume the header. Returns `true` once tags can be read.
    fn parse_header(&mut self) -> bool {
        if self.buf.len() < MIN_HEADER_LEN {
            return false;
        }
        if &self.buf[..3] != FLV_SIGNATURE {
            tracing::debug!("FLV signature mismatch, dropping stream");
            self.reject();
            return false;
        }

        let data_offset =
            u32::from_be_bytes([self.buf[5], self.buf[6], self.buf[7], self.buf[8]]) as usize;
        let need = data_offset.saturating_add(PREV_TAG_SIZE_LEN);
        if self.buf.len() < need {
            if self.buf.len() > MAX_BUFFERED {
                tracing::debug!(data_offset, "FLV header offset never satisfied");
                self.reject();
            }
            return false;
        }

        self.buf.advance(need);
        self.state = State::Tags;
        true
    }

    fn reject(&mut self) {
        self.buf = BytesMut::new();
        self.state = State::Rejected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{flv_header, flv_tag};

    fn collect(demuxer: &mut FlvDemuxer, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut bodies = Vec::new();
        demuxer.push(chunk, |body| bodies.push(body.to_vec()));
        bodies
    }

    #[test]
    fn forwards_video_tags_only() {
        let mut stream = flv_header();
        stream.extend(flv_tag(8, &[0xAF, 0x01, 0x21])); // audio
        stream.extend(flv_tag(18, b"onMetaData")); // script
        stream.extend(flv_tag(9, &[0x17, 0x01, 0, 0, 0]));

        let mut demuxer = FlvDemuxer::new();
        let bodies = collect(&mut demuxer, &stream);
        assert_eq!(bodies, vec![vec![0x17, 0x01, 0, 0, 0]]);
        assert_eq!(demuxer.buffered(), 0);
    }

    #[test]
    fn empty_video_tag_is_skipped() {
        let mut stream = flv_header();
        stream.extend(flv_tag(9, &[]));
        let mut demuxer = FlvDemuxer::new();
        assert!(collect(&mut demuxer, &stream).is_empty());
        assert_eq!(demuxer.buffered(), 0);
    }

    #[test]
    fn byte_at_a_time() {
        let mut stream = flv_header();
        stream.extend(flv_tag(9, &[0x27, 0x01, 0, 0, 0, 0xAA]));
        stream.extend(flv_tag(9, &[0x27, 0x01, 0, 0, 0, 0xBB]));

        let mut demuxer = FlvDemuxer::new();
        let mut bodies = Vec::new();
        for b in &stream {
            bodies.extend(collect(&mut demuxer, std::slice::from_ref(b)));
        }
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[1][5], 0xBB);
    }

    #[test]
    fn partial_tag_waits() {
        let mut stream = flv_header();
        let tag = flv_tag(9, &[0x27, 0x01, 0, 0, 0, 0xAA]);
        stream.extend_from_slice(&tag[..tag.len() - 1]);

        let mut demuxer = FlvDemuxer::new();
        assert!(collect(&mut demuxer, &stream).is_empty());
        assert_eq!(demuxer.buffered(), tag.len() - 1);
        assert_eq!(collect(&mut demuxer, &tag[tag.len() - 1..]).len(), 1);
    }

    #[test]
    fn honours_extended_data_offset() {
        // data_offset = 12: three extra header bytes before PreviousTagSize0.
        let mut stream = b"FLV\x01\x01\x00\x00\x00\x0C\xEE\xEE\xEE\x00\x00\x00\x00".to_vec();
        stream.extend(flv_tag(9, &[0x27, 0x01, 0, 0, 0]));
        let mut demuxer = FlvDemuxer::new();
        assert_eq!(collect(&mut demuxer, &stream).len(), 1);
    }

    #[test]
    fn bad_signature_rejects_for_good() {
        let mut demuxer = FlvDemuxer::new();
        assert!(collect(&mut demuxer, b"GET / HTTP/1.1\r\n\r\n").is_empty());
        assert!(demuxer.is_rejected());
        assert_eq!(demuxer.buffered(), 0);

        let mut stream = flv_header();
        stream.extend(flv_tag(9, &[0x27, 0x01, 0, 0, 0]));
        assert!(collect(&mut demuxer, &stream).is_empty());
        assert_eq!(demuxer.buffered(), 0);
    }

    #[test]
    fn short_prefix_is_not_judged_yet() {
        let mut demuxer = FlvDemuxer::new();
        assert!(collect(&mut demuxer, b"XY").is_empty());
        assert!(!demuxer.is_rejected());
    }

    #[test]
    fn oversized_tag_trims_buffer() {
        let mut demuxer = FlvDemuxer::new();
        let mut stream = flv_header();
        // Declares ~3 MiB of data that never fully arrives.
        stream.extend_from_slice(&[9, 0x30, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0]);
        collect(&mut demuxer, &stream);

        let filler = vec![0xFFu8; 512 * 1024];
        for _ in 0..5 {
            collect(&mut demuxer, &filler);
        }
        assert!(demuxer.buffered() <= MAX_BUFFERED);
        assert!(demuxer.buffered() >= TRIM_TO);
    }

    #[test]
    fn unreachable_data_offset_rejects() {
        let mut demuxer = FlvDemuxer::new();
        assert!(collect(&mut demuxer, b"FLV\x01\x01\x7F\xFF\xFF\xFF\x00\x00\x00\x00").is_empty());
        assert!(!demuxer.is_rejected());

        let filler = vec![0xFFu8; 512 * 1024];
        for _ in 0..5 {
            assert!(collect(&mut demuxer, &filler).is_empty());
        }
        assert!(demuxer.is_rejected());
        assert_eq!(demuxer.buffered(), 0);
    }
}
