//! # NAL Unit Splitting
//!
//! FLV carries H.264 in AVCC framing (each NAL prefixed by a big-endian
//! length whose width comes from the decoder configuration record), but some
//! encoders push Annex-B start codes inside the tag instead. Both splitters
//! borrow their units from the input buffer.

/// H.264 `nal_unit_type` for Supplemental Enhancement Information.
pub const NAL_TYPE_SEI: u8 = 6;

/// Width used when no sequence header has been seen yet.
pub const DEFAULT_LENGTH_SIZE: usize = 4;

/// H.264 NAL header is 1 byte: `forbidden(1) | nal_ref_idc(2) | nal_type(5)`.
///
/// Returns `None` for an empty unit.
pub fn nal_type(nal: &[u8]) -> Option<u8> {
    nal.first().map(|header| header & 0x1F)
}

/// Split an AVCC payload into NAL units.
///
/// All-or-nothing: returns `None` if any length is zero, reads past the end,
/// or leaves trailing bytes that do not form a complete unit, and also when
/// the payload holds no unit at all.
pub fn split_length_prefixed(payload: &[u8], length_size: usize) -> Option<Vec<&[u8]>> {
    let width = if (1..=4).contains(&length_size) {
        length_size
    } else {
        DEFAULT_LENGTH_SIZE
    };

    let mut units = Vec::new();
    let mut offset = 0usize;
    while offset + width <= payload.len() {
        let size = payload[offset..offset + width]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        offset += width;
        if size == 0 || size > payload.len() - offset {
            return None;
        }
        units.push(&payload[offset..offset + size]);
        offset += size;
    }

    if units.is_empty() || offset != payload.len() {
        return None;
    }
    Some(units)
}

/// Find the next `00 00 01` or `00 00 00 01` at or after `from`.
///
/// Returns `(index, marker_len)`.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 {
            if data[i + 2] == 0x01 {
                return Some((i, 3));
            }
            if data[i + 2] == 0x00 && data[i + 3] == 0x01 {
                return Some((i, 4));
            }
        }
        i += 1;
    }
    None
}

/// Split an Annex-B buffer on start codes.
///
/// Each unit runs from just after a marker to just before the next marker,
/// or to the end of the buffer. Bytes before the first marker are ignored.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let Some(mut current) = find_start_code(data, 0) else {
        return units;
    };

    loop {
        let (index, marker_len) = current;
        let start = index + marker_len;
        let next = find_start_code(data, start);
        let end = next.map_or(data.len(), |(next_index, _)| next_index);
        if end > start {
            units.push(&data[start..end]);
        }
        match next {
            Some(n) => current = n,
            None => break,
        }
    }

    units
}

/// If `nal` is an SEI unit, return its escaped payload (header byte removed).
pub fn sei_payload(nal: &[u8]) -> Option<&[u8]> {
    if nal.len() < 2 || nal_type(nal)? != NAL_TYPE_SEI {
        return None;
    }
    Some(&nal[1..])
}
