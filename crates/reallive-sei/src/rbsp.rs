//! # Emulation Prevention
//!
//! H.264 inserts `0x03` after any `00 00` that would otherwise be followed by
//! a byte in `00..=03`, so a payload can never contain a start code. Removing
//! those bytes turns an escaped NAL payload (EBSP) back into its RBSP.

/// Remove every `0x03` immediately preceded by two `0x00` bytes of the input.
pub fn unescape(ebsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ebsp.len());
    for (i, &b) in ebsp.iter().enumerate() {
        if i >= 2 && b == 0x03 && ebsp[i - 1] == 0x00 && ebsp[i - 2] == 0x00 {
            continue;
        }
        out.push(b);
    }
    out
}

/// Insert emulation-prevention bytes: a `0x03` after every `00 00` that is
/// followed by a byte `<= 0x03`.
pub fn escape(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 64);
    let mut zeros = 0usize;
    for &b in rbsp {
        if zeros >= 2 && b <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(b);
        zeros = if b == 0x00 { zeros + 1 } else { 0 };
    }
    out
}
