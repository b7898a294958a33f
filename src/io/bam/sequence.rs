//! 4-bit BAM sequence packing.
//!
//! BAM stores two bases per byte, high nibble first. Each nibble indexes
//! `=ACMGRSVTWYHKDBN`; anything outside that alphabet is written as `N`.

use std::io;

/// BAM 4-bit code to ASCII base.
const SEQ_LOOKUP: [u8; 16] = [
    b'=', b'A', b'C', b'M', // 0-3
    b'G', b'R', b'S', b'V', // 4-7
    b'T', b'W', b'Y', b'H', // 8-11
    b'K', b'D', b'B', b'N', // 12-15
];

/// ASCII base to BAM 4-bit code (case-insensitive, unknown bases map to N).
fn base_code(base: u8) -> u8 {
    let upper = base.to_ascii_uppercase();
    SEQ_LOOKUP
        .iter()
        .position(|&b| b == upper)
        .map(|i| i as u8)
        .unwrap_or(15)
}

/// Decode `length` bases from packed 4-bit data.
pub fn decode_sequence(data: &[u8], length: usize) -> io::Result<Vec<u8>> {
    let required_bytes = length.div_ceil(2);
    if data.len() < required_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Insufficient sequence data: need {} bytes for {} bases, got {}",
                required_bytes,
                length,
                data.len()
            ),
        ));
    }

    let mut sequence = Vec::with_capacity(length);
    for i in 0..length {
        let byte = data[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        sequence.push(SEQ_LOOKUP[nibble as usize]);
    }
    Ok(sequence)
}

/// Append the packed 4-bit encoding of `sequence` to `buf`.
///
/// An odd-length sequence leaves the final low nibble zero.
pub fn encode_sequence(sequence: &[u8], buf: &mut Vec<u8>) {
    for pair in sequence.chunks(2) {
        let high = base_code(pair[0]) << 4;
        let low = pair.get(1).map(|&b| base_code(b)).unwrap_or(0);
        buf.push(high | low);
    }
}
